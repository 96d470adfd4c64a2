// workspace
pub const IGNORE_FILE: &str = ".p4ignore";
pub const RESOURCE_FORK_MARKER: char = '%';

// external tools
pub const DEFAULT_P4: &str = "p4";
pub const DEFAULT_EDITOR: &str = "vi";
pub const DEFAULT_PAGER: &str = "less";

// plan
pub const PLAN_FILE_PREFIX: &str = "p4-reconcile";

// exit codes
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_VCS_UNAVAILABLE: i32 = 2;
pub const EXIT_NO_WORKSPACE: i32 = 3;
pub const EXIT_INVALID_CLIENT: i32 = 4;

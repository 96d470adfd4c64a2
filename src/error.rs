use crate::constants::{EXIT_INVALID_CLIENT, EXIT_NO_WORKSPACE, EXIT_VCS_UNAVAILABLE};
use std::fmt;

/// environment failures that end the run with their own exit code
#[derive(Debug)]
pub enum Fatal {
    /// the p4 binary could not be started
    VcsUnavailable { p4: String, reason: String },
    /// p4 does not know which client workspace we are in
    NoWorkspace,
    /// the client exists but its root is unusable
    InvalidClient { client: String, reason: String },
}

impl Fatal {
    pub fn exit_code(&self) -> i32 {
        match self {
            Fatal::VcsUnavailable { .. } => EXIT_VCS_UNAVAILABLE,
            Fatal::NoWorkspace => EXIT_NO_WORKSPACE,
            Fatal::InvalidClient { .. } => EXIT_INVALID_CLIENT,
        }
    }
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::VcsUnavailable { p4, reason } => {
                write!(f, "failed to run perforce client `{p4}`: {reason}")
            }
            Fatal::NoWorkspace => write!(
                f,
                "no perforce workspace detected (set P4CLIENT or use a P4CONFIG file)"
            ),
            Fatal::InvalidClient { client, reason } => {
                write!(f, "client `{client}` is not usable: {reason}")
            }
        }
    }
}

impl std::error::Error for Fatal {}

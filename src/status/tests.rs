use super::*;
use std::fs;
use tempfile::TempDir;

/// canned server answers
#[derive(Default)]
struct FakeVcs {
    opened: Vec<OpenedFile>,
    unchanged: Vec<String>,
    diff: Vec<(String, DiffStatus)>,
}

impl Vcs for FakeVcs {
    fn opened(&self) -> Result<Vec<OpenedFile>> {
        Ok(self.opened.clone())
    }

    fn unchanged(&self) -> Result<Vec<String>> {
        Ok(self.unchanged.clone())
    }

    fn diff_status(&self) -> Result<Vec<(String, DiffStatus)>> {
        Ok(self.diff.clone())
    }
}

/// helper to set up a workspace directory and a context pointing at it
fn setup_workspace() -> (TempDir, Context) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = Context {
        p4: "p4".to_string(),
        client: "test-client".to_string(),
        root: normalize_path(&temp_dir.path().to_string_lossy()),
        user: "tester".to_string(),
        config_file: None,
    };
    (temp_dir, ctx)
}

/// helper to create a file (and its parent directories) under the root
fn create_file(ctx: &Context, rel: &str, content: &str) -> String {
    let path = format!("{}/{}", ctx.root, rel);
    if let Some(parent) = Path::new(&path).parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn opened(path: &str, action: &str) -> OpenedFile {
    OpenedFile {
        path: path.to_string(),
        action: action.to_string(),
    }
}

fn paths(actions: &[Action]) -> Vec<&str> {
    actions.iter().map(|a| a.path.as_str()).collect()
}

#[test]
fn test_opened_is_not_overridden_by_diff_or_walk() {
    let table = merge(
        vec![opened("/ws/gone.txt", "delete"), opened("/ws/a.txt", "edit")],
        vec![],
        vec![
            ("/ws/gone.txt".to_string(), DiffStatus::Missing),
            ("/ws/a.txt".to_string(), DiffStatus::Diff),
        ],
        vec!["/ws/a.txt".to_string()],
    );

    assert_eq!(
        table.get("/ws/gone.txt"),
        Some(&Status::OpenedFor("delete".to_string()))
    );
    assert_eq!(
        table.get("/ws/a.txt"),
        Some(&Status::OpenedFor("edit".to_string()))
    );
}

#[test]
fn test_unchanged_replaces_plain_open() {
    let table = merge(
        vec![opened("/ws/c.txt", "edit")],
        vec!["/ws/c.txt".to_string()],
        vec![],
        vec!["/ws/c.txt".to_string()],
    );
    assert_eq!(table.get("/ws/c.txt"), Some(&Status::Unchanged));
}

#[test]
fn test_unchanged_never_masks_a_move() {
    let table = merge(
        vec![opened("/ws/moved.txt", "move/add")],
        vec!["/ws/moved.txt".to_string()],
        vec![("/ws/moved.txt".to_string(), DiffStatus::Same)],
        vec!["/ws/moved.txt".to_string()],
    );
    assert_eq!(
        table.get("/ws/moved.txt"),
        Some(&Status::OpenedFor("move/add".to_string()))
    );
}

#[test]
fn test_diff_status_and_walk_fill_gaps() {
    let table = merge(
        vec![],
        vec![],
        vec![
            ("/ws/same.txt".to_string(), DiffStatus::Same),
            ("/ws/changed.txt".to_string(), DiffStatus::Diff),
            ("/ws/lost.txt".to_string(), DiffStatus::Missing),
        ],
        vec![
            "/ws/same.txt".to_string(),
            "/ws/changed.txt".to_string(),
            "/ws/fresh.txt".to_string(),
        ],
    );

    assert_eq!(table.get("/ws/same.txt"), Some(&Status::Same));
    assert_eq!(table.get("/ws/changed.txt"), Some(&Status::Diff));
    assert_eq!(table.get("/ws/lost.txt"), Some(&Status::Missing));
    assert_eq!(table.get("/ws/fresh.txt"), Some(&Status::New));
    assert_eq!(table.len(), 4);
}

#[test]
fn test_filter_drops_same_and_resource_forks() {
    let mut table = StatusTable::new();
    table.insert("/ws/dir/%foo.txt".to_string(), Status::New);
    table.insert("/ws/dir/foo.txt".to_string(), Status::New);
    table.insert("/ws/dir/%lonely.txt".to_string(), Status::New);
    table.insert("/ws/same.txt".to_string(), Status::Same);

    let filtered = filter(table, "/ws", &IgnoreRules::default());

    let kept: Vec<&str> = filtered.keys().map(String::as_str).collect();
    assert_eq!(kept, vec!["/ws/dir/%lonely.txt", "/ws/dir/foo.txt"]);
}

#[test]
fn test_filter_applies_ignore_rules_to_every_status() {
    let mut table = StatusTable::new();
    table.insert("/ws/build/out.o".to_string(), Status::Diff);
    table.insert("/ws/src/build/keep.c".to_string(), Status::New);
    table.insert("/ws/log/x.log".to_string(), Status::OpenedFor("edit".into()));

    let rules = IgnoreRules::parse("/build/\n*.log\n", None);
    let filtered = filter(table, "/ws", &rules);

    let kept: Vec<&str> = filtered.keys().map(String::as_str).collect();
    assert_eq!(kept, vec!["/ws/src/build/keep.c"]);
}

#[test]
fn test_bucket_is_partition_ordered_by_path() {
    let mut table = StatusTable::new();
    table.insert("/ws/z.txt".to_string(), Status::New);
    table.insert("/ws/b.txt".to_string(), Status::Missing);
    table.insert("/ws/a.txt".to_string(), Status::Diff);
    table.insert("/ws/r.txt".to_string(), Status::Unchanged);
    table.insert("/ws/o.txt".to_string(), Status::OpenedFor("add".into()));
    table.insert("/ws/s.txt".to_string(), Status::Same);

    let buckets = bucket(&table);

    assert_eq!(paths(&buckets.edit), vec!["/ws/a.txt", "/ws/b.txt", "/ws/z.txt"]);
    assert_eq!(paths(&buckets.revert), vec!["/ws/r.txt"]);
    assert_eq!(paths(&buckets.opened), vec!["/ws/o.txt"]);

    // every entry's command and bucket come from the fixed table
    for action in buckets.edit.iter().chain(&buckets.revert).chain(&buckets.opened) {
        let (command, _) = classify(&action.status).unwrap();
        assert_eq!(action.command, command);
    }
    assert_eq!(buckets.edit[0].command, Some(Command::Edit));
    assert_eq!(buckets.edit[1].command, Some(Command::Delete));
    assert_eq!(buckets.edit[2].command, Some(Command::Add));
}

#[test]
fn test_walk_lists_regular_files_and_prunes_ignored_dirs() {
    let (_temp_dir, ctx) = setup_workspace();
    let a = create_file(&ctx, "a.txt", "a");
    let nested = create_file(&ctx, "src/lib/b.rs", "b");
    create_file(&ctx, "build/out.o", "o");

    let rules = IgnoreRules::parse("/build/\n", None);
    let mut files = walk(Path::new(&ctx.root), &rules).unwrap();
    files.sort();

    assert_eq!(files, vec![a, nested]);
}

#[test]
fn test_scenario_edit_revert_opened() {
    let (_temp_dir, ctx) = setup_workspace();
    let a = create_file(&ctx, "a.txt", "edited");
    let b = create_file(&ctx, "b.txt", "changed without checkout");
    let c = create_file(&ctx, "c.txt", "same as server");

    let vcs = FakeVcs {
        opened: vec![opened(&a, "edit"), opened(&c, "edit")],
        unchanged: vec![c.clone()],
        diff: vec![(b.clone(), DiffStatus::Diff)],
    };

    let buckets = inspect(&ctx, &vcs).unwrap().buckets;

    assert_eq!(
        buckets.edit,
        vec![Action {
            status: Status::Diff,
            command: Some(Command::Edit),
            path: b,
        }]
    );
    assert_eq!(
        buckets.revert,
        vec![Action {
            status: Status::Unchanged,
            command: Some(Command::Revert),
            path: c,
        }]
    );
    assert_eq!(
        buckets.opened,
        vec![Action {
            status: Status::OpenedFor("edit".to_string()),
            command: None,
            path: a,
        }]
    );
}

#[test]
fn test_scenario_ignored_new_file() {
    let (_temp_dir, ctx) = setup_workspace();
    create_file(&ctx, ".p4ignore", "*.tmp\n");
    create_file(&ctx, "note.tmp", "scratch");

    let inspection = inspect(&ctx, &FakeVcs::default()).unwrap();

    // neither the ignored file nor the ignore file itself show up
    assert_eq!(inspection.buckets, Buckets::default());
    assert_eq!(inspection.scanned, 2);
}

#[test]
fn test_scenario_nothing_to_do() {
    let (_temp_dir, ctx) = setup_workspace();
    let tracked = create_file(&ctx, "tracked.txt", "in sync");
    let opened_file = create_file(&ctx, "wip.txt", "in progress");

    let vcs = FakeVcs {
        opened: vec![opened(&opened_file, "edit")],
        unchanged: vec![],
        diff: vec![(tracked, DiffStatus::Same)],
    };

    let buckets = inspect(&ctx, &vcs).unwrap().buckets;

    assert!(!buckets.needs_plan());
    assert_eq!(paths(&buckets.opened), vec![opened_file.as_str()]);
}

#[test]
fn test_config_file_is_never_new() {
    let (_temp_dir, mut ctx) = setup_workspace();
    ctx.config_file = Some(".p4config".to_string());
    create_file(&ctx, ".p4config", "P4CLIENT=test-client\n");
    let new_file = create_file(&ctx, "new.txt", "new");

    let buckets = inspect(&ctx, &FakeVcs::default()).unwrap().buckets;

    assert_eq!(paths(&buckets.edit), vec![new_file.as_str()]);
}

#[test]
fn test_inspect_is_idempotent() {
    let (_temp_dir, ctx) = setup_workspace();
    let a = create_file(&ctx, "a.txt", "a");
    create_file(&ctx, "dir/b.txt", "b");
    create_file(&ctx, "dir/%b.txt", "fork");

    let vcs = FakeVcs {
        opened: vec![],
        unchanged: vec![],
        diff: vec![(a, DiffStatus::Diff)],
    };

    let first = inspect(&ctx, &vcs).unwrap().buckets;
    let second = inspect(&ctx, &vcs).unwrap().buckets;

    assert_eq!(first, second);
    assert_eq!(first.edit.len(), 2);
}

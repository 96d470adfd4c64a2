use crate::constants::RESOURCE_FORK_MARKER;
use crate::context::{Context, relative_to};
use crate::ignore::IgnoreRules;
use crate::p4::{DiffStatus, OpenedFile, Vcs, normalize_path};
use crate::{debug, warning};
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use walkdir::WalkDir;

/// what we know about one path after merging every source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "action", rename_all = "snake_case")]
pub enum Status {
    /// checked out, with perforce's own action name (`edit`, `add`, `move/add`, ...)
    OpenedFor(String),
    /// tracked but gone from disk
    Missing,
    /// not opened, content differs from the have revision
    Diff,
    /// not opened, content matches the have revision
    Same,
    /// opened, but content matches what was opened
    Unchanged,
    /// on disk, unknown to perforce
    New,
}

impl Status {
    fn is_move(&self) -> bool {
        matches!(self, Status::OpenedFor(action) if action.starts_with("move/"))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::OpenedFor(action) => write!(f, "opened:{action}"),
            Status::Missing => f.write_str("missing"),
            Status::Diff => f.write_str("diff"),
            Status::Same => f.write_str("same"),
            Status::Unchanged => f.write_str("unchanged"),
            Status::New => f.write_str("new"),
        }
    }
}

/// the perforce command that reconciles a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Add,
    Edit,
    Delete,
    Revert,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Edit => "edit",
            Command::Delete => "delete",
            Command::Revert => "revert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// needs add/edit/delete
    Edit,
    /// opened but identical, should be reverted
    Revert,
    /// already opened correctly, listed for information
    Opened,
}

/// fixed status → (command, bucket) table; `Same` has no place in any bucket
pub fn classify(status: &Status) -> Option<(Option<Command>, Bucket)> {
    match status {
        Status::Missing => Some((Some(Command::Delete), Bucket::Edit)),
        Status::Diff => Some((Some(Command::Edit), Bucket::Edit)),
        Status::New => Some((Some(Command::Add), Bucket::Edit)),
        Status::Unchanged => Some((Some(Command::Revert), Bucket::Revert)),
        Status::OpenedFor(_) => Some((None, Bucket::Opened)),
        Status::Same => None,
    }
}

/// one line of the reconciliation: status, the command it calls for, and the path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub status: Status,
    pub command: Option<Command>,
    pub path: String,
}

/// the three disjoint buckets, each ordered by path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Buckets {
    pub edit: Vec<Action>,
    pub revert: Vec<Action>,
    pub opened: Vec<Action>,
}

impl Buckets {
    /// is there anything for a plan to do?
    pub fn needs_plan(&self) -> bool {
        !self.edit.is_empty() || !self.revert.is_empty()
    }

    /// edit-bucket paths with the given status
    pub fn paths_with(&self, status: &Status) -> Vec<&str> {
        self.edit
            .iter()
            .filter(|action| &action.status == status)
            .map(|action| action.path.as_str())
            .collect()
    }
}

/// path → status, ordered by path
pub type StatusTable = BTreeMap<String, Status>;

/// result of one `inspect` run
#[derive(Debug)]
pub struct Inspection {
    pub buckets: Buckets,
    /// regular files found on disk
    pub scanned: usize,
}

/// query perforce and the filesystem, merge, filter and bucket
pub fn inspect(ctx: &Context, vcs: &impl Vcs) -> Result<Inspection> {
    let root = Path::new(&ctx.root);
    let ignore = IgnoreRules::load(root, ctx.config_file.as_deref())?;
    debug!("loaded {} ignore rule(s)", ignore.len());

    // queries run in precedence order
    let opened = vcs.opened().context("failed to list opened files")?;
    let unchanged = vcs
        .unchanged()
        .context("failed to find unchanged opened files")?;
    let diff = vcs
        .diff_status()
        .context("failed to compare unopened files")?;
    let files = walk(root, &ignore)?;
    let scanned = files.len();

    let table = merge(opened, unchanged, diff, files);
    let table = filter(table, &ctx.root, &ignore);

    Ok(Inspection {
        buckets: bucket(&table),
        scanned,
    })
}

/// build the status table from every source, highest precedence first
pub fn merge(
    opened: Vec<OpenedFile>,
    unchanged: Vec<String>,
    diff: Vec<(String, DiffStatus)>,
    files: Vec<String>,
) -> StatusTable {
    let mut table = StatusTable::new();
    apply_opened(&mut table, opened);
    apply_unchanged(&mut table, unchanged);
    apply_diff(&mut table, diff);
    apply_walk(&mut table, files);
    table
}

/// opened files are authoritative
fn apply_opened(table: &mut StatusTable, opened: Vec<OpenedFile>) {
    for file in opened {
        table.insert(file.path, Status::OpenedFor(file.action));
    }
}

/// unchanged opened files become revert candidates, except files opened for a move
fn apply_unchanged(table: &mut StatusTable, unchanged: Vec<String>) {
    for path in unchanged {
        match table.get(&path) {
            Some(status) if status.is_move() => {
                debug!("keeping {} for {}", status, path);
            }
            _ => {
                table.insert(path, Status::Unchanged);
            }
        }
    }
}

/// unopened file status only fills gaps: a file opened for delete also shows up as missing
fn apply_diff(table: &mut StatusTable, diff: Vec<(String, DiffStatus)>) {
    for (path, status) in diff {
        let status = match status {
            DiffStatus::Same => Status::Same,
            DiffStatus::Diff => Status::Diff,
            DiffStatus::Missing => Status::Missing,
        };
        table.entry(path).or_insert(status);
    }
}

/// anything on disk that no query mentioned is new
fn apply_walk(table: &mut StatusTable, files: Vec<String>) {
    for path in files {
        table.entry(path).or_insert(Status::New);
    }
}

/// drop `Same` entries, ignored paths and resource-fork companions of known files
pub fn filter(table: StatusTable, root: &str, ignore: &IgnoreRules) -> StatusTable {
    let forks: HashSet<String> = table
        .iter()
        .filter(|(path, status)| **status == Status::New && is_fork_noise(path, &table))
        .map(|(path, _)| path.clone())
        .collect();

    table
        .into_iter()
        .filter(|(path, status)| {
            if *status == Status::Same {
                return false;
            }
            if ignore.is_ignored(relative_to(root, path)) {
                debug!("ignoring {}", path);
                return false;
            }
            if forks.contains(path) {
                debug!("skipping resource fork {}", path);
                return false;
            }
            true
        })
        .collect()
}

/// `dir/%name` next to a known `dir/name`
fn is_fork_noise(path: &str, table: &StatusTable) -> bool {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, path),
    };
    let Some(plain) = name.strip_prefix(RESOURCE_FORK_MARKER) else {
        return false;
    };
    if plain.is_empty() {
        return false;
    }
    let sibling = match dir {
        Some(dir) => format!("{dir}/{plain}"),
        None => plain.to_string(),
    };
    table.contains_key(&sibling)
}

/// project the table onto the three buckets; table order (by path) is kept
pub fn bucket(table: &StatusTable) -> Buckets {
    let mut buckets = Buckets::default();
    for (path, status) in table {
        let Some((command, bucket)) = classify(status) else {
            continue;
        };
        let action = Action {
            status: status.clone(),
            command,
            path: path.clone(),
        };
        match bucket {
            Bucket::Edit => buckets.edit.push(action),
            Bucket::Revert => buckets.revert.push(action),
            Bucket::Opened => buckets.opened.push(action),
        }
    }
    buckets
}

/// every regular file under the root, skipping directories the ignore rules exclude wholesale
pub fn walk(root: &Path, ignore: &IgnoreRules) -> Result<Vec<String>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        !ignore.is_dir_ignored(&normalize_path(&rel.to_string_lossy()))
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e).with_context(|| format!("failed to read {}", root.display()));
            }
            Err(e) => {
                warning!("skipping unreadable path: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(normalize_path(&entry.path().to_string_lossy()));
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests;

use crate::constants::{DEFAULT_EDITOR, DEFAULT_PAGER};
use crate::warning;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

/// how a plan run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// the editor exited non-zero; nothing ran
    EditorFailed,
    /// the editor exited without saving; nothing ran
    NotSaved,
    /// the plan ran and succeeded; the plan file is gone
    Completed,
    /// the plan ran and failed with this exit code; the plan file is kept
    Failed(Option<i32>),
}

impl Outcome {
    /// does the plan file still exist afterwards?
    pub fn keeps_plan(self) -> bool {
        !matches!(self, Outcome::Completed)
    }
}

/// `$P4EDITOR`, then `$EDITOR`, then vi
pub fn editor() -> String {
    first_set(&[env::var("P4EDITOR").ok(), env::var("EDITOR").ok()], DEFAULT_EDITOR)
}

/// `$P4PAGER`, then `$PAGER`, then less
pub fn pager() -> String {
    first_set(&[env::var("P4PAGER").ok(), env::var("PAGER").ok()], DEFAULT_PAGER)
}

fn first_set(candidates: &[Option<String>], default: &str) -> String {
    candidates
        .iter()
        .flatten()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// open the plan in the editor and, if it was saved, run it from `workdir`
pub fn run(plan: &Path, editor: &str, workdir: &Path) -> Result<Outcome> {
    let before = modified(plan)?;

    // run the editor via shell to properly handle arguments in EDITOR
    let editor_command = format!(
        "{} {}",
        editor,
        shlex::try_quote(&plan.to_string_lossy()).context("plan path cannot be quoted")?
    );
    let status = Command::new("sh")
        .arg("-c")
        .arg(&editor_command)
        .status()
        .with_context(|| format!("failed to run editor: {editor}"))?;

    if !status.success() {
        return Ok(Outcome::EditorFailed);
    }
    if modified(plan)? == before {
        return Ok(Outcome::NotSaved);
    }

    let status = Command::new("sh")
        .arg(plan)
        .current_dir(workdir)
        .status()
        .context("failed to run plan")?;

    if !status.success() {
        return Ok(Outcome::Failed(status.code()));
    }

    if let Err(e) = fs::remove_file(plan) {
        warning!("failed to remove {}: {}", plan.display(), e);
    }
    Ok(Outcome::Completed)
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .with_context(|| format!("failed to stat {}", path.display()))
}

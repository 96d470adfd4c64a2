//! `.p4ignore`: glob rules excluding paths from reconciliation.
//!
//! One pattern per line, blank lines and `#`/`;` comments skipped.
//! - `*.log` (no separator) matches the basename anywhere in the tree
//! - `docs/*.html` (separator, not anchored) matches the root-relative path, `*` may cross `/`
//! - `/gen/*.h` (leading `/`) is anchored at the root, `*` stays within one directory
//! - `build/` or `/build/` (trailing `/`) matches everything beneath such a directory
//!
//! The ignore file itself and the active P4CONFIG file are always ignored.

use crate::constants::IGNORE_FILE;
use crate::warning;
use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// only the last path component
    Basename,
    /// the whole path relative to the workspace root
    FullPath,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    scope: Scope,
    anchored: bool,
    dir_only: bool,
}

impl Rule {
    fn parse(line: &str) -> Result<Option<Self>> {
        let dir_only = line.ends_with('/');
        let anchored = line.starts_with('/');
        let body = line.trim_end_matches('/').trim_start_matches('/');
        if body.is_empty() {
            return Ok(None);
        }

        let scope = if anchored || body.contains('/') {
            Scope::FullPath
        } else {
            Scope::Basename
        };
        let pattern = Pattern::new(body).with_context(|| format!("invalid pattern `{line}`"))?;

        Ok(Some(Self {
            pattern,
            scope,
            anchored,
            dir_only,
        }))
    }

    fn options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: true,
            require_literal_separator: self.anchored,
            require_literal_leading_dot: false,
        }
    }

    /// match a root-relative path (file or directory) against the pattern itself
    fn matches_path(&self, rel_path: &str) -> bool {
        let candidate = match self.scope {
            Scope::Basename => basename(rel_path),
            Scope::FullPath => rel_path,
        };
        self.pattern.matches_with(candidate, self.options())
    }

    fn matches_file(&self, rel_path: &str) -> bool {
        if self.dir_only {
            ancestors(rel_path).any(|dir| self.matches_path(dir))
        } else {
            self.matches_path(rel_path)
        }
    }
}

/// a parsed set of ignore rules
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
    /// basenames ignored without a rule
    implicit: Vec<String>,
}

impl IgnoreRules {
    /// load `.p4ignore` from the workspace root; a missing file means no rules
    pub fn load(root: &Path, config_file: Option<&str>) -> Result<Self> {
        let path = root.join(IGNORE_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Ok(Self::parse(&content, config_file))
    }

    /// parse ignore file content; invalid patterns are reported and skipped
    pub fn parse(content: &str, config_file: Option<&str>) -> Self {
        let mut rules = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            match Rule::parse(trimmed) {
                Ok(Some(rule)) => rules.push(rule),
                Ok(None) => {}
                Err(e) => warning!("{}: {:#}", IGNORE_FILE, e),
            }
        }

        let mut implicit = vec![IGNORE_FILE.to_string()];
        if let Some(name) = config_file
            && name != IGNORE_FILE
        {
            implicit.push(name.to_string());
        }

        Self { rules, implicit }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// should this root-relative file path be left out of the plan?
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let name = basename(rel_path);
        if self.implicit.iter().any(|implicit| implicit == name) {
            return true;
        }
        self.rules.iter().any(|rule| rule.matches_file(rel_path))
    }

    /// is everything beneath this root-relative directory ignored?
    pub fn is_dir_ignored(&self, rel_dir: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.dir_only && rule.matches_path(rel_dir))
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `a/b/c.txt` → `a`, `a/b`
fn ancestors(rel_path: &str) -> impl Iterator<Item = &str> {
    rel_path
        .match_indices('/')
        .map(move |(idx, _)| &rel_path[..idx])
        .filter(|dir| !dir.is_empty())
}

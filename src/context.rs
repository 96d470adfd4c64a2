use crate::error::Fatal;
use crate::p4::{self, normalize_path};
use crate::ztag::Record;
use crate::{debug, warning};
use anyhow::Result;
use std::path::Path;

/// the workspace a run operates on, discovered once at startup and passed down
#[derive(Debug, Clone)]
pub struct Context {
    /// perforce command line client
    pub p4: String,

    /// client (workspace) name
    pub client: String,

    /// client root, normalized
    pub root: String,

    /// perforce user name, used to keep plan files apart
    pub user: String,

    /// basename of the active P4CONFIG file, if any
    pub config_file: Option<String>,
}

impl Context {
    /// ask p4 which workspace we are in
    pub fn discover(p4: &str) -> Result<Self> {
        let records = p4::query(p4, &["info"], None).map_err(|e| {
            if e.is::<Fatal>() {
                e
            } else {
                Fatal::VcsUnavailable {
                    p4: p4.to_string(),
                    reason: format!("{e:#}"),
                }
                .into()
            }
        })?;
        let info = records.into_iter().next().unwrap_or_default();
        let config_file = config_file_name(p4);
        Ok(Self::from_info(p4, &info, config_file)?)
    }

    /// build a context from a `p4 info` record
    pub fn from_info(p4: &str, info: &Record, config_file: Option<String>) -> Result<Self, Fatal> {
        let client = match info.get("clientName") {
            Some(name) if !name.is_empty() && name != "*unknown*" => name.to_string(),
            _ => return Err(Fatal::NoWorkspace),
        };

        let root = match info.get("clientRoot") {
            Some(root) if !root.is_empty() => root,
            _ => return Err(Fatal::NoWorkspace),
        };
        if root == "null" {
            return Err(Fatal::InvalidClient {
                client,
                reason: "client has a null root".to_string(),
            });
        }
        if !Path::new(root).is_dir() {
            return Err(Fatal::InvalidClient {
                client,
                reason: format!("client root {root} is not a directory"),
            });
        }

        Ok(Self {
            p4: p4.to_string(),
            client,
            root: normalize_path(root),
            user: info.get("userName").unwrap_or("unknown").to_string(),
            config_file,
        })
    }

    /// path relative to the client root, or the path unchanged if it lies outside
    pub fn relative<'a>(&self, path: &'a str) -> &'a str {
        relative_to(&self.root, path)
    }
}

pub fn relative_to<'a>(root: &str, path: &'a str) -> &'a str {
    if root == "/" {
        return path.strip_prefix('/').unwrap_or(path);
    }
    path.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

/// P4CONFIG as p4 sees it (`p4 set -q` honours registry/enviro settings), else the environment
fn config_file_name(p4: &str) -> Option<String> {
    let from_p4 = match p4::run(p4, &["set", "-q", "P4CONFIG"], None) {
        Ok(output) => parse_set_output(&output),
        Err(e) => {
            debug!("p4 set failed: {:#}", e);
            None
        }
    };
    let value = from_p4.or_else(|| std::env::var("P4CONFIG").ok())?;

    let name = Path::new(value.trim())
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    if name.is_none() {
        warning!("ignoring unusable P4CONFIG value `{}`", value);
    }
    name
}

/// `P4CONFIG=.p4config (set)` → `.p4config`
fn parse_set_output(output: &str) -> Option<String> {
    let line = output.lines().find_map(|line| line.trim().strip_prefix("P4CONFIG="))?;
    let value = line
        .split_once(" (")
        .map_or(line, |(value, _)| value)
        .trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

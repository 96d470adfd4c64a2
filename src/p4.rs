use crate::context::Context;
use crate::error::Fatal;
use crate::ztag::{self, Record};
use crate::{debug, warning};
use anyhow::{Context as _, Result, anyhow, bail};
use std::collections::HashMap;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

/// stderr text p4 prints (with a non-zero exit) when a query simply matched nothing
const EMPTY_RESULT_MESSAGES: &[&str] = &[
    "file(s) not opened on this client",
    "file(s) not on client",
    "no such file(s)",
    "file(s) up-to-date",
    "no file(s) to reconcile",
];

/// characters perforce reserves in file specs, with their escapes
const RESERVED: &[(char, &str)] = &[('%', "%25"), ('@', "%40"), ('#', "%23"), ('*', "%2A")];

/// a file the server considers checked out, resolved to its local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFile {
    pub path: String,
    pub action: String,
}

/// per-file result of `p4 diff -sl`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    Same,
    Diff,
    Missing,
}

/// the read-only queries the status engine needs from the server
pub trait Vcs {
    /// files opened in this workspace, with their pending action
    fn opened(&self) -> Result<Vec<OpenedFile>>;
    /// opened files whose content matches the revision they were opened at
    fn unchanged(&self) -> Result<Vec<String>>;
    /// unopened files compared against the have revision
    fn diff_status(&self) -> Result<Vec<(String, DiffStatus)>>;
}

/// `p4 opened` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedRecord {
    pub depot_file: String,
    pub action: String,
}

impl TryFrom<&Record> for OpenedRecord {
    type Error = anyhow::Error;

    fn try_from(record: &Record) -> Result<Self> {
        Ok(Self {
            depot_file: record.require("depotFile")?.to_string(),
            action: record.require("action")?.to_string(),
        })
    }
}

/// `p4 where` record; unmapped (`-`) lines are rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereRecord {
    pub depot_file: String,
    pub path: String,
}

impl TryFrom<&Record> for WhereRecord {
    type Error = anyhow::Error;

    fn try_from(record: &Record) -> Result<Self> {
        if record.has("unmap") {
            bail!("unmapped view line");
        }
        Ok(Self {
            depot_file: record.require("depotFile")?.to_string(),
            path: normalize_path(record.require("path")?),
        })
    }
}

/// `p4 diff -sr` / `p4 diff -sl` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    pub path: String,
    pub status: Option<DiffStatus>,
}

impl TryFrom<&Record> for DiffRecord {
    type Error = anyhow::Error;

    fn try_from(record: &Record) -> Result<Self> {
        let path = record
            .require("clientFile")
            .or_else(|_| record.require("path"))?;
        let status = match record.get("status") {
            None => None,
            Some("same") => Some(DiffStatus::Same),
            Some("diff") => Some(DiffStatus::Diff),
            Some("missing") => Some(DiffStatus::Missing),
            Some(other) => bail!("unknown diff status `{other}`"),
        };
        Ok(Self {
            path: local_path(path),
            status,
        })
    }
}

/// convert every record, dropping (and reporting) the ones that don't fit
fn typed<'a, T>(records: &'a [Record], what: &str) -> Vec<T>
where
    T: TryFrom<&'a Record, Error = anyhow::Error>,
{
    records
        .iter()
        .filter_map(|record| match T::try_from(record) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("dropping {} record: {} ({:?})", what, e, record);
                None
            }
        })
        .collect()
}

/// run a p4 command and return its stdout
///
/// a p4 that cannot be started is `Fatal::VcsUnavailable`; a non-zero exit is an
/// error unless stderr only says the query matched nothing
pub fn run(p4: &str, args: &[&str], input: Option<&str>) -> Result<String> {
    debug!("running: {} {}", p4, args.join(" "));

    let mut child = Command::new(p4)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Fatal::VcsUnavailable {
            p4: p4.to_string(),
            reason: e.to_string(),
        })?;

    // p4 answers `-x -` input in batches, so stdin is fed while stdout drains
    let stdin = child.stdin.take();
    let (written, output) = thread::scope(|scope| {
        let writer = scope.spawn(move || match (input, stdin) {
            (Some(text), Some(mut stdin)) => stdin.write_all(text.as_bytes()),
            _ => Ok(()),
        });
        let output = child.wait_with_output();
        (writer.join(), output)
    });
    let output = output.with_context(|| format!("failed to wait for p4 {}", args.join(" ")))?;

    match written {
        Ok(Ok(())) => {}
        // p4 stopped reading; its exit status says why
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("p4 closed stdin early: {}", e);
        }
        Ok(Err(e)) => bail!("failed to write to p4 stdin: {e}"),
        Err(_) => bail!("p4 stdin writer panicked"),
    }
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if is_empty_result(&stderr) {
        debug!("p4 matched nothing: {}", stderr.trim());
        return Ok(stdout);
    }

    Err(anyhow!(
        "p4 {} failed ({}): {}",
        args.join(" "),
        output.status,
        stderr.trim()
    ))
}

fn is_empty_result(stderr: &str) -> bool {
    let lines: Vec<String> = stderr
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect();
    !lines.is_empty()
        && lines
            .iter()
            .all(|line| EMPTY_RESULT_MESSAGES.iter().any(|msg| line.contains(msg)))
}

/// run a tagged query and parse the output into records
pub fn query(p4: &str, args: &[&str], input: Option<&str>) -> Result<Vec<Record>> {
    let mut full_args = vec!["-ztag"];
    full_args.extend_from_slice(args);
    let text = run(p4, &full_args, input)?;
    Ok(ztag::parse(&text))
}

/// the perforce command line client bound to one workspace
pub struct P4<'a> {
    ctx: &'a Context,
}

impl<'a> P4<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// `//<client>/...`
    fn scope(&self) -> String {
        format!("//{}/...", self.ctx.client)
    }

    fn query(&self, args: &[&str], input: Option<&str>) -> Result<Vec<Record>> {
        let mut full_args = vec!["-c", self.ctx.client.as_str()];
        full_args.extend_from_slice(args);
        query(&self.ctx.p4, &full_args, input)
    }

    /// map depot paths to local paths with `p4 -x - where`
    fn where_paths(&self, depot_files: &[&str]) -> Result<Vec<WhereRecord>> {
        if depot_files.is_empty() {
            return Ok(Vec::new());
        }
        let mut input = depot_files.join("\n");
        input.push('\n');
        let records = self.query(&["-x", "-", "where"], Some(&input))?;
        Ok(typed(&records, "where"))
    }

    /// page `p4 diff -f` output for the given local paths
    ///
    /// `-f` is needed because these files are not opened
    pub fn page_diff(&self, paths: &[&str], pager: &str) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut diff = Command::new(&self.ctx.p4)
            .args(["-c", self.ctx.client.as_str(), "diff", "-f"])
            .args(paths.iter().map(|path| escape(path)))
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Fatal::VcsUnavailable {
                p4: self.ctx.p4.clone(),
                reason: e.to_string(),
            })?;
        let diff_out = diff
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture p4 diff output"))?;

        // run the pager via shell to properly handle arguments in PAGER
        let status = Command::new("sh")
            .arg("-c")
            .arg(pager)
            .stdin(diff_out)
            .status()
            .with_context(|| format!("failed to run pager: {pager}"))?;
        let diff_status = diff.wait().context("failed to wait for p4 diff")?;

        if !status.success() {
            warning!("pager exited with {}", status);
        }
        if !diff_status.success() {
            warning!("p4 diff exited with {}", diff_status);
        }
        Ok(())
    }
}

impl Vcs for P4<'_> {
    fn opened(&self) -> Result<Vec<OpenedFile>> {
        let records = self.query(&["opened", self.scope().as_str()], None)?;
        let opened: Vec<OpenedRecord> = typed(&records, "opened");

        let depot_files: Vec<&str> = opened.iter().map(|o| o.depot_file.as_str()).collect();
        let where_records = self.where_paths(&depot_files)?;

        // overlay mappings report one depot file more than once; the first line wins
        let mut mapped: HashMap<&str, &str> = HashMap::new();
        for w in &where_records {
            mapped.entry(w.depot_file.as_str()).or_insert(w.path.as_str());
        }

        let mut files = Vec::with_capacity(opened.len());
        for record in &opened {
            match mapped.get(record.depot_file.as_str()) {
                Some(path) => files.push(OpenedFile {
                    path: (*path).to_string(),
                    action: record.action.clone(),
                }),
                None => debug!("opened file {} is not in the view", record.depot_file),
            }
        }
        Ok(files)
    }

    fn unchanged(&self) -> Result<Vec<String>> {
        let records = self.query(&["diff", "-sr", self.scope().as_str()], None)?;
        let diffs: Vec<DiffRecord> = typed(&records, "diff -sr");
        Ok(diffs.into_iter().map(|d| d.path).collect())
    }

    fn diff_status(&self) -> Result<Vec<(String, DiffStatus)>> {
        let records = self.query(&["diff", "-sl", self.scope().as_str()], None)?;
        let diffs: Vec<DiffRecord> = typed(&records, "diff -sl");
        Ok(diffs
            .into_iter()
            .filter_map(|d| match d.status {
                Some(status) => Some((d.path, status)),
                None => {
                    debug!("dropping diff -sl record without status for {}", d.path);
                    None
                }
            })
            .collect())
    }
}

/// escape perforce's reserved characters (`@ # % *`) for use in a file spec
pub fn escape(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match RESERVED.iter().find(|(reserved, _)| *reserved == c) {
            Some((_, code)) => escaped.push_str(code),
            None => escaped.push(c),
        }
    }
    escaped
}

/// undo `escape`; unknown `%xx` sequences are left as they are
pub fn unescape(path: &str) -> String {
    let mut unescaped = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find('%') {
        unescaped.push_str(&rest[..pos]);
        let candidate = rest.get(pos..pos + 3).unwrap_or("");
        match RESERVED
            .iter()
            .find(|(_, code)| code.eq_ignore_ascii_case(candidate))
        {
            Some((c, _)) => {
                unescaped.push(*c);
                rest = &rest[pos + 3..];
            }
            None => {
                unescaped.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    unescaped.push_str(rest);
    unescaped
}

/// single `/` separator, no trailing separator
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        path
    } else {
        trimmed.to_string()
    }
}

/// diff output may report files in depot or client syntax (escaped) or local syntax (raw)
fn local_path(path: &str) -> String {
    if path.starts_with("//") {
        normalize_path(&unescape(path))
    } else {
        normalize_path(path)
    }
}

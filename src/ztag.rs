//! parser for perforce tagged output (`p4 -ztag ...`)
//!
//! grammar: records are separated by blank lines, each line is
//! `... <key> <value>` with the `... ` prefix optional and the value possibly empty.
//! a key repeated inside one record starts a new record, since some commands
//! omit the separator between records.

use anyhow::{Result, anyhow};

/// one tagged record, fields in output order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// like `get`, but a missing or empty field is an error naming the key
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(anyhow!("record has no `{key}` field")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, key: &str, value: &str) {
        self.fields.push((key.to_string(), value.to_string()));
    }
}

/// split tagged output into records
pub fn parse(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::default();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }

        let Some((key, value)) = parse_line(line) else {
            continue;
        };

        if current.has(key) {
            records.push(std::mem::take(&mut current));
        }
        current.push(key, value);
    }

    if !current.is_empty() {
        records.push(current);
    }

    records
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_prefix("... ").unwrap_or(line);
    let (key, value) = line.split_once(' ').unwrap_or((line, ""));
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

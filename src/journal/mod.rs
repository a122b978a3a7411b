//! Append-only JSONL resume journal.
//!
//! Records are replayed positionally: the n-th replay request must name the
//! same `(Name, ResourceType)` as the n-th record, otherwise the journal was
//! produced by a different template and the run stops.

pub mod codec;
pub mod hasher;

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::error::{Error, Result};
use crate::core::types::Value;
use codec::CacheRecord;

pub struct Journal {
    path: PathBuf,
    file: File,
    records: Vec<CacheRecord>,
    cursor: usize,
}

impl Journal {
    /// Open (or create) the journal at `path` and load every record.
    /// `truncate` discards whatever a previous run left behind.
    pub fn open(path: &Path, truncate: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io("cannot create cache dir", parent, e))?;
        }
        if truncate {
            File::create(path).map_err(|e| Error::io("cannot truncate journal", path, e))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| Error::io("cannot open journal", path, e))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::io("cannot read journal", path, e))?;
        let records = parse_records(&content)?;
        if !records.is_empty() {
            info!(
                "load {} resource cache record(s) from {}",
                records.len(),
                path.display()
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            records,
            cursor: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[CacheRecord] {
        &self.records
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replay the record at the cursor for `(name, resource_type)`.
    ///
    /// Returns `Ok(None)` once the journal is exhausted; the caller then runs
    /// the resource normally and appends a fresh record.
    pub fn restore(&mut self, name: &str, resource_type: &str) -> Result<Option<Value>> {
        let Some(record) = self.records.get(self.cursor) else {
            return Ok(None);
        };
        if record.name != name || record.resource_type != resource_type {
            return Err(Error::MalformedCacheRecord(format!(
                "got invalid cache record {} for resource {}, index {}",
                record, name, self.cursor
            )));
        }
        let value = record.decode()?;
        debug!("restored {} from journal index {}", name, self.cursor);
        self.cursor += 1;
        Ok(Some(value))
    }

    /// Append one record and flush it to disk before returning.
    pub fn record(
        &mut self,
        name: &str,
        resource_type: &str,
        value: &Value,
        in_template: bool,
    ) -> Result<()> {
        let record = CacheRecord::new(name, resource_type, value, in_template)?;
        let line = serde_json::to_string(&record)?;
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.sync_data())
            .map_err(|e| Error::io("cannot append journal record", &self.path, e))?;
        self.records.push(record);
        self.cursor = self.records.len();
        Ok(())
    }

    /// Close and delete the journal after a complete run. Failures here do
    /// not fail the run; they only leave a stale journal behind.
    pub fn finish(self) {
        let Self { path, file, .. } = self;
        drop(file);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("remove cache file {}: {}", path.display(), e);
        }
    }

    /// Names of top-level entries, with `(cached)` appended to those the
    /// journal already covers. `entries` yields `(name, journaled)` pairs;
    /// entries that are never journaled do not consume a record.
    pub fn annotate_pending<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a str, bool)>,
    ) -> Vec<String> {
        let top_level: Vec<&CacheRecord> =
            self.records.iter().filter(|r| !r.in_template).collect();
        let mut index = 0;
        entries
            .into_iter()
            .map(|(name, journaled)| {
                if !journaled {
                    return name.to_string();
                }
                let cached = index < top_level.len();
                index += 1;
                if cached {
                    format!("{}(cached)", name)
                } else {
                    name.to_string()
                }
            })
            .collect()
    }
}

fn parse_records(content: &str) -> Result<Vec<CacheRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                Error::MalformedCacheRecord(format!("line {}: {}", n + 1, e))
            })
        })
        .collect()
}

use super::domain::StatusRecord;
use chrono::{DateTime, TimeZone, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lines occupied by one pretty-printed record in a snapshot file.
const RECORD_LINES: usize = 5;

/// File name suffix for capture files.
const SNAPSHOT_EXTENSION: &str = ".dat";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot storage i/o failed")]
    Io(#[from] std::io::Error),
    #[error("snapshot version {requested} requested but only {available} captures exist")]
    NoSuchSnapshot { requested: usize, available: usize },
    #[error("snapshot file {path} holds a malformed record")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot record could not be encoded")]
    Encode(#[from] serde_json::Error),
}

/// One on-disk capture, named `{start:06}-{unix_ts}.dat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub start_sequence: u32,
    pub captured_at: DateTime<Utc>,
}

/// A capture file parsed back into records.
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub captured_at: DateTime<Utc>,
    pub records: Vec<StatusRecord>,
}

/// Directory of capture files written by sampling runs.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Enumerates capture files, oldest first. Files whose names do not fit
    /// the capture layout are skipped. A directory nobody has sampled into
    /// yet lists as empty.
    pub fn list(&self) -> Result<Vec<SnapshotFile>, SnapshotError> {
        let mut snapshots = Vec::new();
        if !self.dir.exists() {
            return Ok(snapshots);
        }

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            match parse_snapshot_name(name) {
                Some((start_sequence, captured_at)) => snapshots.push(SnapshotFile {
                    path: entry.path(),
                    start_sequence,
                    captured_at,
                }),
                None => debug!(file = name, "skipping non-snapshot file"),
            }
        }

        snapshots.sort_by(|a, b| (a.captured_at, &a.path).cmp(&(b.captured_at, &b.path)));
        Ok(snapshots)
    }

    /// Loads one capture by age rank: version 0 is the newest file, 1 the
    /// one before it, and so on.
    pub fn load(&self, version: usize) -> Result<LoadedSnapshot, SnapshotError> {
        let snapshots = self.list()?;
        let available = snapshots.len();
        let Some(snapshot) = snapshots.iter().rev().nth(version) else {
            return Err(SnapshotError::NoSuchSnapshot {
                requested: version,
                available,
            });
        };

        let records = read_records(&snapshot.path)?;
        Ok(LoadedSnapshot {
            captured_at: snapshot.captured_at,
            records,
        })
    }

    /// Opens a fresh capture file for appending.
    pub fn create_writer(
        &self,
        start_sequence: u32,
        started_at: DateTime<Utc>,
    ) -> Result<SnapshotWriter, SnapshotError> {
        fs::create_dir_all(&self.dir)?;
        let name = format!(
            "{start_sequence:06}-{}{SNAPSHOT_EXTENSION}",
            started_at.timestamp()
        );
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(SnapshotWriter {
            path,
            writer: BufWriter::new(file),
        })
    }
}

/// Appends records to one capture file, flushing after every record so an
/// aborted run still leaves whole blocks behind.
#[derive(Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SnapshotWriter {
    pub fn append(&mut self, record: &StatusRecord) -> Result<(), SnapshotError> {
        let block = serde_json::to_string_pretty(record)?;
        writeln!(self.writer, "{block}")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

fn parse_snapshot_name(name: &str) -> Option<(u32, DateTime<Utc>)> {
    let stem = name.strip_suffix(SNAPSHOT_EXTENSION)?;
    let (start, ts) = stem.split_once('-')?;
    let start_sequence = start.parse().ok()?;
    let seconds: i64 = ts.parse().ok()?;
    let captured_at = Utc.timestamp_opt(seconds, 0).single()?;
    Some((start_sequence, captured_at))
}

fn read_records(path: &Path) -> Result<Vec<StatusRecord>, SnapshotError> {
    let file = File::open(path)?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        lines.push(line?);
    }

    let mut records = Vec::with_capacity(lines.len() / RECORD_LINES);
    for chunk in lines.chunks(RECORD_LINES) {
        if chunk.len() < RECORD_LINES {
            // An interrupted run leaves a partial block at the tail.
            debug!(path = %path.display(), "ignoring partial trailing record");
            break;
        }

        let block = chunk.join("\n");
        let record = serde_json::from_str(&block).map_err(|source| SnapshotError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}

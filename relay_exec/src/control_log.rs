//! # Control Log
//!
//! Log of the controls received by the relay. The most recent entries are held in memory to serve
//! `GET /logs`. When backed by a store file every control is also appended to it as one JSON line,
//! and the newest entries are reloaded from it when the relay restarts.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use comms_if::relay::{ControlRecord, LogEntry};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ControlLog {
    entries: VecDeque<StoredControl>,
    max_entries: usize,
    store: Option<Store>,
}

/// One line of the store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredControl {
    timestamp: DateTime<Utc>,
    x: f64,
    y: f64,
    honk: u8,
}

struct Store {
    path: PathBuf,
    file: File,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ControlLogError {
    #[error("Could not access the control store {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Could not serialise the control: {0}")]
    Serialise(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlLog {
    /// A log held only in memory.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries,
            store: None,
        }
    }

    /// A log backed by the store file at `path`, created if missing.
    ///
    /// Lines of the file which cannot be parsed are skipped.
    pub fn open<P: AsRef<Path>>(path: P, max_entries: usize) -> Result<Self, ControlLogError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |e| ControlLogError::Io(path.clone(), e);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut log = Self::new(max_entries);

        if path.exists() {
            let reader = BufReader::new(File::open(&path).map_err(io_err)?);
            let mut num_skipped = 0;

            for line in reader.lines() {
                let line = line.map_err(io_err)?;
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<StoredControl>(&line) {
                    Ok(c) => log.remember(c),
                    Err(_) => num_skipped += 1,
                }
            }

            if num_skipped > 0 {
                warn!("Skipped {} unreadable lines in {:?}", num_skipped, path);
            }
            info!("Reloaded {} controls from {:?}", log.len(), path);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        log.store = Some(Store { path, file });

        Ok(log)
    }

    /// Append a control received at `time`, dropping the oldest in-memory entry if the log is
    /// full.
    pub fn push(&mut self, record: &ControlRecord, time: DateTime<Utc>) -> Result<(), ControlLogError> {
        let control = StoredControl {
            timestamp: time,
            x: record.x,
            y: record.y,
            honk: record.honk,
        };

        if let Some(ref mut store) = self.store {
            let mut line = serde_json::to_vec(&control).map_err(ControlLogError::Serialise)?;
            line.push(b'\n');

            store
                .file
                .write_all(&line)
                .map_err(|e| ControlLogError::Io(store.path.clone(), e))?;
        }

        self.remember(control);

        Ok(())
    }

    /// Up to `limit` entries, newest first.
    pub fn newest(&self, limit: usize) -> Vec<LogEntry> {
        self.entries
            .iter()
            .rev()
            .take(limit)
            .map(|c| LogEntry {
                time: c.timestamp.format("%H:%M:%S").to_string(),
                x: c.x,
                y: c.y,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remember(&mut self, control: StoredControl) {
        if self.max_entries == 0 {
            return;
        }

        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }

        self.entries.push_back(control);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T13:04:05Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn store_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("rover_control_log_{}_{}", name, std::process::id()))
            .join("controls.jsonl")
    }

    #[test]
    fn test_newest_first_and_capped() {
        let mut log = ControlLog::new(3);

        for i in 0..5 {
            log.push(
                &ControlRecord::new(i as f64 / 10.0, 0.0, false),
                t0() + chrono::Duration::seconds(i),
            )
            .unwrap();
        }

        assert_eq!(log.len(), 3);

        let entries = log.newest(2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].x, 0.4);
        assert_eq!(entries[0].time, "13:04:09");
        assert_eq!(entries[1].x, 0.3);

        assert_eq!(log.newest(50).len(), 3);
    }

    #[test]
    fn test_zero_capacity() {
        let mut log = ControlLog::new(0);
        log.push(&ControlRecord::new(0.0, 0.0, false), Utc::now()).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_entries_survive_reopening() {
        let path = store_path("reopen");
        fs::remove_file(&path).ok();

        {
            let mut log = ControlLog::open(&path, 2).unwrap();
            assert!(log.is_empty());

            for i in 0..3 {
                log.push(
                    &ControlRecord::new(0.1 * i as f64, -0.5, i == 2),
                    t0() + chrono::Duration::seconds(i),
                )
                .unwrap();
            }
        }

        // Every control is on disk, the reopened log keeps the newest two
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);

        let mut log = ControlLog::open(&path, 2).unwrap();
        let entries = log.newest(50);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].time, "13:04:07");
        assert_eq!(entries[1].x, 0.1);

        log.push(&ControlRecord::new(1.0, 1.0, false), t0()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let path = store_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "not json\n\n{\"timestamp\":\"2024-05-01T13:04:05Z\",\"x\":0.5,\"y\":0.25,\"honk\":0}\n",
        )
        .unwrap();

        let log = ControlLog::open(&path, 10).unwrap();
        assert_eq!(
            log.newest(10),
            vec![LogEntry {
                time: "13:04:05".into(),
                x: 0.5,
                y: 0.25
            }]
        );

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}

//! Bounded per-application archive history.

use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

/// A retained prior archive version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub application: String,
    pub archive: PathBuf,
    /// Milliseconds since the epoch at which the archive was moved aside.
    pub published_at: u64,
}

/// Backups for one application, newest first.
#[derive(Debug)]
pub struct BackupHistory {
    entries: VecDeque<BackupEntry>,
    capacity: usize,
}

impl BackupHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new newest entry, returning the entry evicted past capacity.
    #[must_use = "the evicted archive must be removed from disk"]
    pub fn push(&mut self, entry: BackupEntry) -> Option<BackupEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    /// Remove and return the newest entry.
    pub fn pop_newest(&mut self) -> Option<BackupEntry> {
        self.entries.pop_front()
    }

    /// Put back an entry taken by [`pop_newest`](Self::pop_newest).
    pub fn restore(&mut self, entry: BackupEntry) {
        self.entries.push_front(entry);
    }

    pub fn newest(&self) -> Option<&BackupEntry> {
        self.entries.front()
    }

    pub fn entries(&self) -> impl Iterator<Item = &BackupEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) -> Vec<BackupEntry> {
        self.entries.drain(..).collect()
    }

    /// Rebuild a history from `<dir>/<millis>.tar` files.
    ///
    /// Returns the history and the entries beyond capacity (oldest), which the
    /// caller should delete.
    pub fn load_from_dir(
        application: &str,
        dir: &Path,
        capacity: usize,
    ) -> io::Result<(Self, Vec<BackupEntry>)> {
        let mut found = Vec::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("tar") {
                    continue;
                }
                let stamp = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok());
                if let Some(published_at) = stamp {
                    found.push(BackupEntry {
                        application: application.to_string(),
                        archive: path,
                        published_at,
                    });
                }
            }
        }
        found.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        let excess = if found.len() > capacity {
            found.split_off(capacity)
        } else {
            Vec::new()
        };
        Ok((
            Self {
                entries: found.into(),
                capacity,
            },
            excess,
        ))
    }
}

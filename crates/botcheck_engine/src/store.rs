//! Durable, per-job bounded event log backed by one JSON file per job.
//!
//! Every public operation is infallible from the caller's point of view:
//! failures are logged and the store behaves as if empty, so a stream keeps
//! running memory-only when the disk is unavailable.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use botcheck_core::ProgressEvent;
use engine_logging::{engine_debug, engine_warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::clock::now_rfc3339;

/// Events retained on disk per job.
pub const MAX_EVENTS_PER_JOB: usize = 50;

const KEY_PREFIX: &str = "botcheck_job_";
const KEY_SUFFIX: &str = ".json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredJobData {
    events: Vec<ProgressEvent>,
    last_updated: String,
}

#[derive(Debug, Clone)]
pub struct LocalEventStore {
    dir: PathBuf,
    capacity: usize,
}

impl LocalEventStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity: MAX_EVENTS_PER_JOB,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name holding `job_id`'s record. Reversible, see [`Self::list_job_ids`].
    pub fn key_for(job_id: &str) -> String {
        format!("{KEY_PREFIX}{}{KEY_SUFFIX}", urlencoding::encode(job_id))
    }

    /// Stamps, appends and truncates to the most recent events, then persists.
    pub fn append(&self, job_id: &str, event: &ProgressEvent) {
        if let Err(err) = self.try_append(job_id, event) {
            engine_warn!("Failed to persist event for job {}: {}", job_id, err);
        }
    }

    /// Persisted events for `job_id`, oldest first. Missing or corrupt records read as empty.
    pub fn read(&self, job_id: &str) -> Vec<ProgressEvent> {
        match self.load(job_id) {
            Ok(Some(data)) => data.events,
            Ok(None) => Vec::new(),
            Err(err) => {
                engine_warn!("Failed to read stored events for job {}: {}", job_id, err);
                Vec::new()
            }
        }
    }

    /// Removes everything stored for `job_id`. Idempotent.
    pub fn clear(&self, job_id: &str) {
        match fs::remove_file(self.path_for(job_id)) {
            Ok(()) => engine_debug!("Cleared stored events for job {}", job_id),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => engine_warn!("Failed to clear stored events for job {}: {}", job_id, err),
        }
    }

    /// Every job with a record in the store directory, sorted.
    pub fn list_job_ids(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                engine_warn!("Failed to list stored jobs in {:?}: {}", self.dir, err);
                return Vec::new();
            }
        };

        let mut job_ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let encoded = name.strip_prefix(KEY_PREFIX)?.strip_suffix(KEY_SUFFIX)?;
                urlencoding::decode(encoded).ok().map(|id| id.into_owned())
            })
            .collect();
        job_ids.sort();
        job_ids
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(Self::key_for(job_id))
    }

    fn load(&self, job_id: &str) -> Result<Option<StoredJobData>, StoreError> {
        let content = match fs::read_to_string(self.path_for(job_id)) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn try_append(&self, job_id: &str, event: &ProgressEvent) -> Result<(), StoreError> {
        // A corrupt record is replaced rather than blocking new writes.
        let mut events = self.read(job_id);
        events.push(event.clone().stamped(now_rfc3339));
        if events.len() > self.capacity {
            let overflow = events.len() - self.capacity;
            events.drain(..overflow);
        }

        let data = StoredJobData {
            events,
            last_updated: now_rfc3339(),
        };
        let content = serde_json::to_string(&data)?;
        self.write_atomically(&Self::key_for(job_id), &content)
    }

    /// Writes a temp file in the store directory then renames it over the target.
    fn write_atomically(&self, filename: &str, content: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(self.dir.join(filename))
            .map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }
}

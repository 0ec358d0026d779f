//! Issue record storage
//!
//! Every backend implements [`RecordStore`]. Writes go through
//! [`RecordStore::modify`], which holds the backend's write lock (or SQLite
//! transaction) across read, mutation and write so two staff sessions
//! touching the same issue cannot lose each other's timestamps.

use crate::{Error, Issue, IssueId, Result, StatusChange};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod jsonl;
mod memory;
mod sqlite;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub(crate) use jsonl::read_lines;

/// Which backend a workspace uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Jsonl,
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jsonl" => Ok(StorageBackend::Jsonl),
            "sqlite" => Ok(StorageBackend::Sqlite),
            _ => Err(Error::Config(format!("unknown storage backend: {}", s))),
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Jsonl => write!(f, "jsonl"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Keyed table of issues plus their status history
pub trait RecordStore: Send + Sync {
    /// Insert a new issue. `build` receives the next free identifier.
    fn insert(&self, build: &mut dyn FnMut(IssueId) -> Issue) -> Result<Issue>;

    fn get(&self, id: IssueId) -> Result<Option<Issue>>;

    /// Every issue, ascending by id
    fn scan(&self) -> Result<Vec<Issue>>;

    /// Atomic read-modify-write of one row. If `apply` fails nothing is
    /// written. Fails with `NotFound` for an unknown id.
    fn modify(&self, id: IssueId, apply: &mut dyn FnMut(&mut Issue) -> Result<()>) -> Result<Issue>;

    /// Append to the status history log
    fn record_change(&self, change: &StatusChange) -> Result<()>;

    /// History of one issue, oldest first
    fn history(&self, id: IssueId) -> Result<Vec<StatusChange>>;

    /// Flush and release the backend
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the backend living in a `.fixdesk` directory
pub fn open_store(dir: &Path, backend: StorageBackend) -> Result<Box<dyn RecordStore>> {
    tracing::debug!(dir = %dir.display(), %backend, "opening record store");
    match backend {
        StorageBackend::Jsonl => Ok(Box::new(JsonlStore::open(dir)?)),
        StorageBackend::Sqlite => Ok(Box::new(SqliteStore::open(&dir.join(sqlite::DB_FILE))?)),
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Other("store lock poisoned".into())
}

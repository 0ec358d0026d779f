//! JSONL store for fixdesk issues
//!
//! One issue per line in `issues.jsonl`, rewritten on every change, and an
//! append-only `history.jsonl`. Nothing is cached: every call takes an
//! advisory lock on `issues.lock` and reads the files again, so a CLI and an
//! API server sharing one directory see each other's writes.

use super::RecordStore;
use super::memory::Table;
use crate::{Error, Issue, IssueId, Result, StatusChange};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const ISSUES_FILE: &str = "issues.jsonl";
const HISTORY_FILE: &str = "history.jsonl";
const LOCK_FILE: &str = "issues.lock";

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// JSONL-based issue store
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Open (or create) the store in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let store = Self {
            dir: dir.to_path_buf(),
        };
        let _guard = store.lock(LockMode::Shared)?;
        let table = store.load()?;
        tracing::debug!(
            dir = %dir.display(),
            issues = table.issues.len(),
            "opened jsonl store"
        );
        Ok(store)
    }

    /// Path to issues.jsonl
    pub fn issues_path(&self) -> PathBuf {
        self.dir.join(ISSUES_FILE)
    }

    /// Path to history.jsonl
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Take the directory lock, retrying until `LOCK_TIMEOUT`. Released when
    /// the returned file is dropped.
    fn lock(&self, mode: LockMode) -> Result<File> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        tracing::warn!(path = %path.display(), ?mode, "gave up waiting for store lock");
                        return Err(Error::Locked(path.display().to_string()));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Current issues on disk. Caller holds the lock.
    fn load(&self) -> Result<Table> {
        let mut table = Table::default();
        for issue in read_lines::<Issue>(&self.issues_path())? {
            table.issues.insert(issue.id, issue);
        }
        Ok(table)
    }

    /// Rewrite issues.jsonl from the table, via a temp file and rename so a
    /// crash never leaves a half-written file behind. Caller holds the
    /// exclusive lock.
    fn save(&self, table: &Table) -> Result<()> {
        let path = self.issues_path();
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for issue in table.issues.values() {
                serde_json::to_writer(&mut writer, issue)?;
                writeln!(writer)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Read a JSONL file; a missing file reads as empty. Malformed lines are
/// skipped with a warning rather than failing the whole load.
pub(crate) fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = n + 1, error = %e, "skipping malformed line");
            }
        }
    }
    Ok(items)
}

impl RecordStore for JsonlStore {
    fn insert(&self, build: &mut dyn FnMut(IssueId) -> Issue) -> Result<Issue> {
        let _guard = self.lock(LockMode::Exclusive)?;
        let mut table = self.load()?;
        let issue = table.insert(build)?;
        self.save(&table)?;
        Ok(issue)
    }

    fn get(&self, id: IssueId) -> Result<Option<Issue>> {
        let _guard = self.lock(LockMode::Shared)?;
        Ok(self.load()?.issues.remove(&id))
    }

    fn scan(&self) -> Result<Vec<Issue>> {
        let _guard = self.lock(LockMode::Shared)?;
        Ok(self.load()?.issues.into_values().collect())
    }

    fn modify(&self, id: IssueId, apply: &mut dyn FnMut(&mut Issue) -> Result<()>) -> Result<Issue> {
        let _guard = self.lock(LockMode::Exclusive)?;
        let mut table = self.load()?;
        let updated = table.modify(id, apply)?;
        self.save(&table)?;
        Ok(updated)
    }

    fn record_change(&self, change: &StatusChange) -> Result<()> {
        let _guard = self.lock(LockMode::Exclusive)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, change)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    fn history(&self, id: IssueId) -> Result<Vec<StatusChange>> {
        let _guard = self.lock(LockMode::Shared)?;
        let mut changes: Vec<StatusChange> = read_lines(&self.history_path())?;
        changes.retain(|c| c.issue_id == id);
        Ok(changes)
    }
}

//! In-memory store, also the table the JSONL backend loads under its lock

use super::{RecordStore, poisoned};
use crate::{Error, Issue, IssueId, Result, StatusChange, id::next_id};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
pub(crate) struct Table {
    pub(crate) issues: BTreeMap<IssueId, Issue>,
    pub(crate) history: Vec<StatusChange>,
}

impl Table {
    pub(crate) fn insert(&mut self, build: &mut dyn FnMut(IssueId) -> Issue) -> Result<Issue> {
        let id = next_id(self.issues.keys())?;
        let mut issue = build(id);
        issue.id = id;
        self.issues.insert(id, issue.clone());
        Ok(issue)
    }

    /// Apply `apply` to a copy of the row and swap it in; the row is left
    /// untouched if `apply` fails.
    pub(crate) fn modify(
        &mut self,
        id: IssueId,
        apply: &mut dyn FnMut(&mut Issue) -> Result<()>,
    ) -> Result<Issue> {
        let current = self.issues.get(&id).ok_or(Error::NotFound(id))?;
        let mut updated = current.clone();
        apply(&mut updated)?;
        updated.id = id;
        self.issues.insert(id, updated.clone());
        Ok(updated)
    }

    pub(crate) fn history(&self, id: IssueId) -> Vec<StatusChange> {
        self.history
            .iter()
            .filter(|c| c.issue_id == id)
            .cloned()
            .collect()
    }
}

/// Ephemeral store for tests and one-shot sessions
#[derive(Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, build: &mut dyn FnMut(IssueId) -> Issue) -> Result<Issue> {
        self.table.write().map_err(poisoned)?.insert(build)
    }

    fn get(&self, id: IssueId) -> Result<Option<Issue>> {
        Ok(self.table.read().map_err(poisoned)?.issues.get(&id).cloned())
    }

    fn scan(&self) -> Result<Vec<Issue>> {
        Ok(self
            .table
            .read()
            .map_err(poisoned)?
            .issues
            .values()
            .cloned()
            .collect())
    }

    fn modify(&self, id: IssueId, apply: &mut dyn FnMut(&mut Issue) -> Result<()>) -> Result<Issue> {
        let updated = self.table.write().map_err(poisoned)?.modify(id, apply)?;
        Ok(updated)
    }

    fn record_change(&self, change: &StatusChange) -> Result<()> {
        self.table
            .write()
            .map_err(poisoned)?
            .history
            .push(change.clone());
        Ok(())
    }

    fn history(&self, id: IssueId) -> Result<Vec<StatusChange>> {
        Ok(self.table.read().map_err(poisoned)?.history(id))
    }
}

//! Duplicate merging
//!
//! A duplicate points at its canonical issue through `parent_id`. The links
//! form a forest; petgraph is used to keep it that way (cycle checks before a
//! merge is written) and to inspect stores edited out of band.

use crate::{Error, Issue, IssueId, Result, Status, StatusChange, TransitionPolicy};
use chrono::{DateTime, Utc};
use petgraph::algo::{has_path_connecting, kosaraju_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Remark written on a merged child
pub fn merge_remark(parent: IssueId) -> String {
    format!("Merged into Issue {}", parent)
}

/// Parent-link graph over a set of issues. Edges run child -> parent.
pub struct MergeGraph {
    graph: DiGraph<IssueId, ()>,
    node_map: HashMap<IssueId, NodeIndex>,
    dangling: Vec<(IssueId, IssueId)>,
}

impl MergeGraph {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();
        let mut dangling = Vec::new();

        for issue in issues {
            let idx = graph.add_node(issue.id);
            node_map.insert(issue.id, idx);
        }

        for issue in issues {
            let Some(parent) = issue.parent_id else {
                continue;
            };
            match (node_map.get(&issue.id), node_map.get(&parent)) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, ());
                }
                _ => dangling.push((issue.id, parent)),
            }
        }

        Self {
            graph,
            node_map,
            dangling,
        }
    }

    /// Whether linking `child` under `parent` would close a loop, i.e. the
    /// parent already resolves to the child by following parent links.
    pub fn would_create_cycle(&self, parent: IssueId, child: IssueId) -> bool {
        if parent == child {
            return true;
        }
        match (self.node_map.get(&parent), self.node_map.get(&child)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }

    /// Groups of issues whose parent links loop back on themselves
    pub fn find_cycles(&self) -> Vec<Vec<IssueId>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.has_self_loop(scc[0]))
            .map(|scc| {
                let mut ids: Vec<IssueId> = scc.into_iter().map(|idx| self.graph[idx]).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    fn has_self_loop(&self, node: NodeIndex) -> bool {
        self.graph.edges(node).any(|e| e.target() == node)
    }

    /// Links whose parent is not in the store, as (child, missing parent)
    pub fn dangling(&self) -> &[(IssueId, IssueId)] {
        &self.dangling
    }
}

/// Validate a merge of `child` into `parent` before anything is written
pub fn check(
    parent: &Issue,
    child: &Issue,
    graph: &MergeGraph,
    policy: TransitionPolicy,
) -> Result<()> {
    if parent.id == child.id {
        return Err(Error::InvalidOperation(format!(
            "cannot merge {} into itself",
            child.id
        )));
    }
    if graph.would_create_cycle(parent.id, child.id) {
        return Err(Error::InvalidOperation(format!(
            "merging {} into {} would create a duplicate cycle",
            child.id, parent.id
        )));
    }
    // An existing duplicate may be re-linked; resolved and closed work may not
    let finished = matches!(child.status, Status::Resolved | Status::Closed);
    if policy == TransitionPolicy::ForwardOnly && finished {
        return Err(Error::InvalidOperation(format!(
            "{} is already {} and cannot be merged",
            child.id, child.status
        )));
    }
    Ok(())
}

/// Mark `child` as a duplicate of `parent`. The parent is not touched.
pub fn mark_duplicate(child: &mut Issue, parent: IssueId, now: DateTime<Utc>) -> StatusChange {
    let old_status = child.status;
    child.parent_id = Some(parent);
    child.status = Status::Duplicate;
    child.remarks = Some(merge_remark(parent));
    child.updated_at = now;

    StatusChange {
        issue_id: child.id,
        old_status,
        new_status: Status::Duplicate,
        changed_at: now,
        changed_by: None,
    }
}

/// Reporters of every issue merged directly into `parent`, in id order
pub fn duplicate_reporters(issues: &[Issue], parent: IssueId) -> Vec<String> {
    let mut merged: Vec<&Issue> = issues
        .iter()
        .filter(|i| i.parent_id == Some(parent))
        .collect();
    merged.sort_by_key(|i| i.id);
    merged.into_iter().map(|i| i.reporter.clone()).collect()
}

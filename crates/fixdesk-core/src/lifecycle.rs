//! Status transitions
//!
//! Applies a status change to an issue in place: writes the status, optionally
//! replaces the assignee, stamps the first-reach timestamp and refreshes
//! `updated_at`. Ordering rules come from [`TransitionPolicy`].

use crate::{Error, Issue, Result, Status, StatusChange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which status changes are allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any status from any status, including backward moves and changes to
    /// merged duplicates. Staff use this to correct mistakes.
    #[default]
    Permissive,
    /// Only forward (or same-status) moves along the flow, and nothing once
    /// an issue has been merged as a duplicate.
    ForwardOnly,
}

impl TransitionPolicy {
    /// Check moving `issue` to `to`
    pub fn check(&self, issue: &Issue, to: Status) -> Result<()> {
        if to == Status::Duplicate {
            return Err(Error::InvalidOperation(format!(
                "{} cannot be marked Duplicate directly; merge it into its parent instead",
                issue.id
            )));
        }
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::ForwardOnly => {
                if issue.is_duplicate() {
                    return Err(Error::InvalidOperation(format!(
                        "{} was merged as a duplicate and cannot change status",
                        issue.id
                    )));
                }
                match (issue.status.rank(), to.rank()) {
                    (Some(from), Some(target)) if target >= from => Ok(()),
                    _ => Err(Error::InvalidOperation(format!(
                        "{}: cannot move from {} back to {}",
                        issue.id, issue.status, to
                    ))),
                }
            }
        }
    }
}

impl std::str::FromStr for TransitionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "forward_only" | "forward-only" | "strict" => Ok(TransitionPolicy::ForwardOnly),
            _ => Err(Error::Config(format!("unknown transition policy: {}", s))),
        }
    }
}

impl std::fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionPolicy::Permissive => write!(f, "permissive"),
            TransitionPolicy::ForwardOnly => write!(f, "forward_only"),
        }
    }
}

/// A requested status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl Transition {
    pub fn to(status: Status) -> Self {
        Self {
            status,
            assignee: None,
        }
    }

    pub fn assign(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }
}

/// Apply `transition` to `issue` under `policy`, returning the history entry.
/// Nothing is written when the policy rejects the move.
pub fn apply(
    issue: &mut Issue,
    transition: Transition,
    policy: TransitionPolicy,
    now: DateTime<Utc>,
) -> Result<StatusChange> {
    policy.check(issue, transition.status)?;

    let old_status = issue.status;
    issue.status = transition.status;
    if let Some(assignee) = transition.assignee {
        issue.assignee = Some(assignee);
    }
    issue.stamp(transition.status, now);
    issue.updated_at = now;

    Ok(StatusChange {
        issue_id: issue.id,
        old_status,
        new_status: transition.status,
        changed_at: now,
        changed_by: None,
    })
}

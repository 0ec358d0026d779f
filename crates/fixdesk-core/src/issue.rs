//! Issue data model for fixdesk

use crate::IssueId;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time truncated to whole seconds, the resolution every stored
/// timestamp uses.
pub fn timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Issue status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
pub enum Status {
    #[default]
    Reported,
    Assigned,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Closed,
    /// Terminal state of an issue merged into another one
    Duplicate,
}

impl Status {
    /// The nominal forward flow. `Duplicate` is reachable only through a merge.
    pub const FLOW: [Status; 5] = [
        Status::Reported,
        Status::Assigned,
        Status::InProgress,
        Status::Resolved,
        Status::Closed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Resolved | Status::Closed | Status::Duplicate)
    }

    /// Position in the forward flow
    pub fn rank(&self) -> Option<usize> {
        Self::FLOW.iter().position(|s| s == self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Reported => "Reported",
            Status::Assigned => "Assigned",
            Status::InProgress => "In Progress",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
            Status::Duplicate => "Duplicate",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reported" => Ok(Status::Reported),
            "assigned" => Ok(Status::Assigned),
            "in progress" | "in_progress" | "in-progress" | "inprogress" => Ok(Status::InProgress),
            "resolved" => Ok(Status::Resolved),
            "closed" => Ok(Status::Closed),
            "duplicate" => Ok(Status::Duplicate),
            _ => Err(crate::Error::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may read an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
pub enum Visibility {
    /// Readable by every viewer
    #[default]
    #[serde(alias = "public")]
    Public,
    /// Readable by the reporter (and management) only
    #[serde(alias = "private")]
    Private,
}

impl std::str::FromStr for Visibility {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(crate::Error::InvalidVisibility(s.to_string())),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "Public"),
            Visibility::Private => write!(f, "Private"),
        }
    }
}

/// Where the problem is. Copied from the reporter's profile when the issue
/// is filed and never refreshed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [&self.hostel, &self.block, &self.room]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", parts.join(" / "))
        }
    }
}

/// Fields supplied by the reporter when filing an issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssue {
    pub reporter: String,
    pub category: String,
    pub priority: String,
    pub description: String,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// A reported maintenance problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,

    /// Username of the resident who filed it
    pub reporter: String,

    pub category: String,
    pub priority: String,
    pub description: String,

    pub status: Status,

    /// Caretaker or team handling the issue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    pub visibility: Visibility,

    #[serde(default)]
    pub location: Location,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Set when this issue was merged into another as a duplicate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<IssueId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Issue {
    /// Build a freshly reported issue
    pub fn new(id: IssueId, new: NewIssue, location: Location, now: DateTime<Utc>) -> Self {
        Self {
            id,
            reporter: new.reporter,
            category: new.category,
            priority: new.priority,
            description: new.description,
            status: Status::Reported,
            assignee: None,
            visibility: new.visibility.unwrap_or_default(),
            location,
            image_path: new.image_path,
            created_at: now,
            updated_at: now,
            assigned_at: None,
            in_progress_at: None,
            resolved_at: None,
            closed_at: None,
            parent_id: None,
            remarks: None,
        }
    }

    /// Lifecycle timestamp recorded for `status`, if that status has one
    pub fn reached_at(&self, status: Status) -> Option<DateTime<Utc>> {
        match status {
            Status::Assigned => self.assigned_at,
            Status::InProgress => self.in_progress_at,
            Status::Resolved => self.resolved_at,
            Status::Closed => self.closed_at,
            Status::Reported => Some(self.created_at),
            Status::Duplicate => None,
        }
    }

    /// Record the first time `status` was entered. Returns false when the
    /// timestamp was already set or the status has none.
    pub fn stamp(&mut self, status: Status, at: DateTime<Utc>) -> bool {
        let slot = match status {
            Status::Assigned => &mut self.assigned_at,
            Status::InProgress => &mut self.in_progress_at,
            Status::Resolved => &mut self.resolved_at,
            Status::Closed => &mut self.closed_at,
            Status::Reported | Status::Duplicate => return false,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        true
    }

    pub fn is_duplicate(&self) -> bool {
        self.parent_id.is_some() || self.status == Status::Duplicate
    }

    pub fn is_visible_to(&self, viewer: &str) -> bool {
        self.visibility == Visibility::Public || self.reporter == viewer
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] [{}] {} - {}",
            self.id, self.priority, self.category, self.status, self.description
        )
    }
}

/// One entry of an issue's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub issue_id: IssueId,
    pub old_status: Status,
    pub new_status: Status,
    pub changed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

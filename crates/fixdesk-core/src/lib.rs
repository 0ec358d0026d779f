//! fixdesk-core: Core library for the fixdesk maintenance tracker
//!
//! Residents report issues, staff move them through
//! `Reported -> Assigned -> In Progress -> Resolved -> Closed` and fold
//! repeated reports of the same problem into one canonical issue.

pub mod config;
pub mod error;
pub mod id;
pub mod issue;
pub mod lifecycle;
pub mod merge;
pub mod profile;
pub mod store;
pub mod tracker;
pub mod visibility;
pub mod workspace;

pub use config::Config;
pub use error::Error;
pub use id::IssueId;
pub use issue::{Issue, Location, NewIssue, Status, StatusChange, Visibility};
pub use lifecycle::{Transition, TransitionPolicy};
pub use merge::MergeGraph;
pub use profile::{Profile, ProfileBook, ProfileDirectory, Role};
pub use store::{RecordStore, StorageBackend};
pub use tracker::{LinkReport, Tracker};
pub use visibility::Viewer;
pub use workspace::Workspace;

/// Result type for fixdesk operations
pub type Result<T> = std::result::Result<T, Error>;

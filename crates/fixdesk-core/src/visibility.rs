//! Read-side filtering of issues per viewer

use crate::{Issue, Role};

/// Someone looking at the issue list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub username: String,
    pub role: Role,
}

impl Viewer {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    /// Management sees every issue; students see public ones and their own
    pub fn can_see(&self, issue: &Issue) -> bool {
        self.role == Role::Management || issue.is_visible_to(&self.username)
    }
}

/// Public issues plus the viewer's own private ones, newest first
pub fn visible_to(issues: Vec<Issue>, viewer: &str) -> Vec<Issue> {
    let mut visible: Vec<Issue> = issues
        .into_iter()
        .filter(|i| i.is_visible_to(viewer))
        .collect();
    newest_first(&mut visible);
    visible
}

/// Management sees every issue; students get [`visible_to`]
pub fn visible_for(issues: Vec<Issue>, viewer: &Viewer) -> Vec<Issue> {
    match viewer.role {
        Role::Management => {
            let mut all = issues;
            newest_first(&mut all);
            all
        }
        Role::Student => visible_to(issues, &viewer.username),
    }
}

/// Sort by creation time, newest first; ids break ties
pub fn newest_first(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

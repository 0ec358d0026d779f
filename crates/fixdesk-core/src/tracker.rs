//! The tracker: every issue operation, run against an injected store
//!
//! A `Tracker` owns its [`RecordStore`] and [`ProfileDirectory`] handles.
//! `Tracker::open` binds them to a workspace and `Tracker::close` flushes and
//! releases them; nothing is held in process-wide state.

use crate::issue::timestamp;
use crate::lifecycle::{self, Transition, TransitionPolicy};
use crate::merge::{self, MergeGraph};
use crate::store::{RecordStore, open_store};
use crate::visibility::{self, Viewer};
use crate::{
    Error, Issue, IssueId, NewIssue, ProfileDirectory, Result, Role, StatusChange, Visibility,
    Workspace,
};
use serde::Serialize;
use std::sync::Mutex;

/// Integrity findings over the parent-link relation
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    /// Groups of issues whose parent links loop
    pub cycles: Vec<Vec<IssueId>>,
    /// (child, missing parent) pairs
    pub dangling: Vec<(IssueId, IssueId)>,
    /// Merged issues whose status was later moved off `Duplicate`
    pub reopened_duplicates: Vec<IssueId>,
}

impl LinkReport {
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty() && self.dangling.is_empty()
    }
}

pub struct Tracker {
    store: Box<dyn RecordStore>,
    profiles: Box<dyn ProfileDirectory>,
    policy: TransitionPolicy,
    default_visibility: Visibility,
    // merges read the whole link graph before writing one row
    merge_lock: Mutex<()>,
}

impl Tracker {
    pub fn new(store: Box<dyn RecordStore>, profiles: Box<dyn ProfileDirectory>) -> Self {
        Self {
            store,
            profiles,
            policy: TransitionPolicy::default(),
            default_visibility: Visibility::default(),
            merge_lock: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_visibility(mut self, visibility: Visibility) -> Self {
        self.default_visibility = visibility;
        self
    }

    /// Open the store and profiles of a workspace, configured from its
    /// config.toml
    pub fn open(workspace: &Workspace) -> Result<Self> {
        let config = workspace.config()?;
        let store = open_store(&workspace.dir(), config.storage)?;
        let profiles = workspace.profiles()?;
        Ok(Self::new(store, Box::new(profiles))
            .with_policy(config.policy)
            .with_default_visibility(config.default_visibility))
    }

    /// Flush and release the store
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    /// File a new issue. The reporter's location is copied from their
    /// profile at this moment.
    pub fn report(&self, mut new: NewIssue) -> Result<Issue> {
        let profile = self
            .profiles
            .lookup(&new.reporter)?
            .ok_or_else(|| Error::UnknownUser(new.reporter.clone()))?;
        if new.visibility.is_none() {
            new.visibility = Some(self.default_visibility);
        }

        let now = timestamp();
        let issue = self
            .store
            .insert(&mut |id| Issue::new(id, new.clone(), profile.location.clone(), now))?;
        tracing::info!(issue = %issue.id, reporter = %issue.reporter, category = %issue.category, "issue reported");
        Ok(issue)
    }

    pub fn get(&self, id: IssueId) -> Result<Issue> {
        self.store.get(id)?.ok_or(Error::NotFound(id))
    }

    /// Fetch an issue on behalf of `viewer`. Issues the viewer may not see
    /// are reported as `NotFound`; without a viewer only public issues are
    /// returned.
    pub fn get_as(&self, id: IssueId, viewer: Option<&str>) -> Result<Issue> {
        let issue = self.get(id)?;
        let visible = match viewer {
            Some(username) => self.viewer(username)?.can_see(&issue),
            None => issue.visibility == Visibility::Public,
        };
        if visible { Ok(issue) } else { Err(Error::NotFound(id)) }
    }

    /// Change an issue's status, optionally (re)assigning it
    pub fn transition(&self, id: IssueId, transition: Transition, actor: Option<&str>) -> Result<Issue> {
        self.authorize(actor, "change status")?;
        let policy = self.policy;
        let now = timestamp();
        let mut change = None;

        let result = self.store.modify(id, &mut |issue| {
            change = Some(lifecycle::apply(issue, transition.clone(), policy, now)?);
            Ok(())
        });
        let issue = match result {
            Ok(issue) => issue,
            Err(e) => {
                tracing::warn!(issue = %id, status = %transition.status, error = %e, "transition rejected");
                return Err(e);
            }
        };

        if let Some(change) = change {
            self.log_change(change, actor);
        }
        tracing::info!(
            issue = %id,
            status = %issue.status,
            assignee = issue.assignee.as_deref().unwrap_or("-"),
            "status changed"
        );
        Ok(issue)
    }

    /// Mark `child` as a duplicate of `parent`. Only the child row is
    /// written. Returns the updated child.
    pub fn merge(&self, parent: IssueId, child: IssueId, actor: Option<&str>) -> Result<Issue> {
        self.authorize(actor, "merge issues")?;
        let _guard = self
            .merge_lock
            .lock()
            .map_err(|_| Error::Other("merge lock poisoned".into()))?;

        let parent_issue = self.get(parent)?;
        self.get(child)?;

        let issues = self.store.scan()?;
        let graph = MergeGraph::from_issues(&issues);
        let policy = self.policy;
        let now = timestamp();
        let mut change = None;

        let result = self.store.modify(child, &mut |issue| {
            merge::check(&parent_issue, issue, &graph, policy)?;
            change = Some(merge::mark_duplicate(issue, parent, now));
            Ok(())
        });
        let merged = match result {
            Ok(issue) => issue,
            Err(e) => {
                tracing::warn!(%parent, %child, error = %e, "merge rejected");
                return Err(e);
            }
        };

        if let Some(change) = change {
            self.log_change(change, actor);
        }
        tracing::info!(issue = %child, %parent, "merged as duplicate");
        Ok(merged)
    }

    /// Reporters of the issues merged into `parent`. Empty when there are none.
    pub fn duplicates_of(&self, parent: IssueId) -> Result<Vec<String>> {
        Ok(merge::duplicate_reporters(&self.store.scan()?, parent))
    }

    /// Issues merged into `parent`, in id order
    pub fn duplicate_issues(&self, parent: IssueId) -> Result<Vec<Issue>> {
        Ok(self
            .store
            .scan()?
            .into_iter()
            .filter(|i| i.parent_id == Some(parent))
            .collect())
    }

    /// Public issues plus `viewer`'s own, newest first
    pub fn visible_to(&self, viewer: &str) -> Result<Vec<Issue>> {
        Ok(visibility::visible_to(self.store.scan()?, viewer))
    }

    /// Role-aware listing
    pub fn visible_for(&self, viewer: &Viewer) -> Result<Vec<Issue>> {
        Ok(visibility::visible_for(self.store.scan()?, viewer))
    }

    /// Resolve a username to a viewer through the profile directory
    pub fn viewer(&self, username: &str) -> Result<Viewer> {
        let profile = self
            .profiles
            .lookup(username)?
            .ok_or_else(|| Error::UnknownUser(username.to_string()))?;
        Ok(Viewer::new(profile.username, profile.role))
    }

    /// Every issue, newest id first
    pub fn all_issues(&self) -> Result<Vec<Issue>> {
        let mut issues = self.store.scan()?;
        issues.reverse();
        Ok(issues)
    }

    /// Issues filed by `reporter`, newest first
    pub fn reported_by(&self, reporter: &str) -> Result<Vec<Issue>> {
        let mut issues: Vec<Issue> = self
            .store
            .scan()?
            .into_iter()
            .filter(|i| i.reporter == reporter)
            .collect();
        visibility::newest_first(&mut issues);
        Ok(issues)
    }

    /// Status history of an issue, oldest first
    pub fn history(&self, id: IssueId) -> Result<Vec<StatusChange>> {
        self.get(id)?;
        self.store.history(id)
    }

    /// Scan parent links for cycles and dangling references
    pub fn check_links(&self) -> Result<LinkReport> {
        let issues = self.store.scan()?;
        let graph = MergeGraph::from_issues(&issues);
        Ok(LinkReport {
            cycles: graph.find_cycles(),
            dangling: graph.dangling().to_vec(),
            reopened_duplicates: issues
                .iter()
                .filter(|i| i.parent_id.is_some() && i.status != crate::Status::Duplicate)
                .map(|i| i.id)
                .collect(),
        })
    }

    /// Staff-only operations. A named actor must be Management; no actor
    /// means a local operator.
    fn authorize(&self, actor: Option<&str>, action: &str) -> Result<()> {
        let Some(actor) = actor else {
            return Ok(());
        };
        let viewer = self.viewer(actor)?;
        if viewer.role != Role::Management {
            tracing::warn!(%actor, action, "refused for non-management user");
            return Err(Error::InvalidOperation(format!(
                "{} may not {}: management only",
                actor, action
            )));
        }
        Ok(())
    }

    /// The row is already written at this point; a failed history append is
    /// logged and does not fail the operation.
    fn log_change(&self, mut change: StatusChange, actor: Option<&str>) {
        change.changed_by = actor.map(str::to_string);
        if let Err(e) = self.store.record_change(&change) {
            tracing::warn!(issue = %change.issue_id, error = %e, "failed to record status history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonlStore, MemoryStore, SqliteStore};
    use crate::{Location, Profile, ProfileBook, Status};

    fn profiles() -> ProfileBook {
        let book = ProfileBook::in_memory();
        for (name, room) in [("alice", "101"), ("carol", "102"), ("dave", "103")] {
            let location = Location {
                hostel: Some("Girls Hostel".into()),
                block: Some("A".into()),
                room: Some(room.into()),
            };
            book.upsert(Profile::student(name, location)).unwrap();
        }
        book.upsert(Profile::management("admin")).unwrap();
        book
    }

    fn tracker(store: Box<dyn RecordStore>) -> Tracker {
        Tracker::new(store, Box::new(profiles()))
    }

    fn new_issue(reporter: &str, visibility: Option<Visibility>) -> NewIssue {
        NewIssue {
            reporter: reporter.into(),
            category: "Plumbing".into(),
            priority: "High".into(),
            description: "Water leaking from ceiling".into(),
            visibility,
            image_path: None,
        }
    }

    #[test]
    fn test_report_snapshots_location() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let issue = tracker.report(new_issue("alice", None)).unwrap();
        assert_eq!(issue.id, IssueId(1));
        assert_eq!(issue.location.room.as_deref(), Some("101"));
        assert_eq!(issue.status, Status::Reported);
    }

    #[test]
    fn test_report_unknown_user() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let err = tracker.report(new_issue("mallory", None)).unwrap_err();
        assert!(matches!(err, Error::UnknownUser(_)));
    }

    #[test]
    fn test_default_visibility_applies() {
        let tracker = tracker(Box::new(MemoryStore::new()))
            .with_default_visibility(Visibility::Private);
        let private = tracker.report(new_issue("alice", None)).unwrap();
        let public = tracker
            .report(new_issue("alice", Some(Visibility::Public)))
            .unwrap();
        assert_eq!(private.visibility, Visibility::Private);
        assert_eq!(public.visibility, Visibility::Public);
    }

    #[test]
    fn test_transition_records_history() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let issue = tracker.report(new_issue("alice", None)).unwrap();
        tracker
            .transition(issue.id, Transition::to(Status::Assigned).assign("bob"), Some("admin"))
            .unwrap();
        tracker
            .transition(issue.id, Transition::to(Status::Resolved), Some("admin"))
            .unwrap();

        let history = tracker.history(issue.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].old_status, Status::Reported);
        assert_eq!(history[1].new_status, Status::Resolved);
        assert_eq!(history[1].changed_by.as_deref(), Some("admin"));
    }

    #[test]
    fn test_forward_only_tracker() {
        let tracker =
            tracker(Box::new(MemoryStore::new())).with_policy(TransitionPolicy::ForwardOnly);
        let issue = tracker.report(new_issue("alice", None)).unwrap();
        tracker
            .transition(issue.id, Transition::to(Status::InProgress), None)
            .unwrap();
        let err = tracker
            .transition(issue.id, Transition::to(Status::Reported), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(tracker.get(issue.id).unwrap().status, Status::InProgress);
        assert_eq!(tracker.history(issue.id).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_rejects_cycle() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let a = tracker.report(new_issue("alice", None)).unwrap();
        let b = tracker.report(new_issue("carol", None)).unwrap();
        tracker.merge(a.id, b.id, None).unwrap();

        let err = tracker.merge(b.id, a.id, None).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(tracker.get(a.id).unwrap().status, Status::Reported);
    }

    #[test]
    fn test_remerge_last_wins() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let a = tracker.report(new_issue("alice", None)).unwrap();
        let b = tracker.report(new_issue("carol", None)).unwrap();
        let c = tracker.report(new_issue("dave", None)).unwrap();
        tracker.merge(a.id, c.id, None).unwrap();
        tracker.merge(b.id, c.id, None).unwrap();

        assert!(tracker.duplicates_of(a.id).unwrap().is_empty());
        assert_eq!(tracker.duplicates_of(b.id).unwrap(), vec!["dave"]);
        assert_eq!(
            tracker.get(c.id).unwrap().remarks.as_deref(),
            Some("Merged into Issue #2")
        );
    }

    #[test]
    fn test_merge_missing_issue() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let a = tracker.report(new_issue("alice", None)).unwrap();
        assert!(matches!(
            tracker.merge(a.id, IssueId(77), None),
            Err(Error::NotFound(IssueId(77)))
        ));
        assert!(matches!(
            tracker.merge(IssueId(78), a.id, None),
            Err(Error::NotFound(IssueId(78)))
        ));
    }

    #[test]
    fn test_visible_for_roles() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        tracker
            .report(new_issue("alice", Some(Visibility::Private)))
            .unwrap();
        tracker
            .report(new_issue("carol", Some(Visibility::Public)))
            .unwrap();

        let admin = tracker.viewer("admin").unwrap();
        assert_eq!(tracker.visible_for(&admin).unwrap().len(), 2);
        let dave = tracker.viewer("dave").unwrap();
        assert_eq!(tracker.visible_for(&dave).unwrap().len(), 1);
        assert_eq!(tracker.reported_by("alice").unwrap().len(), 1);
        assert_eq!(tracker.all_issues().unwrap()[0].id, IssueId(2));
    }

    #[test]
    fn test_check_links_reports_reopened_duplicate() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let a = tracker.report(new_issue("alice", None)).unwrap();
        let b = tracker.report(new_issue("carol", None)).unwrap();
        tracker.merge(a.id, b.id, None).unwrap();
        assert!(tracker.check_links().unwrap().reopened_duplicates.is_empty());

        tracker
            .transition(b.id, Transition::to(Status::InProgress), None)
            .unwrap();
        let report = tracker.check_links().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.reopened_duplicates, vec![b.id]);
    }

    #[test]
    fn test_staff_actions_need_management() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let a = tracker.report(new_issue("alice", None)).unwrap();
        let b = tracker.report(new_issue("carol", None)).unwrap();

        let err = tracker
            .transition(a.id, Transition::to(Status::Closed), Some("alice"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        let err = tracker.merge(a.id, b.id, Some("carol")).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert!(matches!(
            tracker.merge(a.id, b.id, Some("mallory")),
            Err(Error::UnknownUser(_))
        ));

        assert_eq!(tracker.get(a.id).unwrap().status, Status::Reported);
        assert_eq!(tracker.get(b.id).unwrap().parent_id, None);
        assert!(tracker.history(a.id).unwrap().is_empty());

        tracker.merge(a.id, b.id, Some("admin")).unwrap();
        assert_eq!(tracker.get(b.id).unwrap().status, Status::Duplicate);
    }

    #[test]
    fn test_get_as_hides_private_issues() {
        let tracker = tracker(Box::new(MemoryStore::new()));
        let private = tracker
            .report(new_issue("carol", Some(Visibility::Private)))
            .unwrap();
        let public = tracker
            .report(new_issue("dave", Some(Visibility::Public)))
            .unwrap();

        assert_eq!(tracker.get_as(private.id, Some("carol")).unwrap(), private);
        assert_eq!(tracker.get_as(private.id, Some("admin")).unwrap(), private);
        assert!(matches!(
            tracker.get_as(private.id, Some("dave")),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            tracker.get_as(private.id, None),
            Err(Error::NotFound(_))
        ));
        assert_eq!(tracker.get_as(public.id, None).unwrap(), public);
        assert!(matches!(
            tracker.get_as(public.id, Some("mallory")),
            Err(Error::UnknownUser(_))
        ));
    }

    #[test]
    fn test_backends_agree() {
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<Box<dyn RecordStore>> = vec![
            Box::new(MemoryStore::new()),
            Box::new(JsonlStore::open(dir.path()).unwrap()),
            Box::new(SqliteStore::in_memory().unwrap()),
        ];
        for store in stores {
            let tracker = tracker(store);
            let parent = tracker.report(new_issue("carol", None)).unwrap();
            let child = tracker.report(new_issue("dave", None)).unwrap();
            tracker.merge(parent.id, child.id, Some("admin")).unwrap();

            assert_eq!(tracker.get(parent.id).unwrap(), parent);
            assert_eq!(tracker.get(child.id).unwrap().status, Status::Duplicate);
            assert_eq!(tracker.duplicates_of(parent.id).unwrap(), vec!["dave"]);
            assert_eq!(tracker.history(child.id).unwrap().len(), 1);
            tracker.close().unwrap();
        }
    }
}

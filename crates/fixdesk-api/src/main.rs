//! fixdesk-api: REST API server for the fixdesk maintenance tracker
//!
//! Serves the tracker of the workspace found from the current directory.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use fixdesk_core::{
    Error, Issue, IssueId, NewIssue, Status, StatusChange, Tracker, Transition, Visibility,
    Workspace,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state
struct AppState {
    tracker: Tracker,
}

/// Request to move an issue to a new status
#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
    #[serde(default)]
    assignee: Option<String>,
    /// Staff member making the change
    #[serde(default)]
    by: Option<String>,
}

/// Request to merge the path issue into `parent`
#[derive(Debug, Deserialize)]
struct MergeRequest {
    parent: IssueId,
    #[serde(default)]
    by: Option<String>,
}

/// Query parameters for listing issues
#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    viewer: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Who is asking, for single-issue reads
#[derive(Debug, Deserialize)]
struct ViewerQuery {
    #[serde(default)]
    viewer: Option<String>,
}

/// API response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T>(result: fixdesk_core::Result<T>, ok: StatusCode) -> Reply<T> {
    match result {
        Ok(data) => (ok, Json(ApiResponse::ok(data))),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "request failed");
            }
            (status, Json(ApiResponse::err(e.to_string())))
        }
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// List issues visible to `viewer`; without one only public issues are shown
async fn list_issues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Reply<Vec<Issue>> {
    let result = (|| -> fixdesk_core::Result<Vec<Issue>> {
        let mut issues = match &query.viewer {
            Some(viewer) => {
                let viewer = state.tracker.viewer(viewer)?;
                state.tracker.visible_for(&viewer)?
            }
            None => {
                let mut issues = state.tracker.all_issues()?;
                issues.retain(|i| i.visibility == Visibility::Public);
                issues
            }
        };
        if let Some(status) = &query.status {
            let status: Status = status.parse()?;
            issues.retain(|i| i.status == status);
        }
        Ok(issues)
    })();
    reply(result, StatusCode::OK)
}

/// Report a new issue
async fn create_issue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewIssue>,
) -> Reply<Issue> {
    reply(state.tracker.report(req), StatusCode::CREATED)
}

/// Get a single issue by ID; private issues are 404 unless `viewer` may see them
async fn get_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Reply<Issue> {
    let result = id
        .parse()
        .and_then(|id| state.tracker.get_as(id, query.viewer.as_deref()));
    reply(result, StatusCode::OK)
}

/// Change status and optionally the assignee
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Reply<Issue> {
    let result = (|| -> fixdesk_core::Result<Issue> {
        let id: IssueId = id.parse()?;
        let mut transition = Transition::to(req.status.parse()?);
        if let Some(assignee) = req.assignee.clone() {
            transition = transition.assign(assignee);
        }
        state.tracker.transition(id, transition, req.by.as_deref())
    })();
    reply(result, StatusCode::OK)
}

/// Merge the path issue into the requested parent
async fn merge_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MergeRequest>,
) -> Reply<Issue> {
    let result = id
        .parse()
        .and_then(|child| state.tracker.merge(req.parent, child, req.by.as_deref()));
    reply(result, StatusCode::OK)
}

/// Reporters of the issues merged into this one
async fn list_duplicates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Reply<Vec<String>> {
    let result = (|| -> fixdesk_core::Result<Vec<String>> {
        let id: IssueId = id.parse()?;
        state.tracker.get_as(id, query.viewer.as_deref())?;
        state.tracker.duplicates_of(id)
    })();
    reply(result, StatusCode::OK)
}

/// Status history of an issue
async fn issue_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Reply<Vec<StatusChange>> {
    let result = (|| -> fixdesk_core::Result<Vec<StatusChange>> {
        let id: IssueId = id.parse()?;
        state.tracker.get_as(id, query.viewer.as_deref())?;
        state.tracker.history(id)
    })();
    reply(result, StatusCode::OK)
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/issues", get(list_issues).post(create_issue))
        .route("/issues/{id}", get(get_issue))
        .route("/issues/{id}/status", post(update_status))
        .route("/issues/{id}/merge", post(merge_issue))
        .route("/issues/{id}/duplicates", get(list_duplicates))
        .route("/issues/{id}/history", get(issue_history))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let workspace = Workspace::find()?;
    let config = workspace.config()?;
    let tracker =
        Tracker::open(&workspace).map_err(|e| anyhow::anyhow!("Failed to open tracker: {}", e))?;

    let app = router(Arc::new(AppState { tracker }));

    // Port from env, then config
    let port: u16 = std::env::var("FIXDESK_API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.api.port);
    let host: std::net::IpAddr = config
        .api
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid api.host {}: {}", config.api.host, e))?;

    let addr = std::net::SocketAddr::from((host, port));
    tracing::info!("Starting fixdesk-api on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

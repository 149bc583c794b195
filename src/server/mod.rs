//! Reference sync server.
//!
//! Serves the sync endpoint (`/api/projects/sync`, session from cookie),
//! a PostgREST-style table API under `/rest/v1` and `/auth/v1/user`
//! (session from bearer token). Tokens resolve through a static map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::storage::Project;
use crate::sync::remote::rows::{ProjectRow, SectionRow};
use crate::sync::remote::{write_project, RemoteError, RowStore, Session, SESSION_COOKIE};

/// State shared across requests
#[derive(Clone)]
pub struct ServerState {
    rows: Arc<dyn RowStore>,
    /// Access token to user id
    sessions: Arc<HashMap<String, String>>,
}

impl ServerState {
    pub fn new(rows: Arc<dyn RowStore>, sessions: HashMap<String, String>) -> Self {
        Self {
            rows,
            sessions: Arc::new(sessions),
        }
    }

    fn session_for(&self, token: Option<&str>) -> Option<Session> {
        let token = token?;
        self.sessions.get(token).map(|user_id| Session {
            user_id: user_id.clone(),
            access_token: token.to_string(),
        })
    }

    fn cookie_session(&self, headers: &HeaderMap) -> Option<Session> {
        let prefix = format!("{}=", SESSION_COOKIE);
        let token = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .find_map(|pair| pair.trim().strip_prefix(prefix.as_str()));
        self.session_for(token)
    }

    fn bearer_session(&self, headers: &HeaderMap) -> Option<Session> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        self.session_for(token)
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn unauthenticated() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "unauthenticated")
}

fn remote_error_response(error: RemoteError) -> Response {
    match error {
        RemoteError::Unauthorized => error_response(StatusCode::FORBIDDEN, "not authorized for this record"),
        RemoteError::Rejected(message) => error_response(StatusCode::BAD_REQUEST, message),
        other => {
            log::error!("Sync server: write failed: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn ok() -> Response {
    (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
}

// ===== Sync endpoint =====

async fn sync_project(State(state): State<ServerState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let Some(raw) = body.get("project") else {
        return error_response(StatusCode::BAD_REQUEST, "missing project id");
    };
    let has_id = raw
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        return error_response(StatusCode::BAD_REQUEST, "missing project id");
    }
    let project: Project = match serde_json::from_value(raw.clone()) {
        Ok(project) => project,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid project: {}", e)),
    };

    let Some(session) = state.cookie_session(&headers) else {
        return unauthenticated();
    };

    match write_project(state.rows.as_ref(), &session, &project).await {
        Ok(()) => {
            log::debug!("Sync server: stored project {} for {}", project.id, session.user_id);
            ok()
        }
        Err(e) => remote_error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody {
    #[serde(default)]
    project_id: Option<String>,
}

async fn delete_synced_project(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<DeleteBody>,
) -> Response {
    let Some(project_id) = body.project_id.filter(|id| !id.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing project id");
    };
    let Some(session) = state.cookie_session(&headers) else {
        return unauthenticated();
    };

    match state.rows.delete_project(&session, &project_id).await {
        Ok(()) => ok(),
        Err(e) => remote_error_response(e),
    }
}

// ===== Table API =====

type Filters = Query<HashMap<String, String>>;

/// Value of a `column=op.value` filter
fn filter<'a>(filters: &'a HashMap<String, String>, column: &str, op: &str) -> Option<&'a str> {
    filters.get(column)?.strip_prefix(op)
}

/// `(a,b,c)` list
fn parse_list(raw: &str) -> Vec<String> {
    raw.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .map(|inner| {
            inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

async fn list_projects(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let Some(session) = state.bearer_session(&headers) else {
        return unauthenticated();
    };
    match state.rows.fetch_projects(&session).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => remote_error_response(e),
    }
}

async fn upsert_projects(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(rows): Json<Vec<ProjectRow>>,
) -> Response {
    let Some(session) = state.bearer_session(&headers) else {
        return unauthenticated();
    };
    for row in &rows {
        if let Err(e) = state.rows.upsert_project(&session, row).await {
            return remote_error_response(e);
        }
    }
    StatusCode::CREATED.into_response()
}

async fn delete_projects(State(state): State<ServerState>, headers: HeaderMap, Query(filters): Filters) -> Response {
    let Some(session) = state.bearer_session(&headers) else {
        return unauthenticated();
    };
    let Some(project_id) = filter(&filters, "id", "eq.") else {
        return error_response(StatusCode::BAD_REQUEST, "delete requires id=eq.<id>");
    };
    match state.rows.delete_project(&session, project_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => remote_error_response(e),
    }
}

async fn list_sections(State(state): State<ServerState>, headers: HeaderMap, Query(filters): Filters) -> Response {
    let Some(session) = state.bearer_session(&headers) else {
        return unauthenticated();
    };
    let project_ids = if let Some(list) = filter(&filters, "project_id", "in.") {
        parse_list(list)
    } else if let Some(id) = filter(&filters, "project_id", "eq.") {
        vec![id.to_string()]
    } else {
        return error_response(StatusCode::BAD_REQUEST, "sections require a project_id filter");
    };
    match state.rows.fetch_sections(&session, &project_ids).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => remote_error_response(e),
    }
}

async fn upsert_sections(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(rows): Json<Vec<SectionRow>>,
) -> Response {
    let Some(session) = state.bearer_session(&headers) else {
        return unauthenticated();
    };
    match state.rows.upsert_sections(&session, &rows).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => remote_error_response(e),
    }
}

async fn delete_sections(State(state): State<ServerState>, headers: HeaderMap, Query(filters): Filters) -> Response {
    let Some(session) = state.bearer_session(&headers) else {
        return unauthenticated();
    };
    let Some(project_id) = filter(&filters, "project_id", "eq.") else {
        return error_response(StatusCode::BAD_REQUEST, "delete requires project_id=eq.<id>");
    };
    let keep = filter(&filters, "id", "not.in.").map(parse_list).unwrap_or_default();
    match state.rows.delete_sections_except(&session, project_id, &keep).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => remote_error_response(e),
    }
}

async fn current_user(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    match state.bearer_session(&headers) {
        Some(session) => Json(json!({ "id": session.user_id })).into_response(),
        None => unauthenticated(),
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/projects/sync", post(sync_project).delete(delete_synced_project))
        .route(
            "/rest/v1/projects",
            get(list_projects).post(upsert_projects).delete(delete_projects),
        )
        .route(
            "/rest/v1/sections",
            get(list_sections).post(upsert_sections).delete(delete_sections),
        )
        .route("/auth/v1/user", get(current_user))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Running server handle
pub struct SyncServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Ask the server to stop after in-flight requests finish
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait until the server task exits
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            log::warn!("Sync server: task ended abnormally: {}", e);
        }
    }
}

/// Bind `addr` and serve in the background.
pub async fn start_server(addr: &str, state: ServerState) -> std::io::Result<SyncServer> {
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    log::info!("Sync server: listening on http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);

    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                log::info!("Sync server: shutting down");
            })
            .await
            .ok();
    });

    Ok(SyncServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

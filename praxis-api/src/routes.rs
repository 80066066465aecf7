//! HTTP route handlers for the API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use praxis::core::cancel::CancelToken;
use praxis::core::types::TaskStatus;
use praxis::io::materialize::MaterializeReport;
use praxis::io::records::{ChatRecord, list_chats, list_run_logs};
use praxis::io::workspace_store::{WorkspaceError, WorkspaceScope, WorkspaceSummary};
use praxis::looping::{AgentCallError, LoopEvent};
use praxis::objective::{RunStatus, run_objective};

use crate::state::{AppState, ChangeEvent};

type ApiError = (StatusCode, String);
type ApiResult<T> = Result<T, ApiError>;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route("/workspaces/{title}", delete(delete_workspace))
        .route("/workspaces/{title}/select", post(select_workspace))
        .route("/workspaces/{title}/chats", get(workspace_chats))
        .route("/workspaces/{title}/logs", get(workspace_logs))
        .route("/objective", post(start_objective))
        .route("/objective/cancel", post(cancel_objective))
}

async fn health() -> &'static str {
    "ok"
}

fn workspace_error(err: WorkspaceError) -> ApiError {
    let status = match &err {
        WorkspaceError::Duplicate(_) => StatusCode::CONFLICT,
        WorkspaceError::Unknown(_) => StatusCode::NOT_FOUND,
        WorkspaceError::InvalidTitle { .. }
        | WorkspaceError::InvalidFolder { .. }
        | WorkspaceError::ReservedKey(_)
        | WorkspaceError::NoneSelected => StatusCode::BAD_REQUEST,
        WorkspaceError::Io { .. } | WorkspaceError::Registry { .. } | WorkspaceError::Lock { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn internal(err: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

#[derive(Debug, Serialize)]
struct WorkspacesResponse {
    current: Option<String>,
    workspaces: Vec<WorkspaceSummary>,
}

/// GET /api/workspaces - registry contents plus the selected workspace.
async fn list_workspaces(State(state): State<AppState>) -> ApiResult<Json<WorkspacesResponse>> {
    let mut session = state.session();
    session.store_mut().reload().map_err(workspace_error)?;
    Ok(Json(WorkspacesResponse {
        current: session.current().map(str::to_string),
        workspaces: session.store().list(),
    }))
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceRequest {
    title: String,
    #[serde(default)]
    description: String,
}

/// POST /api/workspaces - create and select a workspace.
async fn create_workspace(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<(StatusCode, Json<WorkspaceScope>)> {
    let scope = state
        .session()
        .create(&req.title, &req.description)
        .map_err(workspace_error)?;
    state.broadcast(ChangeEvent::RegistryChanged);
    Ok((StatusCode::CREATED, Json(scope)))
}

/// DELETE /api/workspaces/{title}
async fn delete_workspace(State(state): State<AppState>, Path(title): Path<String>) -> ApiResult<StatusCode> {
    state.session().delete(&title).map_err(workspace_error)?;
    state.broadcast(ChangeEvent::RegistryChanged);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/workspaces/{title}/select
async fn select_workspace(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Json<WorkspaceScope>> {
    let scope = state.session().select(&title).map_err(workspace_error)?;
    state.broadcast(ChangeEvent::CurrentChanged);
    Ok(Json(scope))
}

/// GET /api/workspaces/{title}/chats - saved chats, newest first.
async fn workspace_chats(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Json<Vec<ChatRecord>>> {
    let scope = state.session().resolve(Some(&title)).map_err(workspace_error)?;
    list_chats(&scope).map(Json).map_err(internal)
}

/// GET /api/workspaces/{title}/logs - run-log file names, newest first.
async fn workspace_logs(State(state): State<AppState>, Path(title): Path<String>) -> ApiResult<Json<Vec<String>>> {
    let scope = state.session().resolve(Some(&title)).map_err(workspace_error)?;
    list_run_logs(&scope).map(Json).map_err(internal)
}

#[derive(Debug, Deserialize)]
struct ObjectiveRequest {
    objective: String,
    workspace: Option<String>,
    max_iterations: Option<u32>,
}

#[derive(Debug, Serialize)]
struct TaskSummary {
    task_id: String,
    description: String,
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct ObjectiveResponse {
    run_id: String,
    status: RunStatus,
    tasks: Vec<TaskSummary>,
    refined_output: Option<String>,
    log_path: Option<String>,
    materialized: Option<MaterializeReport>,
    problems: Vec<String>,
}

/// Clears the active-run slot however the run ends.
struct ActiveRunGuard(AppState);

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        *self.0.active_run() = None;
    }
}

/// POST /api/objective - run an objective to the end on a blocking thread.
///
/// Only one run may be in flight; a second request gets 409.
async fn start_objective(
    State(state): State<AppState>,
    Json(req): Json<ObjectiveRequest>,
) -> ApiResult<Json<ObjectiveResponse>> {
    let scope = state
        .session()
        .resolve(req.workspace.as_deref())
        .map_err(workspace_error)?;
    let mut config = (*state.config).clone();
    if let Some(max_iterations) = req.max_iterations {
        config.max_iterations = max_iterations;
        config
            .validate()
            .map_err(|err| (StatusCode::BAD_REQUEST, format!("{err:#}")))?;
    }

    let cancel = CancelToken::new();
    {
        let mut active = state.active_run();
        if active.is_some() {
            return Err((StatusCode::CONFLICT, "another objective is running".to_string()));
        }
        *active = Some(cancel.clone());
    }
    info!(workspace = %scope.title, "starting objective");

    let worker = state.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let _guard = ActiveRunGuard(worker.clone());
        let mut run_id = String::new();
        let result = run_objective(
            &*worker.generator,
            &scope,
            &req.objective,
            &config,
            &cancel,
            |event| forward_event(&worker, &mut run_id, event),
        );
        let status = match &result {
            Ok(report) => report.status.as_str(),
            Err(_) => "failed",
        };
        worker.broadcast(ChangeEvent::RunFinished {
            run_id,
            status: status.to_string(),
        });
        result
    })
    .await;

    let result = joined.map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, format!("run task failed: {err}")))?;
    let report = result.map_err(|err| {
        warn!(err = %format!("{err:#}"), "objective failed");
        let status = if err.downcast_ref::<AgentCallError>().is_some() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, format!("{err:#}"))
    })?;

    Ok(Json(ObjectiveResponse {
        run_id: report.run_id,
        status: report.status,
        tasks: report
            .tasks
            .into_iter()
            .map(|task| TaskSummary {
                task_id: task.id,
                description: task.description,
                status: task.status,
            })
            .collect(),
        refined_output: report.refined_output,
        log_path: report.log_path.map(|path| path.display().to_string()),
        materialized: report.materialized,
        problems: report.problems,
    }))
}

fn forward_event(state: &AppState, run_id: &mut String, event: &LoopEvent) {
    match event {
        LoopEvent::Started { run_id: id } => run_id.clone_from(id),
        LoopEvent::TaskStarted { iteration, task } => state.broadcast(ChangeEvent::TaskStarted {
            run_id: run_id.clone(),
            iteration: *iteration,
            description: task.description.clone(),
        }),
        LoopEvent::TaskCompleted { iteration, .. } => state.broadcast(ChangeEvent::TaskCompleted {
            run_id: run_id.clone(),
            iteration: *iteration,
        }),
        LoopEvent::OrchestratorReplied { .. } | LoopEvent::Refined { .. } => {}
    }
}

/// POST /api/objective/cancel - stop the active run before its next iteration.
async fn cancel_objective(State(state): State<AppState>) -> ApiResult<StatusCode> {
    match state.active_run().as_ref() {
        Some(token) => {
            token.cancel();
            info!("cancellation requested");
            Ok(StatusCode::ACCEPTED)
        }
        None => Err((StatusCode::NOT_FOUND, "no objective is running".to_string())),
    }
}

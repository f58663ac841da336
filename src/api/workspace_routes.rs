//! Workspace REST endpoints used by the editing UI
//!
//! Every handler hops onto the blocking pool through [`run_blocking`], so a
//! stuck filesystem call surfaces as a timeout instead of a hung request.

use super::server::{run_blocking, AppState};
use crate::error::{FocalError, Result};
use crate::namespace::prompts_from_snapshot;
use crate::types::{EntryKind, FileNode, Fingerprint, TreeNode};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Routes under `/api`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tree", get(tree_handler))
        .route("/api/status", get(status_handler))
        .route(
            "/api/file",
            get(read_file_handler)
                .post(write_file_handler)
                .delete(delete_file_handler),
        )
        .route(
            "/api/folder",
            post(create_folder_handler).delete(delete_folder_handler),
        )
        .route("/api/move", post(move_handler))
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteFolderQuery {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileResponse {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveResponse {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub server_id: String,
    pub workspace_root: String,
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
    pub prompts: Vec<String>,
    pub subscribers: usize,
    pub sessions: usize,
}

async fn tree_handler(State(state): State<AppState>) -> Result<Json<Vec<TreeNode>>> {
    let store = state.store.clone();
    let tree = run_blocking(state.io_timeout, move || store.tree()).await?;
    Ok(Json(tree))
}

async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let store = state.store.clone();
    let (fingerprint, prompts) = run_blocking(state.io_timeout, move || {
        let snapshot = store.list()?;
        let prompts: Vec<String> = prompts_from_snapshot(&snapshot)
            .into_iter()
            .map(|p| p.name)
            .collect();
        Ok((store.fingerprint()?, prompts))
    })
    .await?;

    Ok(Json(StatusResponse {
        server_id: state.server_id.clone(),
        workspace_root: state.store.root().display().to_string(),
        fingerprint,
        prompts,
        subscribers: state.hub.subscriber_count(),
        sessions: state.sessions.count().await,
    }))
}

async fn read_file_handler(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileResponse>> {
    let store = state.store.clone();
    let path = query.path.clone();
    let content = run_blocking(state.io_timeout, move || store.read(&path)).await?;
    Ok(Json(FileResponse {
        path: query.path,
        content,
    }))
}

async fn write_file_handler(
    State(state): State<AppState>,
    Json(req): Json<WriteFileRequest>,
) -> Result<Json<FileNode>> {
    let store = state.store.clone();
    let node = run_blocking(state.io_timeout, move || store.write(&req.path, &req.content)).await?;
    info!("Saved {} ({} bytes)", node.path, node.size);
    Ok(Json(node))
}

async fn delete_file_handler(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<StatusCode> {
    let store = state.store.clone();
    run_blocking(state.io_timeout, move || {
        match store.kind_of(&query.path)? {
            Some(EntryKind::File) => store.delete(&query.path, false).map(|_| ()),
            Some(EntryKind::Folder) => Err(FocalError::Conflict(format!(
                "'{}' is a folder",
                query.path
            ))),
            None => Err(FocalError::NotFound(query.path)),
        }
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_folder_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<StatusCode> {
    let store = state.store.clone();
    run_blocking(state.io_timeout, move || store.create_folder(&req.path)).await?;
    Ok(StatusCode::CREATED)
}

async fn delete_folder_handler(
    State(state): State<AppState>,
    Query(query): Query<DeleteFolderQuery>,
) -> Result<StatusCode> {
    let store = state.store.clone();
    run_blocking(state.io_timeout, move || {
        match store.kind_of(&query.path)? {
            Some(EntryKind::Folder) => store.delete(&query.path, query.recursive).map(|_| ()),
            Some(EntryKind::File) => Err(FocalError::Conflict(format!(
                "'{}' is a file",
                query.path
            ))),
            None => Err(FocalError::NotFound(query.path)),
        }
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_handler(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveResponse>> {
    let store = state.store.clone();
    let (src, dst) = (req.src.clone(), req.dst.clone());
    let kind = run_blocking(state.io_timeout, move || {
        store.move_entry(&src, &dst, req.overwrite)
    })
    .await?;

    Ok(Json(MoveResponse {
        from: req.src,
        to: req.dst,
        kind,
    }))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::import::{ImportCreated, ValidationSummary};
use crate::models::user::AuthUser;
use crate::services::import_service::{CommitOutcome, ImportSession, SessionStage};
use crate::AppState;

#[derive(Serialize)]
pub struct CommitResponse {
    #[serde(flatten)]
    pub outcome: CommitOutcome,
    pub message: String,
}

fn commit_status(outcome: &CommitOutcome) -> StatusCode {
    match outcome {
        CommitOutcome::Completed(_) | CommitOutcome::NoNewEntries { .. } => StatusCode::OK,
        CommitOutcome::NotParsed | CommitOutcome::AlreadyCommitted => StatusCode::CONFLICT,
        CommitOutcome::NoValidEntries => StatusCode::UNPROCESSABLE_ENTITY,
        CommitOutcome::DuplicateCheckFailed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// 1. 上传 CSV 文本，创建导入会话并返回校验预览
pub async fn create_import(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(">>> 收到批量导入文件: user={}, bytes={}", user.id, body.len());

    let mut session = ImportSession::new(state.config.import);
    session.select_file(body);
    let summary = session.parse().map_err(|e| {
        tracing::warn!("--- 导入文件表头不合法: user={}, {}", user.id, e);
        ApiError::from(e)
    })?;

    let session_id = state.imports.insert(user.id, session).await;
    tracing::info!(
        "<<< 导入预览完成: session={}, valid={}, invalid={}, active_sessions={}",
        session_id, summary.valid_count, summary.invalid_count, state.imports.len().await
    );
    Ok((StatusCode::CREATED, Json(ImportCreated { session_id, summary })))
}

/// 2. 在已有会话上换一个文件 (之前的解析结果作废)
pub async fn replace_file(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: String,
) -> Result<Json<ValidationSummary>, ApiError> {
    let session = state.imports.get(id, user.id).await?;
    let mut session = session.lock().await;

    session.select_file(body);
    let summary = session.parse()?;
    tracing::info!("<<< 会话文件已替换: session={}, valid={}", id, summary.valid_count);
    Ok(Json(summary))
}

/// 3. 提交：查重 + 分块写入
pub async fn commit_import(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(">>> 提交批量导入: session={}, user={}", id, user.id);
    let slot = state.imports.get(id, user.id).await?;

    let (outcome, stage) = {
        let mut session = slot.lock().await;
        tracing::debug!("会话状态: stage={:?}, candidates={}", session.stage(), session.candidates().len());
        let outcome = session.commit(&state.store, user.id).await;
        (outcome, session.stage())
    };

    // 已完成的会话不再保留；并发丢弃过的话这里什么也不做
    if stage == SessionStage::Done {
        let _ = state.imports.remove(id, user.id).await;
    }

    let status = commit_status(&outcome);
    let message = outcome.message();
    Ok((status, Json(CommitResponse { outcome, message })))
}

/// 4. 放弃导入
pub async fn discard_import(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.imports.remove(id, user.id).await?;
    tracing::info!("<<< 导入会话已丢弃: session={}", id);
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::require_admin;
use crate::error::{conflict_on_unique, ApiError, USERNAME_TAKEN};
use crate::models::user::{
    AdminFlagUpdate, AuthUser, ProfileUpdate, PublicProfile, UserListQuery, UserProfile, UserSummary,
};
use crate::AppState;

const PROFILE_COLUMNS: &str = "id, username, display_name, name, bio, phone_number, \
    facebook_url, instagram_url, youtube_url, is_admin, created_at, updated_at";

/// 1. 查看自己的资料
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = sqlx::query_as::<_, UserProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?;

    profile
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
}

/// 2. 创建或更新自己的资料，用户名被别人占用时返回 409
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let update = payload
        .normalized()
        .map_err(|msg| ApiError::Validation(msg.to_string()))?;
    tracing::info!(">>> 更新用户资料: user={}, username={}", user.id, update.username);

    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND id <> $2)",
    )
    .bind(&update.username)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;
    if taken {
        tracing::warn!("--- 用户名已被占用: username={}", update.username);
        return Err(ApiError::Conflict(USERNAME_TAKEN.to_string()));
    }

    // is_admin 不在可编辑字段里，只能由管理员修改
    let profile = sqlx::query_as::<_, UserProfile>(&format!(
        r#"
        INSERT INTO users (id, username, display_name, name, bio, phone_number,
                           facebook_url, instagram_url, youtube_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            username = EXCLUDED.username,
            display_name = EXCLUDED.display_name,
            name = EXCLUDED.name,
            bio = EXCLUDED.bio,
            phone_number = EXCLUDED.phone_number,
            facebook_url = EXCLUDED.facebook_url,
            instagram_url = EXCLUDED.instagram_url,
            youtube_url = EXCLUDED.youtube_url,
            updated_at = now()
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(user.id)
    .bind(&update.username)
    .bind(&update.display_name)
    .bind(&update.name)
    .bind(&update.bio)
    .bind(&update.phone_number)
    .bind(&update.facebook_url)
    .bind(&update.instagram_url)
    .bind(&update.youtube_url)
    .fetch_one(&state.db)
    .await
    .map_err(conflict_on_unique(USERNAME_TAKEN))?;

    tracing::info!("<<< 用户资料已保存: user={}", user.id);
    Ok(Json(profile))
}

/// 3. 公开资料 (词条详情页展示贡献者)
pub async fn get_public_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = sqlx::query_as::<_, PublicProfile>(
        r#"
        SELECT id, username, display_name, bio, facebook_url, instagram_url, youtube_url
        FROM users WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    profile
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// 4. 管理员获取用户列表
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&user)?;
    tracing::debug!(">>> 正在获取全量用户列表进行权限管理");

    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT id, username, display_name, is_admin, created_at FROM users",
    );
    builder.push(query.order_clause());
    let users = builder
        .build_query_as::<UserSummary>()
        .fetch_all(&state.db)
        .await?;

    tracing::debug!("<<< 用户列表获取完毕, 数量: {}", users.len());
    Ok(Json(users))
}

/// 5. 管理员设置/取消管理员权限
pub async fn set_admin_flag(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminFlagUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&user)?;
    tracing::info!(">>> 正在变更管理员权限: ID={}, is_admin={}, by={}", id, payload.is_admin, user.id);

    let result = sqlx::query("UPDATE users SET is_admin = $1, updated_at = now() WHERE id = $2")
        .bind(payload.is_admin)
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        tracing::warn!("--- 尝试更新不存在的用户: ID={}", id);
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!("<<< 管理员权限更新成功: ID={}", id);
    Ok(StatusCode::OK)
}

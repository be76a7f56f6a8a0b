use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::models::page::{default_page, is_valid_slug, Page, PageSummary, PageUpdate};
use crate::models::user::AuthUser;
use crate::AppState;

const PAGE_COLUMNS: &str = "id, title, slug, content, created_at, updated_at";

fn checked_slug(slug: &str) -> Result<(), ApiError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(ApiError::NotFound("Page not found".to_string()))
    }
}

/// 1. 按 slug 获取内容页。内置页面不存在时，管理员访问会写入默认内容
pub async fn get_page(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    checked_slug(&slug)?;

    let page = sqlx::query_as::<_, Page>(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE slug = $1"))
        .bind(&slug)
        .fetch_optional(&state.db)
        .await?;
    if let Some(page) = page {
        return Ok(Json(page));
    }

    let is_admin = user.as_ref().is_some_and(AuthUser::is_admin);
    let (title, content) = match default_page(&slug) {
        Some(defaults) if is_admin => defaults,
        _ => return Err(ApiError::NotFound("Page not found".to_string())),
    };

    let page = sqlx::query_as::<_, Page>(&format!(
        r#"
        INSERT INTO pages (title, slug, content) VALUES ($1, $2, $3)
        ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
        RETURNING {PAGE_COLUMNS}
        "#
    ))
    .bind(title)
    .bind(&slug)
    .bind(content)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("<<< 已创建默认内容页: slug={}", slug);
    Ok(Json(page))
}

/// 2. 管理员创建或编辑内容页
pub async fn upsert_page(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(slug): Path<String>,
    Json(payload): Json<PageUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&user)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation(
            "Slug may only contain lowercase letters, digits and hyphens".to_string(),
        ));
    }

    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    // 新建页面时标题缺省取内置标题，再退回 slug
    let insert_title = title
        .clone()
        .or_else(|| default_page(&slug).map(|(t, _)| t.to_string()))
        .unwrap_or_else(|| slug.clone());

    tracing::info!(">>> 保存内容页: slug={}, by={}", slug, user.id);
    let page = sqlx::query_as::<_, Page>(&format!(
        r#"
        INSERT INTO pages (title, slug, content) VALUES ($1, $2, $3)
        ON CONFLICT (slug) DO UPDATE SET
            title = COALESCE($4, pages.title),
            content = EXCLUDED.content,
            updated_at = now()
        RETURNING {PAGE_COLUMNS}
        "#
    ))
    .bind(&insert_title)
    .bind(&slug)
    .bind(&payload.content)
    .bind(&title)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("<<< 内容页已保存: slug={}", page.slug);
    Ok(Json(page))
}

/// 3. 管理后台页面列表
pub async fn list_pages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&user)?;

    let pages = sqlx::query_as::<_, PageSummary>(
        "SELECT id, title, slug, updated_at FROM pages ORDER BY title ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(pages))
}

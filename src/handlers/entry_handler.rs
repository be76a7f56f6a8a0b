use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, WORD_EXISTS};
use crate::models::entry::{
    DictionaryEntry, DictionaryStats, EntryDetail, EntryListQuery, EntryPage, NewEntry,
};
use crate::models::user::AuthUser;
use crate::services::entry_validator;
use crate::AppState;

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;

const ENTRY_COLUMNS: &str =
    "id, word, part_of_speech, definition, created_by, created_at, updated_at";

/// 页码从 1 开始；返回 (page, per_page, offset)
fn paginate(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1) * per_page)
}

/// 转义 ILIKE 的通配符，用户输入按字面匹配
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    query: &'a EntryListQuery,
    owner: Option<Uuid>,
) {
    builder.push(" WHERE TRUE");
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        builder.push(" AND word ILIKE ").push_bind(like_pattern(q));
    }
    if let Some(pos) = query.part_of_speech.as_deref().filter(|p| !p.is_empty()) {
        builder.push(" AND part_of_speech = ").push_bind(pos);
    }
    if let Some(owner) = owner {
        builder.push(" AND created_by = ").push_bind(owner);
    }
}

fn validated(payload: NewEntry) -> Result<NewEntry, ApiError> {
    let entry = NewEntry::trimmed(&payload.word, &payload.part_of_speech, &payload.definition);
    entry_validator::check(&entry).map_err(|e| ApiError::Validation(e.to_string()))?;
    Ok(entry)
}

async fn fetch_entry(state: &AppState, id: Uuid) -> Result<DictionaryEntry, ApiError> {
    let entry = sqlx::query_as::<_, DictionaryEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM dictionary_entries WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    entry.ok_or_else(|| ApiError::NotFound("Entry not found".to_string()))
}

/// 1. 词条列表 (搜索 / 词性筛选 / 只看自己的 / 分页)
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Query(query): Query<EntryListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = match (query.mine, user) {
        (true, Some(user)) => Some(user.id),
        (true, None) => return Err(ApiError::Unauthorized),
        (false, _) => None,
    };
    let (page, per_page, offset) = paginate(query.page, query.per_page);

    let mut count_query = QueryBuilder::<Postgres>::new("SELECT count(*) FROM dictionary_entries");
    push_filters(&mut count_query, &query, owner);
    let total: i64 = count_query.build_query_scalar().fetch_one(&state.db).await?;

    let mut list_query =
        QueryBuilder::<Postgres>::new(format!("SELECT {ENTRY_COLUMNS} FROM dictionary_entries"));
    push_filters(&mut list_query, &query, owner);
    list_query
        .push(" ORDER BY word ASC LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind(offset);
    let entries = list_query
        .build_query_as::<DictionaryEntry>()
        .fetch_all(&state.db)
        .await?;

    tracing::debug!("<<< 词条列表: total={}, page={}, returned={}", total, page, entries.len());
    Ok(Json(EntryPage { entries, total, page, per_page }))
}

/// 2. 词条详情 (带贡献者显示名)
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = sqlx::query_as::<_, EntryDetail>(
        r#"
        SELECT e.id, e.word, e.part_of_speech, e.definition, e.created_by,
               e.created_at, e.updated_at, u.display_name AS contributor
        FROM dictionary_entries e
        LEFT JOIN users u ON u.id = e.created_by
        WHERE e.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    detail
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Entry not found".to_string()))
}

/// 3. 新增单个词条
pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<NewEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = validated(payload)?;
    tracing::info!(">>> 新增词条: word={}, user={}", entry.word, user.id);

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM dictionary_entries WHERE word = $1)",
    )
    .bind(&entry.word)
    .fetch_one(&state.db)
    .await?;
    if exists {
        tracing::warn!("--- 词条已存在: word={}", entry.word);
        return Err(ApiError::Conflict(WORD_EXISTS.to_string()));
    }

    // 并发插入同一个词时由唯一约束兜底，见 ApiError::from(sqlx::Error)
    let created = sqlx::query_as::<_, DictionaryEntry>(&format!(
        r#"
        INSERT INTO dictionary_entries (word, part_of_speech, definition, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(&entry.word)
    .bind(&entry.part_of_speech)
    .bind(&entry.definition)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("<<< 词条创建成功: id={}, word={}", created.id, created.word);
    Ok((StatusCode::CREATED, Json(created)))
}

/// 4. 编辑词条 (作者本人或管理员)
pub async fn update_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let current = fetch_entry(&state, id).await?;
    if !user.can_modify(current.created_by) {
        tracing::warn!("--- 无权编辑词条: id={}, user={}", id, user.id);
        return Err(ApiError::Forbidden);
    }

    let entry = validated(payload)?;
    if entry.word != current.word {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM dictionary_entries WHERE word = $1 AND id <> $2)",
        )
        .bind(&entry.word)
        .bind(id)
        .fetch_one(&state.db)
        .await?;
        if taken {
            return Err(ApiError::Conflict(WORD_EXISTS.to_string()));
        }
    }

    let updated = sqlx::query_as::<_, DictionaryEntry>(&format!(
        r#"
        UPDATE dictionary_entries
        SET word = $1, part_of_speech = $2, definition = $3, updated_at = now()
        WHERE id = $4
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(&entry.word)
    .bind(&entry.part_of_speech)
    .bind(&entry.definition)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("<<< 词条更新成功: id={}", id);
    Ok(Json(updated))
}

/// 5. 删除词条 (作者本人或管理员)
pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let current = fetch_entry(&state, id).await?;
    if !user.can_modify(current.created_by) {
        tracing::warn!("--- 无权删除词条: id={}, user={}", id, user.id);
        return Err(ApiError::Forbidden);
    }

    sqlx::query("DELETE FROM dictionary_entries WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    tracing::warn!("<<< 词条已删除: id={}, word={}, by={}", id, current.word, user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// 首页统计
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = sqlx::query_as::<_, DictionaryStats>(
        r#"
        SELECT count(*) AS total_entries, count(DISTINCT created_by) AS contributors
        FROM dictionary_entries
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    Ok(Json(stats))
}

use std::collections::HashSet;
use std::future::Future;

use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::models::entry::NewEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // 连接层面的问题，重试有意义
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

impl StoreError {
    /// 返回给前端的提示，不带数据库原文
    pub fn user_message(&self) -> &'static str {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                "Some words in this batch already exist in the dictionary."
            }
            StoreError::Unavailable(_) => "The dictionary is temporarily unavailable.",
            StoreError::Database(_) => "This batch could not be saved.",
        }
    }
}

/// 导入流程对远端词条库的全部依赖：一次"word in 集合"读取 + 分块批量写入
pub trait EntryStore {
    /// 返回 words 中已经存在于词库的那部分 (大小写敏感精确匹配)
    fn existing_words(
        &self,
        words: &[String],
    ) -> impl Future<Output = StoreResult<HashSet<String>>> + Send;

    /// 整块写入，成功返回写入条数；任意一条失败则整块失败
    fn insert_many(
        &self,
        entries: &[NewEntry],
        created_by: Uuid,
    ) -> impl Future<Output = StoreResult<u64>> + Send;
}

#[derive(Clone)]
pub struct PgEntryStore {
    pool: PgPool,
}

impl PgEntryStore {
    pub fn new(pool: PgPool) -> Self {
        PgEntryStore { pool }
    }
}

impl EntryStore for PgEntryStore {
    async fn existing_words(&self, words: &[String]) -> StoreResult<HashSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"SELECT word FROM dictionary_entries WHERE word = ANY($1)"#,
        )
        .bind(words)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_many(&self, entries: &[NewEntry], created_by: Uuid) -> StoreResult<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        // 单条 INSERT ... VALUES (...), (...) 语句，唯一约束冲突会让整块回滚
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO dictionary_entries (word, part_of_speech, definition, created_by) ",
        );
        builder.push_values(entries, |mut row, entry| {
            row.push_bind(&entry.word)
                .push_bind(&entry.part_of_speech)
                .push_bind(&entry.definition)
                .push_bind(created_by);
        });

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;

use crate::services::import_service::ImportError;

pub const WORD_EXISTS: &str = "This word is already in the dictionary.";
pub const USERNAME_TAKEN: &str = "Username is already taken";

/// 对外的错误类型，统一转换成 JSON 响应
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("you are not allowed to perform this action")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Import(ImportError::Schema(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Import(ImportError::NoFileSelected) => StatusCode::CONFLICT,
            ApiError::Import(ImportError::UnknownSession) => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Forbidden => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Validation(_) => "ValidationError",
            ApiError::Import(ImportError::Schema(_)) => "SchemaError",
            ApiError::Import(_) => "ImportError",
            ApiError::Database(_) => "DatabaseError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 数据库细节只写日志，不返回给前端
        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!("!!! 数据库异常: {}", e);
                "Something went wrong. Please try again.".to_string()
            }
            other => {
                tracing::debug!("--- 请求被拒绝: status={}, message={}", status, other);
                other.to_string()
            }
        };

        (status, Json(ErrorBody { error: self.kind(), message })).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Entry not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ApiError::Conflict(WORD_EXISTS.to_string())
            }
            _ => ApiError::Database(err),
        }
    }
}

/// 唯一约束冲突时换成指定的提示，其余错误照常转换
pub fn conflict_on_unique(message: &'static str) -> impl Fn(sqlx::Error) -> ApiError {
    move |err| match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ApiError::Conflict(message.to_string())
        }
        other => ApiError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::csv_parser::SchemaError;

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Conflict(WORD_EXISTS.into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(ImportError::Schema(SchemaError { missing: vec!["word"] })).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(ImportError::UnknownSession).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn conflict_mapping_passes_other_errors_through() {
        let err = conflict_on_unique(USERNAME_TAKEN)(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn row_not_found_becomes_404() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}

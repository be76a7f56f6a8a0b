use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::ApiError;
use crate::models::user::{AuthUser, Claims};
use crate::AppState;

/// 校验外部认证服务签发的 HS256 令牌
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        let user = match decode_token(bearer.token(), &state.config.jwt_secret) {
            Ok(claims) => AuthUser::from(claims),
            Err(e) => {
                tracing::warn!("--- 令牌校验失败: {}", e);
                return Err(ApiError::Unauthorized);
            }
        };
        if user.is_admin() {
            return Ok(user);
        }

        // 管理员身份以 users.is_admin 为准，后台改动后无需重新签发令牌
        let flag: Option<bool> = sqlx::query_scalar("SELECT is_admin FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_optional(&state.db)
            .await?;
        Ok(user.with_admin_flag(flag.unwrap_or(false)))
    }
}

/// 管理后台接口的前置检查
pub fn require_admin(user: &AuthUser) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        tracing::warn!("--- 非管理员访问管理接口: user={}", user.id);
        Err(ApiError::Forbidden)
    }
}

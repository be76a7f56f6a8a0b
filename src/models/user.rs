use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

/// 外部认证服务签发的 JWT 载荷
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// 当前请求的用户身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    /// 本人或管理员才能修改/删除词条
    pub fn can_modify(&self, owner: Uuid) -> bool {
        self.id == owner || self.is_admin()
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser { id: claims.sub, role: claims.role }
    }
}

impl AuthUser {
    /// users.is_admin 为真时提升为管理员 (令牌里的 role 可能滞后)
    pub fn with_admin_flag(mut self, is_admin: bool) -> Self {
        if is_admin {
            self.role = ADMIN_ROLE.to_string();
        }
        self
    }
}

/// users 表完整记录 (本人查看)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub youtube_url: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 对外公开的资料，不含手机号
#[derive(Debug, Serialize, FromRow)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub youtube_url: Option<String>,
}

/// 管理后台用户列表
#[derive(Debug, Serialize, FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AdminFlagUpdate {
    pub is_admin: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl UserListQuery {
    /// 排序字段只接受白名单，其余回落到 username
    pub fn order_clause(&self) -> String {
        let column = match self.sort.as_deref() {
            Some("display_name") => "display_name",
            Some("is_admin") => "is_admin",
            Some("created_at") => "created_at",
            _ => "username",
        };
        let direction = match self.order.as_deref() {
            Some(o) if o.eq_ignore_ascii_case("desc") => "DESC",
            _ => "ASC",
        };
        format!(" ORDER BY {column} {direction}")
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub youtube_url: Option<String>,
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ProfileUpdate {
    /// 去空白；用户名必填且不能含空白，显示名缺省用用户名
    pub fn normalized(self) -> Result<Self, &'static str> {
        let username = self.username.trim().to_string();
        if username.is_empty() {
            return Err("Username is required");
        }
        if username.chars().any(char::is_whitespace) {
            return Err("Username cannot contain spaces");
        }
        let display_name = match self.display_name.trim() {
            "" => username.clone(),
            name => name.to_string(),
        };

        Ok(ProfileUpdate {
            username,
            display_name,
            name: optional(self.name),
            bio: optional(self.bio),
            phone_number: optional(self.phone_number),
            facebook_url: optional(self.facebook_url),
            instagram_url: optional(self.instagram_url),
            youtube_url: optional(self.youtube_url),
        })
    }
}

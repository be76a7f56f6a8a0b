use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// 远端单次批量写入的上限
pub const MAX_CHUNK_SIZE: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in .env file")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub import: ImportOptions,
    pub sessions: SessionLimits,
}

/// 导入会话在内存中的保留策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub ttl: Duration,
    pub max_per_user: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        SessionLimits { ttl: Duration::from_secs(30 * 60), max_per_user: 5 }
    }
}

/// 批量导入的可调参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub chunk_size: usize,
    pub delimiter: char,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions { chunk_size: MAX_CHUNK_SIZE, delimiter: ',' }
    }
}

impl AppConfig {
    /// 从环境变量读取 (调用前先 dotenv())
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "BIND_ADDR", value: raw })?,
            None => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", value: raw })?,
            None => 5,
        };

        // 超过远端上限的值直接压到 50
        let chunk_size = match lookup("IMPORT_CHUNK_SIZE") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n.min(MAX_CHUNK_SIZE),
                _ => return Err(ConfigError::Invalid { key: "IMPORT_CHUNK_SIZE", value: raw }),
            },
            None => MAX_CHUNK_SIZE,
        };

        let delimiter = match lookup("IMPORT_DELIMITER") {
            Some(raw) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c != '\n' && c != '\r' => c,
                    _ => return Err(ConfigError::Invalid { key: "IMPORT_DELIMITER", value: raw }),
                }
            }
            None => ',',
        };

        let ttl = match lookup("IMPORT_SESSION_TTL_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Invalid { key: "IMPORT_SESSION_TTL_SECS", value: raw }),
            },
            None => SessionLimits::default().ttl,
        };

        let max_per_user = match lookup("IMPORT_MAX_SESSIONS_PER_USER") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::Invalid { key: "IMPORT_MAX_SESSIONS_PER_USER", value: raw }),
            },
            None => SessionLimits::default().max_per_user,
        };

        Ok(AppConfig {
            database_url,
            jwt_secret,
            bind_addr,
            db_max_connections,
            import: ImportOptions { chunk_size, delimiter },
            sessions: SessionLimits { ttl, max_per_user },
        })
    }
}

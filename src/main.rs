use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use sqlx::postgres::{PgPool, PgPoolOptions};
use dotenvy::dotenv;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 声明子模块
mod auth;
mod config;
mod error;
mod handlers;
mod models;
mod services;

use config::AppConfig;
use services::entry_store::PgEntryStore;
use services::import_service::{spawn_sweeper, ImportRegistry};

// 定义全局状态，方便在 Handler 中获取数据库连接池和导入会话
pub struct AppState {
    pub db: PgPool,
    pub store: PgEntryStore,
    pub config: AppConfig,
    pub imports: Arc<ImportRegistry>,
}

fn build_router(state: Arc<AppState>) -> Router {
    // 开发阶段允许所有来源，生产环境需收紧
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // 词条接口
        .route("/api/entries", get(handlers::entry_handler::list_entries)
            .post(handlers::entry_handler::create_entry))
        .route("/api/entries/:id", get(handlers::entry_handler::get_entry)
            .put(handlers::entry_handler::update_entry)
            .delete(handlers::entry_handler::delete_entry))
        .route("/api/stats", get(handlers::entry_handler::stats))

        // 用户资料接口
        .route("/api/profile", get(handlers::user_handler::get_profile)
            .put(handlers::user_handler::update_profile))
        .route("/api/users/:id", get(handlers::user_handler::get_public_profile))

        // 内容页接口
        .route("/api/pages/:slug", get(handlers::page_handler::get_page)
            .put(handlers::page_handler::upsert_page))

        // 管理后台接口
        .route("/api/admin/users", get(handlers::user_handler::list_users))
        .route("/api/admin/users/:id/admin", put(handlers::user_handler::set_admin_flag))
        .route("/api/admin/pages", get(handlers::page_handler::list_pages))

        // 批量导入接口
        .route("/api/imports", post(handlers::import_handler::create_import))
        .route("/api/imports/:id", axum::routing::delete(handlers::import_handler::discard_import))
        .route("/api/imports/:id/file", post(handlers::import_handler::replace_file))
        .route("/api/imports/:id/commit", post(handlers::import_handler::commit_import))

        // 中间件：日志记录和跨域
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // 1. 初始化日志系统
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. 加载 .env 环境变量
    dotenv().ok();
    let config = AppConfig::from_env().expect("Invalid configuration");

    // 3. 初始化数据库连接池并执行迁移
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to create database connection pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let addr = config.bind_addr;
    tracing::info!(
        "导入参数: chunk_size={}, delimiter={:?}",
        config.import.chunk_size, config.import.delimiter
    );

    // 导入会话登记表，后台定期清理过期会话
    let imports = Arc::new(ImportRegistry::new(
        config.sessions.ttl,
        config.sessions.max_per_user,
    ));
    spawn_sweeper(imports.clone(), Duration::from_secs(60));

    let shared_state = Arc::new(AppState {
        store: PgEntryStore::new(pool.clone()),
        db: pool,
        config,
        imports,
    });

    let app = build_router(shared_state);

    // 4. 启动服务
    tracing::info!("🚀 Server started at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind address");
    axum::serve(listener, app).await.expect("Server error");
}

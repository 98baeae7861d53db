mod config;
mod error;
mod handlers;
mod middleware;
mod migration;
mod models;
mod response;
mod routes;
mod services;
mod utils;

use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use services::cache::CacheService;
use services::upload::UploadConfig;
use std::env;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        // Auth routes
        crate::handlers::register,
        crate::handlers::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::get_current_user,
        crate::handlers::auth::update_profile,
        crate::handlers::change_password,
        // Member routes
        crate::handlers::member::get_member,
        // Forum routes
        crate::handlers::forum::list_forums,
        crate::handlers::forum::get_forum,
        crate::handlers::forum::follow_link,
        crate::handlers::forum::create_forum,
        crate::handlers::forum::update_forum,
        crate::handlers::forum::delete_forum,
        crate::handlers::forum::upload_forum_image,
        // Topic routes
        crate::handlers::topic::list_topics,
        crate::handlers::topic::get_topic,
        crate::handlers::topic::create_topic,
        // Post routes
        crate::handlers::post::list_posts,
        crate::handlers::post::get_post,
        crate::handlers::post::create_reply,
        crate::handlers::post::update_post,
        crate::handlers::post::delete_post,
        // Poll routes
        crate::handlers::poll::get_topic_poll,
        crate::handlers::poll::vote,
        // Attachment routes
        crate::handlers::attachment::upload_attachment,
        crate::handlers::attachment::download_attachment,
        crate::handlers::attachment::delete_attachment,
        // Moderation routes
        crate::handlers::moderation::lock_topic,
        crate::handlers::moderation::unlock_topic,
        crate::handlers::moderation::delete_topic,
        crate::handlers::moderation::move_topic,
        crate::handlers::moderation::move_targets,
        crate::handlers::moderation::update_topic_type,
        crate::handlers::moderation::moderation_queue,
        crate::handlers::moderation::approve_post,
        crate::handlers::moderation::disapprove_post,
        // Tracking routes
        crate::handlers::tracking::unread_topics,
        crate::handlers::tracking::mark_forum_read,
        crate::handlers::tracking::mark_all_forums_read,
        // Permission routes
        crate::handlers::permission::set_permission,
        crate::handlers::permission::list_permissions,
        crate::handlers::permission::delete_permission,
    ),
    components(
        schemas(
            crate::response::ApiResponse<serde_json::Value>,
            crate::response::PaginatedResponse<serde_json::Value>,
            crate::error::AppError,
            // Auth
            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::RefreshTokenRequest,
            crate::handlers::auth::AuthResponse,
            crate::handlers::auth::TokenResponse,
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::UpdateProfileRequest,
            crate::handlers::auth::ChangePasswordRequest,
            // Member
            crate::handlers::member::MemberResponse,
            // Forum
            crate::handlers::forum::ForumRequest,
            crate::handlers::forum::ForumResponse,
            crate::handlers::forum::ForumDetailResponse,
            crate::models::ForumType,
            // Topic
            crate::handlers::topic::TopicResponse,
            crate::handlers::topic::CreateTopicRequest,
            crate::models::TopicType,
            crate::models::TopicStatus,
            // Post
            crate::handlers::post::PostResponse,
            crate::handlers::post::ReplyRequest,
            crate::handlers::post::EditPostRequest,
            crate::handlers::post::DeletePostResponse,
            // Poll
            crate::handlers::poll::PollRequest,
            crate::handlers::poll::PollResponse,
            crate::handlers::poll::PollOptionResponse,
            crate::handlers::poll::VoteRequest,
            // Attachment
            crate::handlers::attachment::AttachmentResponse,
            // Moderation
            crate::handlers::moderation::MoveTopicRequest,
            crate::handlers::moderation::UpdateTopicTypeRequest,
            crate::handlers::moderation::QueuedPostResponse,
            // Permissions
            crate::handlers::permission::GrantRequest,
            crate::services::permission::Perm,
            crate::models::ForumPermissionModel,
        )
    ),
    tags(
        (name = "auth", description = "Authentication and account operations"),
        (name = "members", description = "Forum member profiles"),
        (name = "forums", description = "Forum tree operations"),
        (name = "topics", description = "Topic operations"),
        (name = "posts", description = "Post operations"),
        (name = "polls", description = "Topic polls and voting"),
        (name = "attachments", description = "Post attachments"),
        (name = "moderation", description = "Moderation operations"),
        (name = "tracking", description = "Read tracking"),
        (name = "permissions", description = "Forum permission grants"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration before doing anything else
    let jwt_config = validate_config()?;
    utils::jwt::init_jwt_config(jwt_config)?;

    tracing::info!("Starting Agora forum v{}...", env!("CARGO_PKG_VERSION"));

    let db = config::database::get_database().await?;
    tracing::info!("Database connected successfully");

    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    services::bootstrap_admin::ensure_bootstrap_admin(&db).await?;

    let upload_config = UploadConfig::from_env();

    // Redis is optional; the forum tree is rebuilt from the database without it
    let cache = match config::redis::get_redis().await {
        Ok(conn) => {
            tracing::info!("Redis connected successfully");
            Some(CacheService::new(conn))
        }
        Err(e) => {
            tracing::warn!("Redis unavailable, running without cache: {}", e);
            None
        }
    };

    let mut app = create_app(&upload_config)
        .layer(Extension(db))
        .layer(Extension(upload_config));

    if let Some(cache) = cache {
        app = app.layer(Extension(cache));
    }

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Validate all required configuration at startup (fail-fast).
fn validate_config() -> anyhow::Result<crate::config::jwt::JwtConfig> {
    let jwt_config = config::jwt::JwtConfig::from_env()?;

    if env::var("DATABASE_URL").is_err() {
        return Err(anyhow::anyhow!(
            "DATABASE_URL environment variable must be set"
        ));
    }

    let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
    std::fs::create_dir_all(&upload_dir).map_err(|e| {
        anyhow::anyhow!("Failed to create upload directory '{}': {}", upload_dir, e)
    })?;

    Ok(jwt_config)
}

fn build_cors_layer() -> CorsLayer {
    use axum::http::{header, HeaderValue, Method};

    let origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins_str == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

fn create_app(upload_config: &UploadConfig) -> Router {
    // Only forum images are public; attachments go through the download route.
    let forum_images = ServeDir::new(upload_config.resolve("forums"));

    Router::new()
        .route("/", get(health_check))
        .merge(routes::create_routes(upload_config))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/uploads/forums", forum_images)
        .layer(axum::middleware::from_fn(
            middleware::security::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Health check successful", body = serde_json::Value)
    )
)]
async fn health_check(
    Extension(db): Extension<DatabaseConnection>,
) -> impl IntoResponse {
    let db_ok = db
        .query_one(Statement::from_string(
            sea_orm::DatabaseBackend::Postgres,
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();

    let status = if db_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "Agora forum",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}

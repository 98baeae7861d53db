use crate::config::rate_limit::{RateLimitConfig, RateLimitRule, RouteGroup};
use crate::handlers;
use crate::middleware::auth::{auth_middleware, optional_auth_middleware};
use crate::services::upload::UploadConfig;
use axum::{extract::DefaultBodyLimit, middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_routes(upload_config: &UploadConfig) -> Router {
    Router::new().nest("/api/v1", api_routes(upload_config))
}

fn api_routes(upload_config: &UploadConfig) -> Router {
    let rate_limit_config = RateLimitConfig::from_env();

    let auth = auth_routes(&rate_limit_config);
    let public_read = public_read_routes(&rate_limit_config)
        .layer(middleware::from_fn(optional_auth_middleware));
    let protected = protected_routes(&rate_limit_config, upload_config)
        .layer(middleware::from_fn(auth_middleware));

    auth.merge(public_read).merge(protected)
}

/// Auth routes: register, login, token refresh and logout.
fn auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/register", routing::post(handlers::register))
        .route("/auth/login", routing::post(handlers::login))
        .route(
            "/auth/refresh",
            routing::post(handlers::auth::refresh_token),
        )
        .route("/auth/logout", routing::post(handlers::auth::logout));

    with_optional_rate_limit(router, config, RouteGroup::Auth)
}

/// Public reads. Anonymous visitors get the anonymous permission set.
fn public_read_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        // Members
        .route("/members/{id}", routing::get(handlers::member::get_member))
        // Forums
        .route("/forums", routing::get(handlers::forum::list_forums))
        .route("/forums/{id}", routing::get(handlers::forum::get_forum))
        .route(
            "/forums/{id}/redirect",
            routing::get(handlers::forum::follow_link),
        )
        // Topics
        .route(
            "/forums/{id}/topics",
            routing::get(handlers::topic::list_topics),
        )
        .route("/topics/{id}", routing::get(handlers::topic::get_topic))
        .route(
            "/topics/{id}/poll",
            routing::get(handlers::poll::get_topic_poll),
        )
        // Posts
        .route(
            "/topics/{id}/posts",
            routing::get(handlers::post::list_posts),
        )
        .route("/posts/{id}", routing::get(handlers::post::get_post))
        // Attachments
        .route(
            "/attachments/{id}",
            routing::get(handlers::attachment::download_attachment),
        );

    with_optional_rate_limit(router, config, RouteGroup::PublicRead)
}

/// Routes that need an authenticated member.
fn protected_routes(config: &RateLimitConfig, upload_config: &UploadConfig) -> Router {
    let upload_limit = DefaultBodyLimit::max(upload_config.attachment_max_size + MULTIPART_OVERHEAD);

    let router = Router::new()
        // Auth
        .route("/auth/me", routing::get(handlers::get_current_user))
        .route(
            "/auth/profile",
            routing::put(handlers::auth::update_profile),
        )
        .route("/auth/password", routing::put(handlers::change_password))
        // Forums (staff only, checked in handler)
        .route("/forums", routing::post(handlers::forum::create_forum))
        .route(
            "/forums/{id}",
            routing::put(handlers::forum::update_forum).delete(handlers::forum::delete_forum),
        )
        .route(
            "/forums/{id}/image",
            routing::post(handlers::forum::upload_forum_image).layer(upload_limit.clone()),
        )
        // Topics
        .route(
            "/forums/{id}/topics",
            routing::post(handlers::topic::create_topic),
        )
        .route(
            "/topics/{id}",
            routing::delete(handlers::moderation::delete_topic),
        )
        .route(
            "/topics/{id}/lock",
            routing::put(handlers::moderation::lock_topic),
        )
        .route(
            "/topics/{id}/unlock",
            routing::put(handlers::moderation::unlock_topic),
        )
        .route(
            "/topics/{id}/move",
            routing::put(handlers::moderation::move_topic),
        )
        .route(
            "/topics/{id}/move-targets",
            routing::get(handlers::moderation::move_targets),
        )
        .route(
            "/topics/{id}/type",
            routing::put(handlers::moderation::update_topic_type),
        )
        // Posts
        .route(
            "/topics/{id}/posts",
            routing::post(handlers::post::create_reply),
        )
        .route(
            "/posts/{id}",
            routing::put(handlers::post::update_post).delete(handlers::post::delete_post),
        )
        .route(
            "/posts/{id}/approve",
            routing::put(handlers::moderation::approve_post),
        )
        .route(
            "/posts/{id}/disapprove",
            routing::put(handlers::moderation::disapprove_post),
        )
        // Attachments
        .route(
            "/posts/{id}/attachments",
            routing::post(handlers::attachment::upload_attachment).layer(upload_limit),
        )
        .route(
            "/attachments/{id}",
            routing::delete(handlers::attachment::delete_attachment),
        )
        // Polls
        .route("/polls/{id}/votes", routing::post(handlers::poll::vote))
        // Moderation
        .route(
            "/moderation/queue",
            routing::get(handlers::moderation::moderation_queue),
        )
        // Read tracking
        .route(
            "/tracking/unread-topics",
            routing::get(handlers::tracking::unread_topics),
        )
        .route(
            "/tracking/forums/mark-read",
            routing::post(handlers::tracking::mark_all_forums_read),
        )
        .route(
            "/tracking/forums/{id}/mark-read",
            routing::post(handlers::tracking::mark_forum_read),
        )
        // Permissions (superuser only)
        .route(
            "/admin/permissions",
            routing::get(handlers::permission::list_permissions)
                .post(handlers::permission::set_permission),
        )
        .route(
            "/admin/permissions/{id}",
            routing::delete(handlers::permission::delete_permission),
        );

    with_optional_rate_limit(router, config, RouteGroup::Protected)
}

fn with_optional_rate_limit(router: Router, config: &RateLimitConfig, group: RouteGroup) -> Router {
    if !config.enabled {
        return router;
    }

    let rule: RateLimitRule = config.rule_for(group);
    let Some(governor_conf) = GovernorConfigBuilder::default()
        .per_second(rule.per_second)
        .burst_size(rule.burst_size)
        .finish()
    else {
        tracing::warn!(?group, "Invalid rate limit rule, serving without a limiter");
        return router;
    };

    router.layer(GovernorLayer::new(governor_conf))
}

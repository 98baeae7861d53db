#![allow(dead_code)]

use reqwest::Client;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Once,
};

static INIT: Once = Once::new();
static MIGRATIONS_RAN: AtomicBool = AtomicBool::new(false);
static USER_COUNTER: AtomicUsize = AtomicUsize::new(0);
static FORUM_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub const TEST_PASSWORD: &str = "test_password_123";

fn init_env() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        std::env::set_var(
            "JWT_SECRET",
            "integration_test_secret_that_is_at_least_32_characters_long",
        );
        std::env::set_var("RATE_LIMIT_ENABLED", "false");
        let config = agora::config::jwt::JwtConfig::from_env().unwrap();
        let _ = agora::utils::jwt::init_jwt_config(config);
    });
}

pub struct TestApp {
    pub addr: String,
    pub db: DatabaseConnection,
    pub client: Client,
    pub upload_dir: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.addr, path)
    }
}

pub async fn spawn_app() -> TestApp {
    init_env();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"));

    let db = sea_orm::Database::connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    if !MIGRATIONS_RAN.swap(true, Ordering::SeqCst) {
        agora::migration::Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");
    }

    cleanup_tables(&db).await;

    let upload_dir = "./test_uploads".to_string();
    let upload_config = agora::services::upload::UploadConfig {
        upload_dir: upload_dir.clone(),
        attachment_max_size: 64 * 1024,
    };

    let app = axum::Router::new()
        .route("/", axum::routing::get(|| async { "ok" }))
        .merge(agora::routes::create_routes(&upload_config))
        .layer(axum::middleware::from_fn(
            agora::middleware::security::security_headers_middleware,
        ))
        .layer(axum::extract::Extension(db.clone()))
        .layer(axum::extract::Extension(upload_config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        addr: format!("http://{}", addr),
        db,
        client: Client::new(),
        upload_dir,
    }
}

async fn cleanup_tables(db: &DatabaseConnection) {
    let tables = [
        "topic_poll_votes",
        "topic_poll_options",
        "topic_polls",
        "topic_read_tracks",
        "forum_read_tracks",
        "attachments",
        "posts",
        "topics",
        "forum_permissions",
        "forums",
        "refresh_tokens",
        "forum_profiles",
        "users",
    ];

    for table in tables {
        let sql = format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", table);
        let _ = db
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Postgres,
                sql,
            ))
            .await;
    }
}

pub async fn execute(db: &DatabaseConnection, sql: &str, values: Vec<sea_orm::Value>) {
    db.execute(Statement::from_sql_and_values(
        sea_orm::DatabaseBackend::Postgres,
        sql,
        values,
    ))
    .await
    .unwrap_or_else(|e| panic!("Failed to execute '{}': {}", sql, e));
}

/// Register a member and return (user_id, token, username).
pub async fn register_user(app: &TestApp, prefix: &str) -> (i32, String, String) {
    let counter = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let username = format!("{}_{}", prefix, counter);

    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&json!({
            "username": username,
            "email": format!("{}@test.com", username),
            "password": TEST_PASSWORD
        }))
        .send()
        .await
        .expect("Failed to register user");

    let status = resp.status();
    let body: Value = resp.json().await.expect("register response is JSON");
    assert!(
        body["success"].as_bool().unwrap_or(false),
        "Failed to register user '{}': status={}, body={}",
        username,
        status,
        body
    );

    let user_id = body["data"]["user_id"].as_i64().expect("user_id") as i32;
    let token = body["data"]["token"].as_str().expect("token").to_string();
    (user_id, token, username)
}

/// Register a member and return (user_id, token).
pub async fn create_test_user(app: &TestApp, prefix: &str) -> (i32, String) {
    let (id, token, _) = register_user(app, prefix).await;
    (id, token)
}

/// Change a member's role directly in the database.
pub async fn set_role(db: &DatabaseConnection, user_id: i32, role: &str) {
    execute(
        db,
        "UPDATE users SET role = $1 WHERE id = $2",
        vec![role.into(), user_id.into()],
    )
    .await;
}

pub async fn make_admin(db: &DatabaseConnection, user_id: i32) {
    set_role(db, user_id, "admin").await;
}

/// A registered superuser: (user_id, token).
pub async fn create_admin(app: &TestApp) -> (i32, String) {
    let (id, token) = create_test_user(app, "admin").await;
    make_admin(&app.db, id).await;
    (id, token)
}

/// Create a forum through the API and return its JSON.
pub async fn create_forum_with(app: &TestApp, admin_token: &str, body: Value) -> Value {
    let resp = app
        .client
        .post(app.url("/forums"))
        .bearer_auth(admin_token)
        .json(&body)
        .send()
        .await
        .expect("Failed to create forum");

    let status = resp.status();
    let body: Value = resp.json().await.expect("Failed to parse response");
    assert!(
        body["success"].as_bool().unwrap_or(false),
        "Failed to create forum: status={}, body={}",
        status,
        body
    );
    body["data"].clone()
}

/// Create a default forum, optionally under `parent_id`, and return its id.
pub async fn create_forum(app: &TestApp, admin_token: &str, parent_id: Option<i32>) -> i32 {
    let counter = FORUM_COUNTER.fetch_add(1, Ordering::SeqCst);
    let forum = create_forum_with(
        app,
        admin_token,
        json!({
            "name": format!("Test Forum {}", counter),
            "parent_id": parent_id,
            "description": "A test forum"
        }),
    )
    .await;
    forum["id"].as_i64().expect("forum id") as i32
}

pub async fn create_category(app: &TestApp, admin_token: &str) -> i32 {
    let counter = FORUM_COUNTER.fetch_add(1, Ordering::SeqCst);
    let forum = create_forum_with(
        app,
        admin_token,
        json!({
            "name": format!("Category {}", counter),
            "forum_type": "category"
        }),
    )
    .await;
    forum["id"].as_i64().expect("category id") as i32
}

/// Store a grant directly. `user_id = None` targets anonymous visitors.
pub async fn grant(
    db: &DatabaseConnection,
    user_id: Option<i32>,
    forum_id: Option<i32>,
    codename: &str,
    has_perm: bool,
) {
    execute(
        db,
        "INSERT INTO forum_permissions (user_id, anonymous_user, forum_id, codename, has_perm, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW())",
        vec![
            user_id.into(),
            user_id.is_none().into(),
            forum_id.into(),
            codename.into(),
            has_perm.into(),
        ],
    )
    .await;
}

/// Start a topic and return its JSON.
pub async fn create_topic(app: &TestApp, token: &str, forum_id: i32, subject: &str) -> Value {
    let resp = app
        .client
        .post(app.url(&format!("/forums/{}/topics", forum_id)))
        .bearer_auth(token)
        .json(&json!({
            "subject": subject,
            "content": format!("First post of {}", subject)
        }))
        .send()
        .await
        .expect("Failed to create topic");

    let status = resp.status();
    let body: Value = resp.json().await.expect("Failed to parse response");
    assert!(
        body["success"].as_bool().unwrap_or(false),
        "Failed to create topic: status={}, body={}",
        status,
        body
    );
    body["data"].clone()
}

pub async fn create_topic_id(app: &TestApp, token: &str, forum_id: i32, subject: &str) -> i32 {
    create_topic(app, token, forum_id, subject).await["id"]
        .as_i64()
        .expect("topic id") as i32
}

/// Reply to a topic and return the post JSON.
pub async fn reply(app: &TestApp, token: &str, topic_id: i32, content: &str) -> Value {
    let resp = app
        .client
        .post(app.url(&format!("/topics/{}/posts", topic_id)))
        .bearer_auth(token)
        .json(&json!({ "content": content }))
        .send()
        .await
        .expect("Failed to reply");

    let status = resp.status();
    let body: Value = resp.json().await.expect("Failed to parse response");
    assert!(
        body["success"].as_bool().unwrap_or(false),
        "Failed to reply: status={}, body={}",
        status,
        body
    );
    body["data"].clone()
}

pub async fn get_json(app: &TestApp, path: &str, token: Option<&str>) -> (u16, Value) {
    let mut req = app.client.get(app.url(path));
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await.expect("request failed");
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

pub async fn get_forum(app: &TestApp, forum_id: i32, token: Option<&str>) -> Value {
    let (status, body) = get_json(app, &format!("/forums/{}", forum_id), token).await;
    assert_eq!(status, 200, "forum {} not readable: {}", forum_id, body);
    body["data"]["forum"].clone()
}

pub async fn get_topic(app: &TestApp, topic_id: i32, token: Option<&str>) -> Value {
    let (status, body) = get_json(app, &format!("/topics/{}", topic_id), token).await;
    assert_eq!(status, 200, "topic {} not readable: {}", topic_id, body);
    body["data"].clone()
}

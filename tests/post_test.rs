mod common;

use serde_json::{json, Value};

#[tokio::test]
async fn replies_get_positions_and_update_counters() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (author_id, author_token) = common::create_test_user(&app, "author").await;
    let (replier_id, replier_token) = common::create_test_user(&app, "replier").await;

    let topic_id = common::create_topic_id(&app, &author_token, forum_id, "Rust tips").await;
    let reply = common::reply(&app, &replier_token, topic_id, "Use clippy").await;
    assert_eq!(reply["subject"], "Re: Rust tips");
    assert_eq!(reply["position"], 2);
    assert_eq!(reply["is_topic_tail"], true);
    assert_eq!(reply["is_topic_head"], false);

    common::reply(&app, &author_token, topic_id, "Thanks!").await;

    let topic = common::get_topic(&app, topic_id, Some(&author_token)).await;
    assert_eq!(topic["posts_count"], 3);

    let forum = common::get_forum(&app, forum_id, Some(&author_token)).await;
    assert_eq!(forum["topics_count"], 1);
    assert_eq!(forum["posts_count"], 3);

    let (_, author) = common::get_json(&app, &format!("/members/{}", author_id), None).await;
    assert_eq!(author["data"]["posts_count"], 2);
    let (_, replier) = common::get_json(&app, &format!("/members/{}", replier_id), None).await;
    assert_eq!(replier["data"]["posts_count"], 1);

    let (status, body) = common::get_json(
        &app,
        &format!("/topics/{}/posts?per_page=2&page=2", topic_id),
        Some(&author_token),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["total_pages"], 2);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["position"], 3);
    assert_eq!(items[0]["content"], "Thanks!");
}

#[tokio::test]
async fn content_is_rendered_and_sanitized() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let topic_id = common::create_topic_id(&app, &admin_token, forum_id, "Markup").await;

    let post = common::reply(
        &app,
        &admin_token,
        topic_id,
        "**strong** <script>alert('x')</script>",
    )
    .await;
    let html = post["content_html"].as_str().unwrap();
    assert!(html.contains("<strong>strong</strong>"));
    assert!(!html.contains("<script>"));
}

#[tokio::test]
async fn locked_topics_refuse_replies() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (user_id, token) = common::create_test_user(&app, "late").await;
    let topic_id = common::create_topic_id(&app, &admin_token, forum_id, "Closed soon").await;

    let resp = app
        .client
        .put(app.url(&format!("/topics/{}/lock", topic_id)))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let status = post_reply(&app, &token, topic_id, "Too late?").await;
    assert_eq!(status, 403);

    common::grant(&app.db, Some(user_id), Some(forum_id), "can_reply_to_locked_topics", true).await;
    let status = post_reply(&app, &token, topic_id, "Let me in").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn editing_tracks_reason_and_editor() {
    let app = common::spawn_app().await;
    let (admin_id, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, token) = common::create_test_user(&app, "editor").await;
    let (_, other_token) = common::create_test_user(&app, "stranger").await;

    let topic_id = common::create_topic_id(&app, &admin_token, forum_id, "Edits").await;
    let post = common::reply(&app, &token, topic_id, "Frist").await;
    let post_id = post["id"].as_i64().unwrap();

    let status = put_post(&app, &other_token, post_id, json!({ "content": "Hijacked" })).await;
    assert_eq!(status, 403);

    let resp = app
        .client
        .put(app.url(&format!("/posts/{}", post_id)))
        .bearer_auth(&token)
        .json(&json!({ "content": "First", "update_reason": "typo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["content"], "First");
    assert_eq!(body["data"]["update_reason"], "typo");
    assert_eq!(body["data"]["updates_count"], 1);
    assert_eq!(body["data"]["approved"], true);

    // Staff edits record the editor.
    let resp = app
        .client
        .put(app.url(&format!("/posts/{}", post_id)))
        .bearer_auth(&admin_token)
        .json(&json!({ "content": "First!" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["updates_count"], 2);
    assert_eq!(body["data"]["updated_by_id"], admin_id);
}

#[tokio::test]
async fn editing_the_first_post_renames_the_topic() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let topic = common::create_topic(&app, &admin_token, forum_id, "Draft title").await;
    let first_post_id = topic["first_post_id"].as_i64().unwrap();

    let status = put_post(
        &app,
        &admin_token,
        first_post_id,
        json!({ "subject": "Final title", "content": "Body" }),
    )
    .await;
    assert_eq!(status, 200);

    let topic = common::get_topic(&app, topic["id"].as_i64().unwrap() as i32, Some(&admin_token)).await;
    assert_eq!(topic["subject"], "Final title");
    assert_eq!(topic["slug"], "final-title");
}

#[tokio::test]
async fn deleting_the_last_post_deletes_the_topic() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (user_id, token) = common::create_test_user(&app, "deleter").await;

    let topic = common::create_topic(&app, &token, forum_id, "Short lived").await;
    let topic_id = topic["id"].as_i64().unwrap();
    let first_post_id = topic["first_post_id"].as_i64().unwrap();
    let reply = common::reply(&app, &token, topic_id as i32, "Reply").await;

    let resp = app
        .client
        .delete(app.url(&format!("/posts/{}", reply["id"])))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["topic_deleted"], false);

    let resp = app
        .client
        .delete(app.url(&format!("/posts/{}", first_post_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["topic_deleted"], true);

    let (status, _) = common::get_json(&app, &format!("/topics/{}", topic_id), Some(&token)).await;
    assert_eq!(status, 404);

    let forum = common::get_forum(&app, forum_id, Some(&token)).await;
    assert_eq!(forum["topics_count"], 0);
    assert_eq!(forum["posts_count"], 0);

    let (_, member) = common::get_json(&app, &format!("/members/{}", user_id), None).await;
    assert_eq!(member["data"]["posts_count"], 0);
}

#[tokio::test]
async fn members_cannot_delete_other_posts() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, token) = common::create_test_user(&app, "victim").await;
    let (_, other_token) = common::create_test_user(&app, "vandal").await;

    let topic_id = common::create_topic_id(&app, &token, forum_id, "Mine").await;
    let post = common::reply(&app, &token, topic_id, "Also mine").await;

    let resp = app
        .client
        .delete(app.url(&format!("/posts/{}", post["id"])))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

async fn post_reply(app: &common::TestApp, token: &str, topic_id: i32, content: &str) -> u16 {
    app.client
        .post(app.url(&format!("/topics/{}/posts", topic_id)))
        .bearer_auth(token)
        .json(&json!({ "content": content }))
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

async fn put_post(app: &common::TestApp, token: &str, post_id: i64, body: Value) -> u16 {
    app.client
        .put(app.url(&format!("/posts/{}", post_id)))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

mod common;

use serde_json::{json, Value};

#[tokio::test]
async fn creating_a_topic_writes_the_first_post_and_counters() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let parent = common::create_forum(&app, &admin_token, None).await;
    let forum_id = common::create_forum(&app, &admin_token, Some(parent)).await;
    let (user_id, token) = common::create_test_user(&app, "author").await;

    let topic = common::create_topic(&app, &token, forum_id, "Hello, World!").await;
    assert_eq!(topic["slug"], "hello-world");
    assert_eq!(topic["topic_type"], "default");
    assert_eq!(topic["status"], "unlocked");
    assert_eq!(topic["approved"], true);
    assert_eq!(topic["posts_count"], 1);
    assert_eq!(topic["poster_id"], user_id);
    assert!(topic["first_post_id"].as_i64().is_some());
    assert_eq!(topic["first_post_id"], topic["last_post_id"]);

    for id in [forum_id, parent] {
        let forum = common::get_forum(&app, id, Some(&token)).await;
        assert_eq!(forum["topics_count"], 1, "forum {}", id);
        assert_eq!(forum["posts_count"], 1, "forum {}", id);
    }

    let (_, member) = common::get_json(&app, &format!("/members/{}", user_id), None).await;
    assert_eq!(member["data"]["posts_count"], 1);
}

#[tokio::test]
async fn listing_puts_announces_and_stickies_first() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;

    let first = common::create_topic_id(&app, &admin_token, forum_id, "Old regular").await;
    let sticky = create_typed_topic(&app, &admin_token, forum_id, "Sticky", "sticky").await;
    let announce = create_typed_topic(&app, &admin_token, forum_id, "Announce", "announce").await;
    let latest = common::create_topic_id(&app, &admin_token, forum_id, "New regular").await;

    let (status, body) =
        common::get_json(&app, &format!("/forums/{}/topics", forum_id), Some(&admin_token)).await;
    assert_eq!(status, 200);
    let ids: Vec<i64> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![announce as i64, sticky as i64, latest as i64, first as i64]
    );
    assert_eq!(body["data"]["total"], 4);
}

#[tokio::test]
async fn members_need_permission_for_stickies() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (user_id, token) = common::create_test_user(&app, "member").await;

    let resp = post_topic(&app, &token, forum_id, json!({
        "subject": "Pin me",
        "content": "Please",
        "topic_type": "sticky"
    }))
    .await;
    assert_eq!(resp, 403);

    common::grant(&app.db, Some(user_id), Some(forum_id), "can_post_stickies", true).await;
    let resp = post_topic(&app, &token, forum_id, json!({
        "subject": "Pin me",
        "content": "Please",
        "topic_type": "sticky"
    }))
    .await;
    assert_eq!(resp, 200);
}

#[tokio::test]
async fn viewing_a_topic_counts_views() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let topic_id = common::create_topic_id(&app, &admin_token, forum_id, "Views").await;

    common::get_topic(&app, topic_id, Some(&admin_token)).await;
    let topic = common::get_topic(&app, topic_id, Some(&admin_token)).await;
    assert_eq!(topic["views_count"], 2);
}

#[tokio::test]
async fn unapproved_topics_stay_out_of_listings() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (user_id, token) = common::create_test_user(&app, "queued").await;
    let (_, other_token) = common::create_test_user(&app, "other").await;

    common::grant(&app.db, Some(user_id), Some(forum_id), "can_post_without_approval", false).await;

    let resp = app
        .client
        .post(app.url(&format!("/forums/{}/topics", forum_id)))
        .bearer_auth(&token)
        .json(&json!({ "subject": "Needs review", "content": "Pending" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["approved"], false);
    assert!(body["message"].as_str().unwrap().contains("moderation"));
    let topic_id = body["data"]["id"].as_i64().unwrap();

    let (_, listing) =
        common::get_json(&app, &format!("/forums/{}/topics", forum_id), Some(&other_token)).await;
    assert_eq!(listing["data"]["total"], 0);

    let forum = common::get_forum(&app, forum_id, Some(&other_token)).await;
    assert_eq!(forum["topics_count"], 0);

    // The poster still reaches it, other members do not.
    let (status, _) = common::get_json(&app, &format!("/topics/{}", topic_id), Some(&token)).await;
    assert_eq!(status, 200);
    let (status, _) =
        common::get_json(&app, &format!("/topics/{}", topic_id), Some(&other_token)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn unreadable_forum_refuses_topics() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let topic_id = common::create_topic_id(&app, &admin_token, forum_id, "Secret").await;
    let (user_id, token) = common::create_test_user(&app, "outsider").await;

    common::grant(&app.db, Some(user_id), Some(forum_id), "can_read_forum", false).await;

    let (status, _) = common::get_json(&app, &format!("/topics/{}", topic_id), Some(&token)).await;
    assert_eq!(status, 403);
    let (status, _) =
        common::get_json(&app, &format!("/forums/{}/topics", forum_id), Some(&token)).await;
    assert_eq!(status, 403);

    let resp = post_topic(&app, &token, forum_id, json!({ "subject": "Hi", "content": "Hi" })).await;
    assert_eq!(resp, 403);
}

#[tokio::test]
async fn topic_with_a_poll() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, token) = common::create_test_user(&app, "pollster").await;

    let resp = post_topic(&app, &token, forum_id, json!({
        "subject": "Vote",
        "content": "Pick one",
        "poll": { "question": "Best editor?", "options": ["vim"] }
    }))
    .await;
    assert_eq!(resp, 400, "a poll needs two options");

    let resp = post_topic(&app, &token, forum_id, json!({
        "subject": "Vote",
        "content": "Pick one",
        "poll": { "question": "Best editor?", "options": ["vim", "emacs"] }
    }))
    .await;
    assert_eq!(resp, 200);
}

#[tokio::test]
async fn blank_subjects_are_rejected() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, token) = common::create_test_user(&app, "blank").await;

    let resp = post_topic(&app, &token, forum_id, json!({ "subject": "   ", "content": "Body" })).await;
    assert_eq!(resp, 400);
    let resp = post_topic(&app, &token, forum_id, json!({ "subject": "Title", "content": " \n " })).await;
    assert_eq!(resp, 400);

    let forum = common::get_forum(&app, forum_id, Some(&token)).await;
    assert_eq!(forum["topics_count"], 0);
}

async fn post_topic(app: &common::TestApp, token: &str, forum_id: i32, body: Value) -> u16 {
    app.client
        .post(app.url(&format!("/forums/{}/topics", forum_id)))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

async fn create_typed_topic(
    app: &common::TestApp,
    token: &str,
    forum_id: i32,
    subject: &str,
    topic_type: &str,
) -> i32 {
    let resp = app
        .client
        .post(app.url(&format!("/forums/{}/topics", forum_id)))
        .bearer_auth(token)
        .json(&json!({ "subject": subject, "content": "Body", "topic_type": topic_type }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    body["data"]["id"].as_i64().expect("topic id") as i32
}

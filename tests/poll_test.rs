mod common;

use serde_json::{json, Value};

/// Start a topic carrying `poll` and return (topic id, poll JSON).
async fn topic_with_poll(app: &common::TestApp, token: &str, forum_id: i32, poll: Value) -> (i32, Value) {
    let resp = app
        .client
        .post(app.url(&format!("/forums/{}/topics", forum_id)))
        .bearer_auth(token)
        .json(&json!({ "subject": "Poll", "content": "Vote below", "poll": poll }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let topic_id = body["data"]["id"].as_i64().unwrap() as i32;

    let (status, poll) = common::get_json(app, &format!("/topics/{}/poll", topic_id), Some(token)).await;
    assert_eq!(status, 200);
    (topic_id, poll["data"].clone())
}

fn option_ids(poll: &Value) -> Vec<i64> {
    poll["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect()
}

async fn vote(app: &common::TestApp, token: &str, poll_id: i64, options: &[i64]) -> (u16, Value) {
    let resp = app
        .client
        .post(app.url(&format!("/polls/{}/votes", poll_id)))
        .bearer_auth(token)
        .json(&json!({ "options": options }))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn votes_are_counted() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, alice) = common::create_test_user(&app, "alice").await;
    let (_, bob) = common::create_test_user(&app, "bob").await;

    let (_, poll) = topic_with_poll(
        &app,
        &admin_token,
        forum_id,
        json!({ "question": "Tabs or spaces?", "options": ["Tabs", " Spaces ", ""] }),
    )
    .await;
    assert_eq!(poll["is_open"], true);
    assert_eq!(poll["can_vote"], true);
    assert_eq!(poll["options"][1]["text"], "Spaces");
    let ids = option_ids(&poll);
    assert_eq!(ids.len(), 2, "blank options are dropped");
    let poll_id = poll["id"].as_i64().unwrap();

    let (status, body) = vote(&app, &alice, poll_id, &[ids[1]]).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["has_voted"], true);
    assert_eq!(body["data"]["can_vote"], false);

    let (_, body) = vote(&app, &bob, poll_id, &[ids[1]]).await;
    assert_eq!(body["data"]["total_votes"], 2);
    assert_eq!(body["data"]["options"][1]["votes"], 2);
    assert_eq!(body["data"]["options"][1]["percentage"], 100.0);
    assert_eq!(body["data"]["options"][0]["votes"], 0);

    let resp = app
        .client
        .post(app.url(&format!("/polls/{}/votes", poll_id)))
        .json(&json!({ "options": [ids[0]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn ballots_are_validated() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, voter) = common::create_test_user(&app, "voter").await;

    let (_, poll) = topic_with_poll(
        &app,
        &admin_token,
        forum_id,
        json!({ "question": "Pick two", "max_options": 2, "options": ["a", "b", "c"] }),
    )
    .await;
    let ids = option_ids(&poll);
    let poll_id = poll["id"].as_i64().unwrap();

    let (status, _) = vote(&app, &voter, poll_id, &[]).await;
    assert_eq!(status, 400);
    let (status, _) = vote(&app, &voter, poll_id, &[ids[0], ids[1], ids[2]]).await;
    assert_eq!(status, 400, "over max_options");
    let (status, _) = vote(&app, &voter, poll_id, &[ids[0], ids[0]]).await;
    assert_eq!(status, 400, "duplicate option");
    let (status, _) = vote(&app, &voter, poll_id, &[999999]).await;
    assert_eq!(status, 400, "foreign option");

    let (status, body) = vote(&app, &voter, poll_id, &[ids[0], ids[2]]).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total_votes"], 2);
}

#[tokio::test]
async fn changing_a_vote_needs_user_changes() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, voter) = common::create_test_user(&app, "voter").await;

    let (_, fixed) = topic_with_poll(
        &app,
        &admin_token,
        forum_id,
        json!({ "question": "Final answer?", "options": ["yes", "no"] }),
    )
    .await;
    let ids = option_ids(&fixed);
    let poll_id = fixed["id"].as_i64().unwrap();
    vote(&app, &voter, poll_id, &[ids[0]]).await;
    let (status, _) = vote(&app, &voter, poll_id, &[ids[1]]).await;
    assert_eq!(status, 403);

    let (_, open) = topic_with_poll(
        &app,
        &admin_token,
        forum_id,
        json!({ "question": "Changeable?", "user_changes": true, "options": ["yes", "no"] }),
    )
    .await;
    let ids = option_ids(&open);
    let poll_id = open["id"].as_i64().unwrap();
    vote(&app, &voter, poll_id, &[ids[0]]).await;
    let (status, body) = vote(&app, &voter, poll_id, &[ids[1]]).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total_votes"], 1);
    assert_eq!(body["data"]["options"][0]["votes"], 0);
    assert_eq!(body["data"]["options"][1]["votes"], 1);
    assert_eq!(body["data"]["can_vote"], true);
}

#[tokio::test]
async fn closed_polls_and_locked_topics_refuse_votes() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (_, voter) = common::create_test_user(&app, "voter").await;

    let (_, expiring) = topic_with_poll(
        &app,
        &admin_token,
        forum_id,
        json!({ "question": "Short lived", "duration": 1, "options": ["a", "b"] }),
    )
    .await;
    let poll_id = expiring["id"].as_i64().unwrap();
    assert!(expiring["closes_at"].as_str().is_some());
    common::execute(
        &app.db,
        "UPDATE topic_polls SET created_at = NOW() - INTERVAL '2 days' WHERE id = $1",
        vec![(poll_id as i32).into()],
    )
    .await;
    let (status, _) = vote(&app, &voter, poll_id, &[option_ids(&expiring)[0]]).await;
    assert_eq!(status, 403);

    let (topic_id, poll) = topic_with_poll(
        &app,
        &admin_token,
        forum_id,
        json!({ "question": "Locked soon", "options": ["a", "b"] }),
    )
    .await;
    app.client
        .put(app.url(&format!("/topics/{}/lock", topic_id)))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    let (status, _) = vote(&app, &voter, poll["id"].as_i64().unwrap(), &[option_ids(&poll)[0]]).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn topic_without_poll_is_not_found() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let topic_id = common::create_topic_id(&app, &admin_token, forum_id, "Plain").await;

    let (status, _) =
        common::get_json(&app, &format!("/topics/{}/poll", topic_id), Some(&admin_token)).await;
    assert_eq!(status, 404);
}

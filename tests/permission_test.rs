mod common;

use serde_json::{json, Value};

async fn set_grant(app: &common::TestApp, token: &str, body: Value) -> (u16, Value) {
    let resp = app
        .client
        .post(app.url("/admin/permissions"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn superusers_manage_grants() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (user_id, _) = common::create_test_user(&app, "member").await;

    let (status, body) = set_grant(
        &app,
        &admin_token,
        json!({ "user_id": user_id, "forum_id": forum_id, "codename": "can_lock_topics" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["codename"], "can_lock_topics");
    assert_eq!(body["data"]["has_perm"], true);
    let grant_id = body["data"]["id"].as_i64().unwrap();

    // Setting the same grant again updates the row in place.
    let (_, body) = set_grant(
        &app,
        &admin_token,
        json!({
            "user_id": user_id,
            "forum_id": forum_id,
            "codename": "can_lock_topics",
            "has_perm": false
        }),
    )
    .await;
    assert_eq!(body["data"]["id"], grant_id);
    assert_eq!(body["data"]["has_perm"], false);

    let (status, body) = common::get_json(
        &app,
        &format!("/admin/permissions?user_id={}", user_id),
        Some(&admin_token),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let resp = app
        .client
        .delete(app.url(&format!("/admin/permissions/{}", grant_id)))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (_, body) = common::get_json(
        &app,
        &format!("/admin/permissions?user_id={}", user_id),
        Some(&admin_token),
    )
    .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let resp = app
        .client
        .delete(app.url(&format!("/admin/permissions/{}", grant_id)))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn members_cannot_manage_grants() {
    let app = common::spawn_app().await;
    let (user_id, token) = common::create_test_user(&app, "member").await;

    let (status, _) = set_grant(
        &app,
        &token,
        json!({ "user_id": user_id, "codename": "can_approve_posts" }),
    )
    .await;
    assert_eq!(status, 403);

    let (status, _) = common::get_json(&app, "/admin/permissions", Some(&token)).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn grants_are_validated() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;

    let (status, _) = set_grant(&app, &admin_token, json!({ "codename": "can_fly" })).await;
    assert_eq!(status, 422);

    let (status, _) = set_grant(
        &app,
        &admin_token,
        json!({ "user_id": 999999, "codename": "can_read_forum" }),
    )
    .await;
    assert_eq!(status, 404);

    let (status, _) = set_grant(
        &app,
        &admin_token,
        json!({ "forum_id": 999999, "codename": "can_read_forum" }),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn a_stored_grant_takes_effect() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;
    let (user_id, token) = common::create_test_user(&app, "member").await;
    let topic_id = common::create_topic_id(&app, &admin_token, forum_id, "Lockable").await;

    let lock = || {
        app.client
            .put(app.url(&format!("/topics/{}/lock", topic_id)))
            .bearer_auth(&token)
            .send()
    };
    assert_eq!(lock().await.unwrap().status(), 403);

    let (status, _) = set_grant(
        &app,
        &admin_token,
        json!({ "user_id": user_id, "forum_id": forum_id, "codename": "can_lock_topics" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(lock().await.unwrap().status(), 200);

    // Global anonymous grants, then a per-forum denial that wins over them.
    set_grant(&app, &admin_token, json!({ "codename": "can_see_forum" })).await;
    set_grant(&app, &admin_token, json!({ "codename": "can_read_forum" })).await;
    let (status, _) = common::get_json(&app, &format!("/forums/{}", forum_id), None).await;
    assert_eq!(status, 200);

    set_grant(
        &app,
        &admin_token,
        json!({ "forum_id": forum_id, "codename": "can_read_forum", "has_perm": false }),
    )
    .await;
    let (status, _) = common::get_json(&app, &format!("/topics/{}", topic_id), None).await;
    assert_eq!(status, 403);
}

mod common;

use reqwest::redirect::Policy;
use serde_json::{json, Value};

#[tokio::test]
async fn staff_create_forums_and_members_cannot() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;

    let forum = common::create_forum_with(
        &app,
        &admin_token,
        json!({ "name": "General Discussion", "description": "Talk about *anything*" }),
    )
    .await;
    assert_eq!(forum["slug"], "general-discussion");
    assert_eq!(forum["forum_type"], "forum");
    assert_eq!(forum["topics_count"], 0);
    assert!(forum["description_html"]
        .as_str()
        .unwrap()
        .contains("<em>anything</em>"));

    let (_, user_token) = common::create_test_user(&app, "member").await;
    let resp = app
        .client
        .post(app.url("/forums"))
        .bearer_auth(&user_token)
        .json(&json!({ "name": "Not allowed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn tree_is_listed_in_display_order_with_levels() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;

    let category = common::create_category(&app, &admin_token).await;
    let child = common::create_forum(&app, &admin_token, Some(category)).await;
    let grandchild = common::create_forum(&app, &admin_token, Some(child)).await;
    let (_, user_token) = common::create_test_user(&app, "reader").await;

    let (status, body) = common::get_json(&app, "/forums", Some(&user_token)).await;
    assert_eq!(status, 200);
    let forums = body["data"].as_array().unwrap();
    let ids: Vec<i64> = forums.iter().map(|f| f["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![category as i64, child as i64, grandchild as i64]);
    assert_eq!(forums[2]["level"], 2);
    assert_eq!(forums[2]["margin_level"], 4);

    let (status, body) = common::get_json(&app, &format!("/forums/{}", category), Some(&user_token)).await;
    assert_eq!(status, 200);
    let subs = body["data"]["sub_forums"].as_array().unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0]["id"], child);
}

#[tokio::test]
async fn placement_rules_are_enforced() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;

    let category = common::create_category(&app, &admin_token).await;
    let parent = common::create_forum(&app, &admin_token, None).await;
    let child = common::create_forum(&app, &admin_token, Some(parent)).await;

    // Category under category
    assert_eq!(
        post_forum(&app, &admin_token, json!({ "name": "Nested", "forum_type": "category", "parent_id": category })).await,
        400
    );
    // Link forum without a link
    assert_eq!(
        post_forum(&app, &admin_token, json!({ "name": "Broken link", "forum_type": "link" })).await,
        400
    );
    // Blank name
    assert_eq!(post_forum(&app, &admin_token, json!({ "name": "   " })).await, 400);
    // Unknown parent
    assert_eq!(
        post_forum(&app, &admin_token, json!({ "name": "Orphan", "parent_id": 999999 })).await,
        400
    );

    // A forum cannot move under its own descendant.
    let resp = app
        .client
        .put(app.url(&format!("/forums/{}", parent)))
        .bearer_auth(&admin_token)
        .json(&json!({ "name": "Parent", "parent_id": child }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn anonymous_visitors_need_explicit_grants() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let forum_id = common::create_forum(&app, &admin_token, None).await;

    let (status, body) = common::get_json(&app, "/forums", None).await;
    assert_eq!(status, 200);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = common::get_json(&app, &format!("/forums/{}", forum_id), None).await;
    assert_eq!(status, 403);

    common::grant(&app.db, None, None, "can_see_forum", true).await;
    common::grant(&app.db, None, None, "can_read_forum", true).await;

    let (status, body) = common::get_json(&app, "/forums", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (status, _) = common::get_json(&app, &format!("/forums/{}", forum_id), None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn hidden_parent_hides_the_subtree() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let parent = common::create_forum(&app, &admin_token, None).await;
    let child = common::create_forum(&app, &admin_token, Some(parent)).await;
    let (user_id, user_token) = common::create_test_user(&app, "hidden").await;

    common::grant(&app.db, Some(user_id), Some(parent), "can_see_forum", false).await;
    common::grant(&app.db, Some(user_id), Some(parent), "can_read_forum", false).await;

    let (_, body) = common::get_json(&app, "/forums", Some(&user_token)).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = common::get_json(&app, &format!("/forums/{}", child), Some(&user_token)).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn link_forum_redirects_and_counts() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;

    let link = common::create_forum_with(
        &app,
        &admin_token,
        json!({
            "name": "Project site",
            "forum_type": "link",
            "link": "https://example.com/",
            "link_redirects": true
        }),
    )
    .await;
    let link_id = link["id"].as_i64().unwrap();

    let client = reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap();
    let resp = client
        .get(app.url(&format!("/forums/{}/redirect", link_id)))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(resp.headers()["location"], "https://example.com/");

    let forum = common::get_forum(&app, link_id as i32, Some(&admin_token)).await;
    assert_eq!(forum["link_redirects_count"], 1);

    // Regular forums have no redirect.
    let plain = common::create_forum(&app, &admin_token, None).await;
    let resp = client
        .get(app.url(&format!("/forums/{}/redirect", plain)))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn deleting_a_forum_removes_its_subtree_and_content() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let (poster_id, poster_token) = common::create_test_user(&app, "poster").await;

    let root = common::create_forum(&app, &admin_token, None).await;
    let parent = common::create_forum(&app, &admin_token, Some(root)).await;
    let child = common::create_forum(&app, &admin_token, Some(parent)).await;
    let topic_id = common::create_topic_id(&app, &poster_token, child, "Doomed").await;

    let root_forum = common::get_forum(&app, root, Some(&admin_token)).await;
    assert_eq!(root_forum["topics_count"], 1);

    let resp = app
        .client
        .delete(app.url(&format!("/forums/{}", parent)))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (status, _) = common::get_json(&app, &format!("/forums/{}", child), Some(&admin_token)).await;
    assert_eq!(status, 404);
    let (status, _) = common::get_json(&app, &format!("/topics/{}", topic_id), Some(&admin_token)).await;
    assert_eq!(status, 404);

    let root_forum = common::get_forum(&app, root, Some(&admin_token)).await;
    assert_eq!(root_forum["topics_count"], 0);
    assert_eq!(root_forum["posts_count"], 0);

    let (_, member) = common::get_json(&app, &format!("/members/{}", poster_id), None).await;
    assert_eq!(member["data"]["posts_count"], 0);
}

#[tokio::test]
async fn category_cannot_hold_topics() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let category = common::create_category(&app, &admin_token).await;

    let resp = app
        .client
        .post(app.url(&format!("/forums/{}/topics", category)))
        .bearer_auth(&admin_token)
        .json(&json!({ "subject": "Misplaced", "content": "Nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn type_changes_respect_topics_and_sub_forums() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;
    let (poster_id, poster_token) = common::create_test_user(&app, "poster").await;

    // Topics living only in a sub-forum do not block a category.
    let parent = common::create_forum(&app, &admin_token, None).await;
    let child = common::create_forum(&app, &admin_token, Some(parent)).await;
    common::create_topic_id(&app, &admin_token, child, "Down below").await;
    let (status, body) = put_forum(
        &app,
        &admin_token,
        parent,
        json!({ "name": "Parent", "forum_type": "category" }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["forum_type"], "category");

    // A forum holding a topic becomes neither a category nor a link.
    let holder = common::create_forum(&app, &admin_token, None).await;
    common::create_topic_id(&app, &admin_token, holder, "Resident").await;
    let link = json!({ "name": "Holder", "forum_type": "link", "link": "https://example.com/" });
    assert_eq!(put_forum(&app, &admin_token, holder, link).await.0, 400);
    let category = json!({ "name": "Holder", "forum_type": "category" });
    assert_eq!(put_forum(&app, &admin_token, holder, category).await.0, 400);
    let forum = common::get_forum(&app, holder, Some(&admin_token)).await;
    assert_eq!(forum["forum_type"], "forum");

    // Unapproved topics count as held too.
    let queued = common::create_forum(&app, &admin_token, None).await;
    common::grant(&app.db, Some(poster_id), None, "can_post_without_approval", false).await;
    let topic = common::create_topic(&app, &poster_token, queued, "Awaiting review").await;
    assert_eq!(topic["approved"], false);
    let category = json!({ "name": "Queued", "forum_type": "category" });
    assert_eq!(put_forum(&app, &admin_token, queued, category).await.0, 400);

    // Sub-forums can not hang below a link.
    let with_child = common::create_forum(&app, &admin_token, None).await;
    common::create_forum(&app, &admin_token, Some(with_child)).await;
    let link = json!({ "name": "With child", "forum_type": "link", "link": "https://example.com/" });
    assert_eq!(put_forum(&app, &admin_token, with_child, link).await.0, 400);

    // Nor can a category end up directly above another category.
    let above = common::create_forum(&app, &admin_token, None).await;
    common::create_forum_with(
        &app,
        &admin_token,
        json!({ "name": "Inner category", "forum_type": "category", "parent_id": above }),
    )
    .await;
    let category = json!({ "name": "Above", "forum_type": "category" });
    assert_eq!(put_forum(&app, &admin_token, above, category).await.0, 400);
}

#[tokio::test]
async fn moving_a_forum_recounts_both_parents() {
    let app = common::spawn_app().await;
    let (_, admin_token) = common::create_admin(&app).await;

    let old_parent = common::create_forum(&app, &admin_token, None).await;
    let new_parent = common::create_forum(&app, &admin_token, None).await;
    let moved = common::create_forum(&app, &admin_token, Some(old_parent)).await;
    let topic_id = common::create_topic_id(&app, &admin_token, moved, "Travelling").await;
    common::reply(&app, &admin_token, topic_id, "Along for the ride").await;

    let before = common::get_forum(&app, old_parent, Some(&admin_token)).await;
    assert_eq!(before["topics_count"], 1);
    assert_eq!(before["posts_count"], 2);

    let (status, body) = put_forum(
        &app,
        &admin_token,
        moved,
        json!({ "name": "Moved", "parent_id": new_parent }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["parent_id"], new_parent);

    let old = common::get_forum(&app, old_parent, Some(&admin_token)).await;
    assert_eq!(old["topics_count"], 0);
    assert_eq!(old["posts_count"], 0);
    let new = common::get_forum(&app, new_parent, Some(&admin_token)).await;
    assert_eq!(new["topics_count"], 1);
    assert_eq!(new["posts_count"], 2);
}

async fn put_forum(app: &common::TestApp, token: &str, id: i32, body: Value) -> (u16, Value) {
    let resp = app
        .client
        .put(app.url(&format!("/forums/{}", id)))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn post_forum(app: &common::TestApp, token: &str, body: Value) -> u16 {
    app.client
        .post(app.url("/forums"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

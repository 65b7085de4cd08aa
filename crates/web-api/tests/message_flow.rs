mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use support::{TestApp, PASSWORD};

#[tokio::test]
async fn verified_user_posts_and_lists_messages() {
    let app = TestApp::new();
    let cookie = app.verified_user("alice@example.com").await;

    let created = app
        .post("/messages", json!({ "text": "  hello  " }), Some(&cookie))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["text"], "hello");
    assert_eq!(created.body["sender"]["email"], "alice@example.com");
    assert_eq!(created.body["senderId"], created.body["sender"]["id"]);
    assert!(created.body["createdAt"].is_string());

    app.post("/messages", json!({ "text": "second" }), Some(&cookie))
        .await;

    let listed = app.get("/messages", Some(&cookie)).await;
    assert_eq!(listed.status, StatusCode::OK);
    let texts: Vec<&str> = listed
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["hello", "second"]);
}

#[tokio::test]
async fn take_limits_history() {
    let app = TestApp::new();
    let cookie = app.verified_user("bob@example.com").await;
    for i in 0..5 {
        app.post("/messages", json!({ "text": format!("m{i}") }), Some(&cookie))
            .await;
    }

    let last_two = app.get("/messages?take=2", Some(&cookie)).await;
    let texts: Vec<&str> = last_two
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["m3", "m4"]);

    let none = app.get("/messages?take=0", Some(&cookie)).await;
    assert_eq!(none.body, json!([]));
}

#[tokio::test]
async fn unverified_user_cannot_post() {
    let app = TestApp::new();
    app.register("carol@example.com").await;
    let cookie = app
        .post(
            "/auth/login",
            json!({ "email": "carol@example.com", "password": PASSWORD }),
            None,
        )
        .await
        .session_cookie()
        .unwrap();

    // 未验证时先于正文校验返回 403
    let response = app
        .post("/messages", json!({ "text": "" }), Some(&cookie))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["needsVerification"], true);
    assert_eq!(response.body["email"], "carol@example.com");

    // 读取历史不要求验证
    assert_eq!(
        app.get("/messages", Some(&cookie)).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn message_text_bounds() {
    let app = TestApp::new();
    let cookie = app.verified_user("dave@example.com").await;

    let blank = app
        .post("/messages", json!({ "text": "   " }), Some(&cookie))
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
    assert_eq!(blank.body["errors"][0]["field"], "text");

    let too_long = app
        .post("/messages", json!({ "text": "x".repeat(1001) }), Some(&cookie))
        .await;
    assert_eq!(too_long.status, StatusCode::BAD_REQUEST);

    let at_limit = app
        .post("/messages", json!({ "text": "x".repeat(1000) }), Some(&cookie))
        .await;
    assert_eq!(at_limit.status, StatusCode::CREATED);
}

#[tokio::test]
async fn messages_require_session() {
    let app = TestApp::new();
    assert_eq!(
        app.get("/messages", None).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.post("/messages", json!({ "text": "hi" }), None)
            .await
            .status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.post("/messages", json!({ "text": "hi" }), Some("messenger.sid=forged"))
            .await
            .status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn deleted_account_takes_its_messages() {
    let app = TestApp::new();
    let alice = app.verified_user("erin@example.com").await;
    let bob = app.verified_user("frank@example.com").await;
    app.post("/messages", json!({ "text": "from erin" }), Some(&alice))
        .await;
    app.post("/messages", json!({ "text": "from frank" }), Some(&bob))
        .await;

    app.request(
        axum::http::Method::DELETE,
        "/auth/account",
        None,
        Some(&alice),
    )
    .await;

    let listed = app.get("/messages", Some(&bob)).await;
    let texts: Vec<&str> = listed
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["from frank"]);
}

#[tokio::test]
async fn unparseable_message_bodies_are_field_errors() {
    let app = TestApp::new();
    let cookie = app.verified_user("frank@example.com").await;

    let wrong_type = app
        .post("/messages", json!({ "text": 123 }), Some(&cookie))
        .await;
    assert_eq!(wrong_type.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_type.body["errors"][0]["field"], "body");

    let broken = app
        .raw(
            Method::POST,
            "/messages",
            Some("application/json"),
            "{\"text\": ".to_string(),
            Some(&cookie),
        )
        .await;
    assert_eq!(broken.status, StatusCode::BAD_REQUEST);
    assert!(broken.body["errors"].is_array());

    let untyped = app
        .raw(
            Method::POST,
            "/messages",
            None,
            json!({ "text": "hi" }).to_string(),
            Some(&cookie),
        )
        .await;
    assert_eq!(untyped.status, StatusCode::BAD_REQUEST);
    assert_eq!(untyped.body["errors"][0]["field"], "body");

    let listed = app.get("/messages", Some(&cookie)).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn session_is_checked_before_the_body() {
    let app = TestApp::new();
    let wrong_type = app.post("/messages", json!({ "text": 123 }), None).await;
    assert_eq!(wrong_type.status, StatusCode::UNAUTHORIZED);

    let broken = app
        .raw(
            Method::POST,
            "/messages",
            Some("application/json"),
            "not json".to_string(),
            None,
        )
        .await;
    assert_eq!(broken.status, StatusCode::UNAUTHORIZED);

    let bad_take = app.get("/messages?take=abc", None).await;
    assert_eq!(bad_take.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_numeric_take_is_rejected() {
    let app = TestApp::new();
    let cookie = app.verified_user("grace@example.com").await;

    let listed = app.get("/messages?take=abc", Some(&cookie)).await;
    assert_eq!(listed.status, StatusCode::BAD_REQUEST);
    assert_eq!(listed.body["errors"][0]["field"], "query");

    let negative = app.get("/messages?take=-1", Some(&cookie)).await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);
}

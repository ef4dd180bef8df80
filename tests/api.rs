use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chatline::{config::Config, db, router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_app() -> Router {
    let pool = db::connect_in_memory().await.unwrap();
    let config = Config::from_lookup(|_| None).unwrap();
    router(AppState::new(pool, config))
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

/// Registers a user and returns (token, user id).
async fn register(app: &Router, username: &str) -> (String, String) {
    let (status, body) = call(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": username, "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_owned(),
        body["user"]["id"].as_str().unwrap().to_owned(),
    )
}

#[tokio::test]
async fn register_login_and_me() {
    let app = test_app().await;
    let (_, alice_id) = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let (status, me) = call(&app, "GET", "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], alice_id);
    assert_eq!(me["username"], "alice");
}

#[tokio::test]
async fn duplicate_username_is_a_validation_error() {
    let app = test_app().await;
    register(&app, "alice").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "ALICE", "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "username_taken");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = test_app().await;
    register(&app, "alice").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "nope-nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid credentials");
}

#[tokio::test]
async fn tampered_or_missing_token_is_rejected() {
    let app = test_app().await;
    let (token, _) = register(&app, "alice").await;

    let (status, _) = call(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut tampered = token.clone();
    tampered.pop();
    tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
    let (status, _) = call(&app, "GET", "/api/auth/me", Some(&tampered), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_route_reports_path() {
    let app = test_app().await;

    let (status, body) = call(&app, "GET", "/api/nowhere?x=1", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found");
    assert_eq!(body["path"], "/api/nowhere?x=1");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let app = test_app().await;
    let (token, _) = register(&app, "alice").await;

    let (status, body) = call(&app, "POST", "/api/rooms", Some(&token), Some(json!({ "nme": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_body");
}

#[tokio::test]
async fn creating_rooms_validates_input() {
    let app = test_app().await;
    let (token, _) = register(&app, "alice").await;
    let (_, bob_id) = register(&app, "bob").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/rooms",
        Some(&token),
        Some(json!({ "name": "  ", "participants": [bob_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_name");

    let (status, _) = call(
        &app,
        "POST",
        "/api/rooms",
        Some(&token),
        Some(json!({ "name": "general", "participants": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, room) = call(
        &app,
        "POST",
        "/api/rooms",
        Some(&token),
        Some(json!({ "name": "general", "participants": [bob_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(room["kind"], "group");
    assert_eq!(room["participants"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn private_room_is_shared_by_both_sides() {
    let app = test_app().await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;

    let (status, first) = call(&app, "POST", "/api/rooms/private", Some(&alice), Some(json!({ "user_id": bob_id }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = call(&app, "POST", "/api/rooms/private", Some(&bob), Some(json!({ "user_id": alice_id }))).await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["kind"], "private");

    let (status, _) = call(&app, "POST", "/api/rooms/private", Some(&alice), Some(json!({ "user_id": alice_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_is_oldest_first_and_members_only() {
    let app = test_app().await;
    let (alice, _) = register(&app, "alice").await;
    let (_, bob_id) = register(&app, "bob").await;
    let (carol, _) = register(&app, "carol").await;

    let (_, room) = call(
        &app,
        "POST",
        "/api/rooms",
        Some(&alice),
        Some(json!({ "name": "general", "participants": [bob_id] })),
    )
    .await;
    let room_id = room["id"].as_str().unwrap();
    let uri = format!("/api/rooms/{room_id}/messages");

    for body in ["one", "two", "three"] {
        let (status, _) = call(&app, "POST", &uri, Some(&alice), Some(json!({ "body": body }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, history) = call(&app, "GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let bodies: Vec<_> = history.as_array().unwrap().iter().map(|m| m["body"].as_str().unwrap()).collect();
    assert_eq!(bodies, ["one", "two", "three"]);

    let (status, latest) = call(&app, "GET", &format!("{uri}?limit=1"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest[0]["body"], "three");

    let (status, _) = call(&app, "GET", &uri, Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn marking_read_clears_unread_count() {
    let app = test_app().await;
    let (alice, _) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;

    let (_, room) = call(
        &app,
        "POST",
        "/api/rooms",
        Some(&alice),
        Some(json!({ "name": "general", "participants": [bob_id] })),
    )
    .await;
    let room_id = room["id"].as_str().unwrap().to_owned();
    let (_, message) = call(
        &app,
        "POST",
        &format!("/api/rooms/{room_id}/messages"),
        Some(&alice),
        Some(json!({ "body": "hello bob" })),
    )
    .await;
    let message_id = message["id"].as_str().unwrap();

    let (_, unread) = call(&app, "GET", "/api/unread", Some(&bob), None).await;
    assert_eq!(unread[&room_id], 1);
    let (_, unread) = call(&app, "GET", "/api/unread", Some(&alice), None).await;
    assert_eq!(unread[&room_id], 0);

    let read_uri = format!("/api/messages/{message_id}/read");
    let (status, _) = call(&app, "POST", &read_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "POST", &read_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, unread) = call(&app, "GET", "/api/unread", Some(&bob), None).await;
    assert_eq!(unread[&room_id], 0);
}

#[tokio::test]
async fn health_reports_status() {
    let app = test_app().await;

    for uri in ["/health", "/api/health"] {
        let (status, body) = call(&app, "GET", uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["environment"], "development");
        assert!(body["uptime"].is_number());
    }
}

async fn group_room(app: &Router, token: &str, name: &str, participants: &[&str]) -> String {
    let (status, room) = call(
        app,
        "POST",
        "/api/rooms",
        Some(token),
        Some(json!({ "name": name, "participants": participants })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{room}");
    room["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn joining_is_idempotent_and_private_rooms_are_closed() {
    let app = test_app().await;
    let (alice, _) = register(&app, "alice").await;
    let (_, bob_id) = register(&app, "bob").await;
    let (carol, carol_id) = register(&app, "carol").await;
    let room_id = group_room(&app, &alice, "general", &[&bob_id]).await;

    let join_uri = format!("/api/rooms/{room_id}/join");
    let (status, first) = call(&app, "POST", &join_uri, Some(&carol), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["participants"].as_array().unwrap().len(), 3);
    assert_eq!(first["participants"][2], carol_id);

    let (status, second) = call(&app, "POST", &join_uri, Some(&carol), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["participants"], first["participants"]);

    let (_, private) =
        call(&app, "POST", "/api/rooms/private", Some(&alice), Some(json!({ "user_id": bob_id }))).await;
    let private_id = private["id"].as_str().unwrap();
    let (status, body) = call(&app, "POST", &format!("/api/rooms/{private_id}/join"), Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let missing = uuid::Uuid::now_v7();
    let (status, _) = call(&app, "POST", &format!("/api/rooms/{missing}/join"), Some(&carol), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn participants_are_ordered_and_members_only() {
    let app = test_app().await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (_, bob_id) = register(&app, "bob").await;
    let (carol, carol_id) = register(&app, "carol").await;
    let room_id = group_room(&app, &alice, "general", &[&bob_id]).await;
    let uri = format!("/api/rooms/{room_id}/participants");

    let (status, _) = call(&app, "GET", &uri, Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    call(&app, "POST", &format!("/api/rooms/{room_id}/join"), Some(&carol), None).await;
    let (status, users) = call(&app, "GET", &uri, Some(&carol), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = users.as_array().unwrap().iter().map(|u| u["id"].as_str().unwrap()).collect();
    assert_eq!(ids, [alice_id.as_str(), bob_id.as_str(), carol_id.as_str()]);
}

#[tokio::test]
async fn user_directory_skips_the_caller() {
    let app = test_app().await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (_, bob_id) = register(&app, "bob").await;

    let (status, users) = call(&app, "GET", "/api/users", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], bob_id);
    assert_eq!(users[0]["online"], false);
    assert!(users.iter().all(|u| u["id"] != alice_id.as_str()));

    let (status, bob) = call(&app, "GET", &format!("/api/users/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bob["username"], "bob");
    assert_eq!(bob["online"], false);

    let missing = uuid::Uuid::now_v7();
    let (status, _) = call(&app, "GET", &format!("/api/users/{missing}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_alike() {
    let app = test_app().await;
    register(&app, "alice").await;

    let (wrong_status, wrong) = call(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "not-it-at-all" })),
    )
    .await;
    let (unknown_status, unknown) = call(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": "not-it-at-all" })),
    )
    .await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, wrong_status);
    assert_eq!(unknown["message"], wrong["message"]);
    assert_eq!(unknown["code"], wrong["code"]);
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let app = test_app().await;

    for uri in ["/health", "/api/nowhere"] {
        let res = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = res.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff", "{uri}");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN", "{uri}");
        assert_eq!(headers["referrer-policy"], "no-referrer", "{uri}");
        assert!(headers.contains_key("strict-transport-security"), "{uri}");
        assert!(headers.contains_key("content-security-policy"), "{uri}");
    }
}

#[tokio::test]
async fn responses_are_gzipped_on_request() {
    let app = test_app().await;

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_ENCODING], "gzip");

    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(!res.headers().contains_key(header::CONTENT_ENCODING));
}

#[tokio::test]
async fn wrong_method_goes_through_the_error_stage() {
    let app = test_app().await;

    let (status, body) = call(&app, "DELETE", "/api/rooms", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], "method_not_allowed");
    assert_eq!(body["path"], "/api/rooms");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn plain_get_on_gateway_is_a_shaped_error_without_the_token() {
    let app = test_app().await;
    let (token, _) = register(&app, "alice").await;

    let (status, body) = call(&app, "GET", &format!("/api/ws?token={token}"), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "upgrade_required");
    assert_eq!(body["path"], "/api/ws?token=[redacted]");
    assert!(!body.to_string().contains(&token));
}

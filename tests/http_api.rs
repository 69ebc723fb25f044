mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use quiz_duel_back::routes::{self, matches::USER_ID_HEADER};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use common::Harness;

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(USER_ID_HEADER, user.to_string());
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn create_requires_a_caller_identity() {
    let h = Harness::new(3);
    let app = routes::router(h.state.clone());

    let (status, body) = call(&app, Method::POST, "/matches", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains(USER_ID_HEADER));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/matches")
        .header(USER_ID_HEADER, "not-a-uuid")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_validates_tag_filters() {
    let h = Harness::new(3);
    let app = routes::router(h.state.clone());
    let tags: Vec<String> = (0..11).map(|i| format!("tag{i}")).collect();

    let (status, _) = call(
        &app,
        Method::POST,
        "/matches",
        Some(Uuid::new_v4()),
        Some(json!({ "tags": tags })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_match_flow_over_http() {
    let h = Harness::new(3);
    let app = routes::router(h.state.clone());
    let owner = Uuid::new_v4();
    let challenger = Uuid::new_v4();

    let (status, created) = call(
        &app,
        Method::POST,
        "/matches",
        Some(owner),
        Some(json!({ "difficulty": "easy", "tags": ["general"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "waiting");
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, waiting) = call(&app, Method::GET, "/matches/waiting", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(waiting[0]["id"], id.as_str());

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/join"),
        Some(owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, ack) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/join"),
        Some(challenger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ok"], true);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/accept"),
        Some(challenger),
        Some(json!({ "user_id": challenger })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, started) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/accept"),
        Some(owner),
        Some(json!({ "user_id": challenger })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "active");
    assert!(started.get("correct_index").is_none());
    let question_id = started["current_question_id"].as_str().unwrap().to_owned();

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/answer"),
        Some(owner),
        Some(json!({ "question_id": Uuid::new_v4(), "selected_index": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, answered) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/answer"),
        Some(owner),
        Some(json!({ "question_id": question_id, "selected_index": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answered["accepted"], true);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/answer"),
        Some(owner),
        Some(json!({ "question_id": question_id, "selected_index": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::GET, &format!("/matches/{id}/results"), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/matches/{id}/end"),
        Some(owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, results) =
        call(&app, Method::GET, &format!("/matches/{id}/results"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["reason"], "owner");
    assert_eq!(results["questions"].as_array().unwrap().len(), 1);
    assert_eq!(results["participants"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_matches_are_not_found() {
    let h = Harness::new(3);
    let app = routes::router(h.state.clone());
    let id = Uuid::new_v4();

    let (status, _) = call(&app, Method::GET, &format!("/matches/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, &format!("/sse/matches/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn healthcheck_reports_the_memory_backend() {
    let h = Harness::new(0);
    let app = routes::router(h.state.clone());

    let (status, body) = call(&app, Method::GET, "/healthcheck", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "storage": "memory" }));
}

#[tokio::test]
async fn user_streams_are_private_to_their_user() {
    let h = Harness::new(3);
    let app = routes::router(h.state.clone());
    let user = Uuid::new_v4();
    let uri = format!("/sse/users/{user}");

    let (status, _) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, &uri, Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!h.state.sse().has_user_hub(user));

    let request = Request::builder()
        .uri(&uri)
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.state.sse().has_user_hub(user));
}

#[tokio::test]
async fn finished_matches_refuse_new_stream_subscribers() {
    let h = Harness::new(3);
    let app = routes::router(h.state.clone());
    let (id, owner, _) = h.active_match().await;
    quiz_duel_back::services::match_service::force_end(&h.state, id, owner)
        .await
        .unwrap();

    let (status, _) = call(&app, Method::GET, &format!("/sse/matches/{id}"), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!h.state.sse().has_match_hub(id));
}

mod common;

use axum::http::StatusCode;
use axum::Router;
use serde_json::json;

use common::app::spawn_test_app;
use common::{auth, http};

async fn create_record(router: &Router, token: &str) -> String {
    let (status, body) = http::post(router, "/api/session-records", Some(token), None).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["data"]["id"].as_str().expect("record id").to_string()
}

async fn start_record(router: &Router, token: &str, record_id: &str) -> serde_json::Value {
    let (status, body) = http::post(
        router,
        &format!("/api/session-records/{record_id}/start"),
        Some(token),
        Some(json!({"input": "teach me rust ownership"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "start failed: {body}");
    body["data"].clone()
}

async fn answer_once(router: &Router, token: &str, record_id: &str) -> serde_json::Value {
    let (status, body) = http::post(
        router,
        &format!("/api/session-records/{record_id}/answer"),
        Some(token),
        Some(json!({"answer": "because of the borrow checker"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "answer failed: {body}");
    body["data"].clone()
}

#[tokio::test]
async fn create_returns_pending_record() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "c@example.com").await;

    let (status, body) = http::post(&app.router, "/api/session-records", Some(&token), None).await;

    assert_eq!(status, StatusCode::CREATED);
    let record = &body["data"];
    assert_eq!(record["status"], "PENDING");
    assert!(record["topic"].is_null());
    assert_eq!(record["questions"].as_array().unwrap().len(), 0);
    assert!(record["currentQuestionIndex"].is_null());
    assert_eq!(record["score"], 0.0);

    // The active pointer now names this record
    let (_, me) = http::get(&app.router, "/api/users/me", Some(&token)).await;
    assert_eq!(me["data"]["activeSessionRecordId"], record["id"]);
}

#[tokio::test]
async fn second_create_is_rejected_by_the_guard() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "g@example.com").await;
    create_record(&app.router, &token).await;

    let (status, body) = http::post(&app.router, "/api/session-records", Some(&token), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ACTIVE_SESSION_EXISTS");
}

#[tokio::test]
async fn guard_is_per_user() {
    let app = spawn_test_app();
    let token_a = auth::register(&app.router, "a@example.com").await;
    let token_b = auth::register(&app.router, "b@example.com").await;

    create_record(&app.router, &token_a).await;
    // User B's guard slot is their own
    create_record(&app.router, &token_b).await;
}

#[tokio::test]
async fn start_fills_topic_questions_and_cursor() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "s@example.com").await;
    let id = create_record(&app.router, &token).await;

    let record = start_record(&app.router, &token, &id).await;

    assert_eq!(record["status"], "STARTED");
    assert_eq!(record["topic"], "Mock Topic");
    assert_eq!(record["questions"].as_array().unwrap().len(), 7);
    assert_eq!(record["currentQuestionIndex"], 0);
    // Every question carries a server-assigned id
    for question in record["questions"].as_array().unwrap() {
        assert!(question["id"].is_string());
        assert!(question["payload"].is_string());
    }
}

#[tokio::test]
async fn start_twice_is_invalid_transition() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "s2@example.com").await;
    let id = create_record(&app.router, &token).await;
    start_record(&app.router, &token, &id).await;

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/start"),
        Some(&token),
        Some(json!({"input": "again"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn start_rejects_blank_and_oversized_input() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "s3@example.com").await;
    let id = create_record(&app.router, &token).await;

    for input in ["   ", &"x".repeat(201)] {
        let (status, body) = http::post(
            &app.router,
            &format!("/api/session-records/{id}/start"),
            Some(&token),
            Some(json!({"input": input})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_TOPIC_INPUT");
    }

    // The record is left Pending and can still be started
    start_record(&app.router, &token, &id).await;
}

#[tokio::test]
async fn answer_before_start_is_invalid_transition() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "a1@example.com").await;
    let id = create_record(&app.router, &token).await;

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/answer"),
        Some(&token),
        Some(json!({"answer": "early"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn answers_advance_then_finish_and_credit_points() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "flow@example.com").await;
    let id = create_record(&app.router, &token).await;
    start_record(&app.router, &token, &id).await;

    for expected_cursor in 1..7 {
        let record = answer_once(&app.router, &token, &id).await;
        assert_eq!(record["status"], "STARTED");
        assert_eq!(record["currentQuestionIndex"], expected_cursor);
        assert_eq!(record["answers"].as_array().unwrap().len(), expected_cursor);
    }

    // Seventh answer finishes without advancing the cursor
    let record = answer_once(&app.router, &token, &id).await;
    assert_eq!(record["status"], "FINISHED");
    assert_eq!(record["currentQuestionIndex"], 6);
    assert_eq!(record["answers"].as_array().unwrap().len(), 7);
    // Mock grader scores every answer 80
    assert_eq!(record["score"], 80.0);
    assert_eq!(record["answers"][0]["grade"], "B");

    // Points credited (7 * 80) and the guard released
    let (_, me) = http::get(&app.router, "/api/users/me", Some(&token)).await;
    assert_eq!(me["data"]["points"], 560.0);
    assert_eq!(me["data"]["level"], "TWO");
    assert!(me["data"]["activeSessionRecordId"].is_null());
}

#[tokio::test]
async fn answer_after_finish_is_invalid_transition() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "a2@example.com").await;
    let id = create_record(&app.router, &token).await;
    start_record(&app.router, &token, &id).await;
    for _ in 0..7 {
        answer_once(&app.router, &token, &id).await;
    }

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/answer"),
        Some(&token),
        Some(json!({"answer": "one more"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn oversized_answer_is_rejected_without_state_change() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "a3@example.com").await;
    let id = create_record(&app.router, &token).await;
    start_record(&app.router, &token, &id).await;

    let (status, _) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/answer"),
        Some(&token),
        Some(json!({"answer": "a".repeat(2_001)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = http::get(
        &app.router,
        &format!("/api/session-records/{id}"),
        Some(&token),
    )
    .await;
    assert_eq!(body["data"]["currentQuestionIndex"], 0);
    assert_eq!(body["data"]["answers"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn end_credits_partial_scores_and_releases_guard() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "e@example.com").await;
    let id = create_record(&app.router, &token).await;
    start_record(&app.router, &token, &id).await;
    answer_once(&app.router, &token, &id).await;
    answer_once(&app.router, &token, &id).await;

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/end"),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "FINISHED");
    assert_eq!(body["data"]["answers"].as_array().unwrap().len(), 2);

    let (_, me) = http::get(&app.router, "/api/users/me", Some(&token)).await;
    assert_eq!(me["data"]["points"], 160.0);
    assert!(me["data"]["activeSessionRecordId"].is_null());

    // A new session can start now
    create_record(&app.router, &token).await;
}

#[tokio::test]
async fn end_pending_record_credits_nothing() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "e2@example.com").await;
    let id = create_record(&app.router, &token).await;

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/end"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "FINISHED");

    let (_, me) = http::get(&app.router, "/api/users/me", Some(&token)).await;
    assert_eq!(me["data"]["points"], 0.0);
}

#[tokio::test]
async fn end_twice_is_invalid_transition() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "e3@example.com").await;
    let id = create_record(&app.router, &token).await;
    http::post(
        &app.router,
        &format!("/api/session-records/{id}/end"),
        Some(&token),
        None,
    )
    .await;

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/end"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn retry_clones_questions_into_a_fresh_started_record() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "r@example.com").await;
    let id = create_record(&app.router, &token).await;
    let started = start_record(&app.router, &token, &id).await;
    for _ in 0..7 {
        answer_once(&app.router, &token, &id).await;
    }

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/retry"),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let retry = &body["data"];
    assert_ne!(retry["id"], json!(id));
    assert_eq!(retry["status"], "STARTED");
    assert_eq!(retry["topic"], started["topic"]);
    assert_eq!(retry["questions"], started["questions"]);
    assert_eq!(retry["answers"].as_array().unwrap().len(), 0);
    assert_eq!(retry["currentQuestionIndex"], 0);

    // Source record untouched
    let (_, source) = http::get(
        &app.router,
        &format!("/api/session-records/{id}"),
        Some(&token),
    )
    .await;
    assert_eq!(source["data"]["status"], "FINISHED");
    assert_eq!(source["data"]["answers"].as_array().unwrap().len(), 7);

    // The retry holds the guard
    let (status, body) = http::post(&app.router, "/api/session-records", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ACTIVE_SESSION_EXISTS");
}

#[tokio::test]
async fn retry_of_unfinished_record_is_invalid_transition() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "r2@example.com").await;
    let id = create_record(&app.router, &token).await;

    let (status, body) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/retry"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn other_users_record_reads_as_not_found() {
    let app = spawn_test_app();
    let token_a = auth::register(&app.router, "owner@example.com").await;
    let token_b = auth::register(&app.router, "other@example.com").await;
    let id = create_record(&app.router, &token_a).await;

    let (status, body) = http::get(
        &app.router,
        &format!("/api/session-records/{id}"),
        Some(&token_b),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    // Mutations are hidden the same way
    let (status, _) = http::post(
        &app.router,
        &format!("/api/session-records/{id}/end"),
        Some(&token_b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_paginates_with_next_cursor() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "l@example.com").await;

    let mut ids = Vec::new();
    for _ in 0..5 {
        let id = create_record(&app.router, &token).await;
        http::post(
            &app.router,
            &format!("/api/session-records/{id}/end"),
            Some(&token),
            None,
        )
        .await;
        ids.push(id);
    }
    ids.sort();

    let (status, body) = http::get(&app.router, "/api/session-records?limit=2", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], json!(ids[0]));
    assert_eq!(items[1]["id"], json!(ids[1]));
    let cursor = body["data"]["nextCursor"].as_str().unwrap().to_string();
    assert_eq!(cursor, ids[2]);

    let (_, body) = http::get(
        &app.router,
        &format!("/api/session-records?limit=2&cursor={cursor}"),
        Some(&token),
    )
    .await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items[0]["id"], json!(ids[2]));
    assert_eq!(items[1]["id"], json!(ids[3]));

    let cursor = body["data"]["nextCursor"].as_str().unwrap().to_string();
    let (_, body) = http::get(
        &app.router,
        &format!("/api/session-records?limit=2&cursor={cursor}"),
        Some(&token),
    )
    .await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert!(body["data"]["nextCursor"].is_null());
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "l2@example.com").await;

    let finished = create_record(&app.router, &token).await;
    http::post(
        &app.router,
        &format!("/api/session-records/{finished}/end"),
        Some(&token),
        None,
    )
    .await;
    let pending = create_record(&app.router, &token).await;

    let (_, body) = http::get(
        &app.router,
        "/api/session-records?status=FINISHED",
        Some(&token),
    )
    .await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!(finished));

    let (_, body) = http::get(
        &app.router,
        "/api/session-records?status=PENDING",
        Some(&token),
    )
    .await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!(pending));
}

#[tokio::test]
async fn list_rejects_out_of_range_limits() {
    let app = spawn_test_app();
    let token = auth::register(&app.router, "l3@example.com").await;

    for limit in [0, 101] {
        let (status, body) = http::get(
            &app.router,
            &format!("/api/session-records?limit={limit}"),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_LIMIT");
    }
}

#[tokio::test]
async fn list_never_leaks_other_users_records() {
    let app = spawn_test_app();
    let token_a = auth::register(&app.router, "la@example.com").await;
    let token_b = auth::register(&app.router, "lb@example.com").await;
    create_record(&app.router, &token_a).await;

    let (_, body) = http::get(&app.router, "/api/session-records", Some(&token_b)).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);
}

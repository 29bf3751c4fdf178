//! End-to-end tests of the ingest endpoints against a temporary store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use drill_store::{Recorder, SessionRegistry, UploadStore};
use drilld::http::{router, AppState};

const API_KEY: &str = "TEST";

fn test_app() -> (Router, AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let state = AppState {
        recorder: Arc::new(Recorder::new(dir.path())),
        registry: Arc::new(SessionRegistry::new()),
        uploads: Arc::new(UploadStore::new(dir.path().join("uploads"))),
    };
    state.recorder.init().unwrap();
    (router(state.clone()), state, dir)
}

async fn send_json(
    app: &Router,
    path: &str,
    with_key: bool,
    body: Value,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/json");
    if with_key {
        request = request.header("x-api-key", API_KEY);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, parsed)
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let (app, _state, _dir) = test_app();
    let (status, body) = send_json(&app, "/start", false, json!({"employee_id": "E1"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], json!("error"));
}

#[tokio::test]
async fn missing_field_is_named_in_declared_order() {
    let (app, _state, _dir) = test_app();
    let (status, body) = send_json(&app, "/start", true, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("missing required field: employee_id"));

    // step declares session_id first
    let (status, body) = send_json(&app, "/step", true, json!({"employee_id": "E1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("missing required field: session_id"));
}

#[tokio::test]
async fn unknown_session_is_rejected_and_nothing_is_appended() {
    let (app, state, _dir) = test_app();
    let (status, body) = send_json(
        &app,
        "/step",
        true,
        json!({
            "session_id": "bogus",
            "employee_id": "E1",
            "step_number": 1,
            "step_name": "intro",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("invalid session"));

    let doc = state.recorder.dump().unwrap();
    for (_name, table) in &doc.tables {
        assert!(table.rows.is_empty());
    }
}

#[tokio::test]
async fn full_drill_leaves_five_operations_rows_in_order() {
    let (app, state, _dir) = test_app();

    let (status, body) = send_json(&app, "/start", true, json!({"employee_id": "E1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("success"));
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        "/step",
        true,
        json!({
            "session_id": session_id,
            "employee_id": "E1",
            "step_number": 1,
            "step_name": "intro",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(
        &app,
        "/form",
        true,
        json!({
            "session_id": session_id,
            "employee_id": "E1",
            "step_number": 1,
            "field_name": "name",
            "field_value": "Alice",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // "T0s=" is base64("OK")
    let (status, _) = send_json(
        &app,
        "/complete",
        true,
        json!({
            "session_id": session_id,
            "employee_id": "E1",
            "verification_code": "T0s=",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(
        &app,
        "/close",
        true,
        json!({
            "session_id": session_id,
            "employee_id": "E1",
            "step_number": 1,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let doc = state.recorder.dump().unwrap();
    let operations = &doc.tables["operations"];
    assert_eq!(operations.rows.len(), 5);

    let column = |name: &str| {
        operations
            .header
            .iter()
            .position(|c| c == name)
            .unwrap()
    };
    let kinds: Vec<_> = operations
        .rows
        .iter()
        .map(|row| row[column("operation")].clone())
        .collect();
    assert_eq!(
        kinds,
        vec![
            json!("start"),
            json!("step"),
            json!("form"),
            json!("complete"),
            json!("close")
        ]
    );

    // the verification code is stored decoded
    let complete = &doc.tables["complete"];
    let code_col = complete
        .header
        .iter()
        .position(|c| c == "verification_code")
        .unwrap();
    assert_eq!(complete.rows[0][code_col], json!("OK"));
}

#[tokio::test]
async fn non_base64_verification_code_is_stored_raw() {
    let (app, state, _dir) = test_app();
    let (_, body) = send_json(&app, "/start", true, json!({"employee_id": "E1"})).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        "/complete",
        true,
        json!({
            "session_id": session_id,
            "employee_id": "E1",
            "verification_code": "not base64!!",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let doc = state.recorder.dump().unwrap();
    let complete = &doc.tables["complete"];
    let code_col = complete
        .header
        .iter()
        .position(|c| c == "verification_code")
        .unwrap();
    assert_eq!(complete.rows[0][code_col], json!("not base64!!"));
}

#[tokio::test]
async fn upload_materializes_the_file_and_returns_its_path() {
    let (app, state, dir) = test_app();
    let (_, body) = send_json(&app, "/start", true, json!({"employee_id": "E1"})).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let boundary = "X-DRILL-BOUNDARY";
    let mut multipart = String::new();
    for (name, value) in [
        ("session_id", session_id.as_str()),
        ("employee_id", "E1"),
        ("step_number", "2"),
        ("field_name", "evidence"),
    ] {
        multipart.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    multipart.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"shot.png\"\r\nContent-Type: image/png\r\n\r\npng-bytes\r\n--{boundary}--\r\n"
    ));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("x-api-key", API_KEY)
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(multipart))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], json!("success"));

    let saved_path = std::path::PathBuf::from(body["path"].as_str().unwrap());
    assert!(saved_path.starts_with(dir.path().join("uploads")));
    assert_eq!(std::fs::read(&saved_path).unwrap(), b"png-bytes");

    let doc = state.recorder.dump().unwrap();
    let upload = &doc.tables["upload"];
    assert_eq!(upload.rows.len(), 1);
    let size_col = upload
        .header
        .iter()
        .position(|c| c == "file_size_bytes")
        .unwrap();
    assert_eq!(upload.rows[0][size_col], json!(9));
}

#[tokio::test]
async fn upload_without_file_names_the_missing_field() {
    let (app, _state, _dir) = test_app();

    let boundary = "X-DRILL-BOUNDARY";
    let multipart = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\nS\r\n--{boundary}--\r\n"
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("x-api-key", API_KEY)
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(multipart))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], json!("missing required field: employee_id"));
}

#[tokio::test]
async fn data_dump_exposes_sessions_and_tables() {
    let (app, _state, _dir) = test_app();
    let (_, body) = send_json(&app, "/start", true, json!({"employee_id": "E1"})).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/data")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["sessions"][&session_id]["employee_id"], json!("E1"));
    assert_eq!(body["tables"]["start"]["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_reports_ok_without_a_key() {
    let (app, _state, _dir) = test_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

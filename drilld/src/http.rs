//! HTTP surface: router, request validation, and response shaping.
//!
//! Handlers are thin validation+transform pipelines over the store crate:
//! check the API key, check required fields in declared order, check the
//! session, build the event record, and hand it to the recorder on a
//! blocking thread. Every response body carries `status` and `message`.

use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use drill_store::{
    decode_verification_code, now_iso, EventBody, EventRecord, Recorder, SessionRegistry,
    StoreError, UploadStore,
};

use crate::auth::has_api_key;

#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<Recorder>,
    pub registry: Arc<SessionRegistry>,
    pub uploads: Arc<UploadStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/step", post(step))
        .route("/form", post(form))
        .route("/upload", post(upload))
        .route("/complete", post(complete))
        .route("/close", post(close))
        .route("/data", get(data))
        .route("/health", get(health))
        .layer(Extension(state))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-api-key")])
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    Storage(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidSession => ApiError::BadRequest("invalid session".into()),
            StoreError::MissingField(field) => {
                ApiError::BadRequest(format!("missing required field: {field}"))
            }
            other => ApiError::Storage(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "missing API key".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Storage(err) => {
                error!("storage failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure".to_string(),
                )
            }
        };
        (code, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

fn ensure_api_key(headers: &HeaderMap) -> Result<(), ApiError> {
    if has_api_key(headers) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Checks required fields in declared order; the first absent one names the
/// rejection.
fn require_fields(payload: &Value, required: &[&str]) -> Result<(), ApiError> {
    let Some(object) = payload.as_object() else {
        return Err(ApiError::BadRequest("missing JSON body".into()));
    };
    for field in required {
        if !object.contains_key(*field) {
            return Err(StoreError::MissingField(field.to_string()).into());
        }
    }
    Ok(())
}

fn field_str(payload: &Value, name: &str) -> String {
    match payload.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn field_raw(payload: &Value, name: &str) -> Value {
    payload.get(name).cloned().unwrap_or(Value::Null)
}

fn timestamp_or_now(payload: &Value) -> String {
    match payload.get("timestamp").and_then(Value::as_str) {
        Some(ts) => ts.to_string(),
        None => now_iso(),
    }
}

fn ensure_session(state: &AppState, session_id: &str) -> Result<(), ApiError> {
    if state.registry.exists(session_id) {
        Ok(())
    } else {
        Err(StoreError::InvalidSession.into())
    }
}

/// Runs the write-through chain on a blocking thread.
async fn record_event(state: &AppState, event: EventRecord) -> Result<(), ApiError> {
    let recorder = state.recorder.clone();
    tokio::task::spawn_blocking(move || recorder.record(&event))
        .await
        .map_err(|err| ApiError::Storage(StoreError::Io(std::io::Error::other(err))))?
        .map_err(ApiError::from)
}

fn ok(message: &str) -> Json<Value> {
    Json(json!({ "status": "success", "message": message }))
}

async fn start(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    ensure_api_key(&headers)?;
    require_fields(&payload, &["employee_id"])?;

    let employee_id = field_str(&payload, "employee_id");
    let timestamp = timestamp_or_now(&payload);
    let session_id = state.registry.create(&employee_id, &timestamp);

    let event = EventRecord::new(EventBody::Start, &session_id, &employee_id, &timestamp);
    record_event(&state, event).await?;

    info!(%employee_id, %session_id, "drill started");
    Ok(Json(json!({
        "status": "success",
        "message": "recorded",
        "session_id": session_id,
    })))
}

async fn step(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    ensure_api_key(&headers)?;
    require_fields(
        &payload,
        &["session_id", "employee_id", "step_number", "step_name"],
    )?;

    let session_id = field_str(&payload, "session_id");
    ensure_session(&state, &session_id)?;

    let step_name = field_str(&payload, "step_name");
    let event = EventRecord::new(
        EventBody::Step {
            step_number: field_raw(&payload, "step_number"),
            step_name: step_name.clone(),
        },
        &session_id,
        field_str(&payload, "employee_id"),
        timestamp_or_now(&payload),
    );
    record_event(&state, event).await?;

    info!(%session_id, %step_name, "step entered");
    Ok(ok("recorded"))
}

async fn form(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    ensure_api_key(&headers)?;
    require_fields(
        &payload,
        &[
            "session_id",
            "employee_id",
            "step_number",
            "field_name",
            "field_value",
        ],
    )?;

    let session_id = field_str(&payload, "session_id");
    ensure_session(&state, &session_id)?;

    let field_name = field_str(&payload, "field_name");
    let event = EventRecord::new(
        EventBody::Form {
            step_number: field_raw(&payload, "step_number"),
            field_name: field_name.clone(),
            field_value: field_raw(&payload, "field_value"),
        },
        &session_id,
        field_str(&payload, "employee_id"),
        timestamp_or_now(&payload),
    );
    record_event(&state, event).await?;

    info!(%session_id, %field_name, "form input recorded");
    Ok(ok("recorded"))
}

async fn complete(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    ensure_api_key(&headers)?;
    require_fields(&payload, &["session_id", "employee_id", "verification_code"])?;

    let session_id = field_str(&payload, "session_id");
    ensure_session(&state, &session_id)?;

    // Malformed codes are stored raw; decoding never fails the request.
    let verification_code = decode_verification_code(&field_str(&payload, "verification_code"));
    let event = EventRecord::new(
        EventBody::Complete {
            verification_code: verification_code.clone(),
        },
        &session_id,
        field_str(&payload, "employee_id"),
        timestamp_or_now(&payload),
    );
    record_event(&state, event).await?;

    info!(%session_id, %verification_code, "drill completed");
    Ok(ok("drill completed, recorded"))
}

async fn close(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    ensure_api_key(&headers)?;
    require_fields(&payload, &["session_id", "employee_id", "step_number"])?;

    let session_id = field_str(&payload, "session_id");
    ensure_session(&state, &session_id)?;

    let event = EventRecord::new(
        EventBody::Close {
            step_number: field_raw(&payload, "step_number"),
        },
        &session_id,
        field_str(&payload, "employee_id"),
        timestamp_or_now(&payload),
    );
    record_event(&state, event).await?;

    info!(%session_id, "drill closed");
    Ok(ok("recorded"))
}

async fn upload(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    ensure_api_key(&headers)?;

    let mut session_id = None;
    let mut employee_id = None;
    let mut step_number = None;
    let mut field_name = None;
    let mut timestamp = None;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("malformed multipart: {err}")))?
    {
        let name = part.name().unwrap_or_default().to_string();
        match name.as_str() {
            "session_id" => session_id = Some(part_text(part).await?),
            "employee_id" => employee_id = Some(part_text(part).await?),
            "step_number" => step_number = Some(part_text(part).await?),
            "field_name" => field_name = Some(part_text(part).await?),
            "timestamp" => timestamp = Some(part_text(part).await?),
            "file" => {
                let filename = part
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let mime_type = part
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let bytes = part
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("malformed multipart: {err}")))?;
                file = Some((filename, mime_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    // Required in declared order; field_name stays optional.
    let session_id = session_id.ok_or_else(|| missing("session_id"))?;
    let employee_id = employee_id.ok_or_else(|| missing("employee_id"))?;
    let step_number = step_number.ok_or_else(|| missing("step_number"))?;
    let (original_filename, mime_type, bytes) = file.ok_or_else(|| missing("file"))?;
    ensure_session(&state, &session_id)?;

    let timestamp = timestamp.unwrap_or_else(now_iso);
    let step_number = parse_step_number(&step_number);

    let uploads = state.uploads.clone();
    let recorder = state.recorder.clone();
    let saved_path = {
        let session_id = session_id.clone();
        let employee_id = employee_id.clone();
        tokio::task::spawn_blocking(move || -> Result<String, StoreError> {
            let saved =
                uploads.materialize(&employee_id, &session_id, &original_filename, &bytes)?;
            let event = EventRecord::new(
                EventBody::Upload {
                    step_number,
                    field_name,
                    original_filename,
                    saved_path: saved.path.display().to_string(),
                    file_size_bytes: saved.file_size_bytes,
                    mime_type,
                },
                &session_id,
                &employee_id,
                &timestamp,
            );
            recorder.record(&event)?;
            Ok(saved.path.display().to_string())
        })
        .await
        .map_err(|err| ApiError::Storage(StoreError::Io(std::io::Error::other(err))))?
        .map_err(ApiError::from)?
    };

    info!(%session_id, %saved_path, "upload recorded");
    Ok(Json(json!({
        "status": "success",
        "message": "recorded",
        "path": saved_path,
    })))
}

async fn part_text(part: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    part.text()
        .await
        .map_err(|err| ApiError::BadRequest(format!("malformed multipart: {err}")))
}

fn missing(field: &str) -> ApiError {
    StoreError::MissingField(field.to_string()).into()
}

/// Multipart carries text; keep numeric step numbers numeric in storage.
fn parse_step_number(raw: &str) -> Value {
    match raw.trim().parse::<i64>() {
        Ok(number) => json!(number),
        Err(_) => json!(raw),
    }
}

/// Debug-only dump of the session registry and the full tabular store.
async fn data(Extension(state): Extension<AppState>) -> Result<Json<Value>, ApiError> {
    let sessions = state.registry.snapshot();
    let recorder = state.recorder.clone();
    let doc = tokio::task::spawn_blocking(move || recorder.dump())
        .await
        .map_err(|err| ApiError::Storage(StoreError::Io(std::io::Error::other(err))))?
        .map_err(ApiError::from)?;

    Ok(Json(json!({
        "sessions": sessions,
        "tables": doc.tables,
    })))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

//! HTTP API: start sessions and send messages through them.
//!
//! Handlers parse and validate input, normalize the recipient, and hand off to
//! the [`SessionGateway`]. Every gateway error maps to a JSON error body.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};
use wagate_channels::whatsapp;
use wagate_core::{
    config::PhoneConfig,
    error::GatewayError,
    message::{ButtonMenu, MediaAttachment, OutboundPayload, SendReceipt},
    traits::SessionStore,
};
use wagate_sessions::SessionGateway;

/// Mime type assumed when an upload does not declare one.
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    gateway: Arc<SessionGateway>,
    phone: PhoneConfig,
    upload_dir: PathBuf,
    body_limit: usize,
    uptime: Instant,
}

impl ApiState {
    pub fn new(
        gateway: Arc<SessionGateway>,
        phone: PhoneConfig,
        upload_dir: PathBuf,
        body_limit: usize,
    ) -> Self {
        Self {
            gateway,
            phone,
            upload_dir,
            body_limit,
            uptime: Instant::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    session_id: String,
    number: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendButtonRequest {
    session_id: String,
    number: String,
}

/// Map a gateway error to a status and JSON body. `send_label` is the error
/// text for a rejected send.
fn error_response(err: GatewayError, send_label: &str) -> ApiError {
    let (status, body) = match &err {
        GatewayError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            json!({"error": "Session not found"}),
        ),
        GatewayError::NoFileProvided => (
            StatusCode::BAD_REQUEST,
            json!({"error": "No image file provided"}),
        ),
        GatewayError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, json!({"error": msg})),
        GatewayError::DataStoreUnavailable(msg) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "Data store unavailable", "details": msg}),
        ),
        e if e.is_initialization() => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "Client initialization failed", "details": e.to_string()}),
        ),
        GatewayError::SendFailed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": send_label, "details": err.to_string()}),
        ),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "Internal error", "details": other.to_string()}),
        ),
    };
    if status.is_server_error() {
        error!("request failed: {err}");
    }
    (status, Json(body))
}

fn bad_json(e: JsonRejection) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": format!("invalid request: {e}")})),
    )
}

fn sent(message: &str, receipt: SendReceipt) -> Json<Value> {
    Json(json!({"message": message, "response": receipt}))
}

/// `POST /start-session`: construct and start initializing a client.
async fn start_session(
    State(state): State<ApiState>,
    body: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(bad_json)?;

    let client_state = state
        .gateway
        .start_session(&request.session_id)
        .await
        .map_err(|e| error_response(e, "Failed to start session"))?;

    info!(session_id = %request.session_id, state = client_state.label(), "session started");
    Ok(Json(json!({
        "message": format!("Client initialized for session {}", request.session_id),
        "state": client_state,
    })))
}

/// `POST /send-message`: send free text.
async fn send_message(
    State(state): State<ApiState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(bad_json)?;
    let to = state.phone.normalize(&request.number);

    let receipt = state
        .gateway
        .send(&request.session_id, &to, OutboundPayload::Text(request.message))
        .await
        .map_err(|e| error_response(e, "Failed to send message"))?;
    Ok(sent("Message sent", receipt))
}

/// `POST /send-message-button`: send the fixed three-option menu.
async fn send_message_button(
    State(state): State<ApiState>,
    body: Result<Json<SendButtonRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(bad_json)?;
    let to = state.phone.normalize(&request.number);

    let receipt = state
        .gateway
        .send(
            &request.session_id,
            &to,
            OutboundPayload::Buttons(ButtonMenu::standard()),
        )
        .await
        .map_err(|e| error_response(e, "Failed to send message"))?;
    Ok(sent("Message sent", receipt))
}

/// Fields of a `/send-image` form. The upload is spooled to a temp file that
/// is removed when this value drops.
#[derive(Default)]
struct ImageForm {
    session_id: String,
    number: String,
    caption: String,
    image: Option<(NamedTempFile, String)>,
}

/// Write an upload to a fresh temp file in `dir` on the blocking pool.
async fn spool_upload(dir: PathBuf, bytes: Bytes) -> Result<NamedTempFile, GatewayError> {
    let spooled = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir)?;
        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(&bytes)?;
        Ok::<_, std::io::Error>(file)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(spooled)
}

/// Delete a spooled upload on the blocking pool.
async fn discard_upload(file: NamedTempFile) {
    match tokio::task::spawn_blocking(move || file.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("failed to remove upload: {e}"),
        Err(e) => warn!("upload cleanup task failed: {e}"),
    }
}

async fn read_image_form(
    mut multipart: Multipart,
    upload_dir: &std::path::Path,
) -> Result<ImageForm, GatewayError> {
    let mut form = ImageForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let mime = field
                    .content_type()
                    .unwrap_or(DEFAULT_IMAGE_MIME)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::InvalidRequest(format!("unreadable upload: {e}")))?;
                if bytes.is_empty() {
                    continue;
                }
                let file = spool_upload(upload_dir.to_path_buf(), bytes).await?;
                form.image = Some((file, mime));
            }
            "sessionId" | "number" | "caption" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| GatewayError::InvalidRequest(format!("unreadable field: {e}")))?;
                match name.as_str() {
                    "sessionId" => form.session_id = value,
                    "number" => form.number = value,
                    _ => form.caption = value,
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

/// `POST /send-image`: multipart upload sent as an image with caption.
///
/// A missing file is rejected before any session lookup. The spooled upload
/// is deleted on every exit path.
async fn send_image(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    const SEND_LABEL: &str = "Failed to send image";

    let form = read_image_form(multipart, &state.upload_dir)
        .await
        .map_err(|e| error_response(e, SEND_LABEL))?;
    let Some((file, mime_type)) = form.image else {
        return Err(error_response(GatewayError::NoFileProvided, SEND_LABEL));
    };

    let data = tokio::fs::read(file.path())
        .await
        .map_err(|e| error_response(e.into(), SEND_LABEL))?;
    let to = state.phone.normalize(&form.number);
    let payload = OutboundPayload::Media(MediaAttachment {
        data,
        mime_type,
        caption: form.caption,
    });

    let result = state.gateway.send(&form.session_id, &to, payload).await;
    discard_upload(file).await;
    let receipt = result.map_err(|e| error_response(e, SEND_LABEL))?;
    Ok(sent("Image sent", receipt))
}

/// `GET /sessions`: durable records joined with live handle state.
async fn list_sessions(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let records = state
        .gateway
        .sessions()
        .await
        .map_err(|e| error_response(e, "Failed to list sessions"))?;
    let live: std::collections::HashMap<String, _> =
        state.gateway.registry().live().await.into_iter().collect();

    let sessions: Vec<Value> = records
        .into_iter()
        .map(|record| {
            json!({
                "sessionId": record.session_id,
                "isReady": record.is_ready,
                "live": live.get(&record.session_id),
                "updatedAt": record.updated_at,
            })
        })
        .collect();
    Ok(Json(json!({"sessions": sessions})))
}

/// `GET /sessions/{id}/qr`: last pairing code as a base64 PNG.
async fn session_qr(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let code = match state.gateway.registry().get(&session_id).await {
        Some(handle) => handle.last_qr(),
        None => None,
    };
    let Some(code) = code else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "No pairing code available"})),
        ));
    };

    let png = whatsapp::generate_qr_image(&code).map_err(|e| error_response(e, "QR failed"))?;
    Ok(Json(json!({
        "sessionId": session_id,
        "qr": code,
        "qr_png_base64": BASE64.encode(&png),
    })))
}

/// `DELETE /sessions/{id}`: stop the live client and drop the record.
async fn forget_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let known = state
        .gateway
        .store()
        .find(&session_id)
        .await
        .map_err(|e| error_response(e, "Failed to delete session"))?;
    if known.is_none() {
        return Err(error_response(
            GatewayError::NotFound(session_id),
            "Failed to delete session",
        ));
    }

    state
        .gateway
        .forget(&session_id)
        .await
        .map_err(|e| error_response(e, "Failed to delete session"))?;
    Ok(Json(json!({"message": format!("Session {session_id} deleted")})))
}

/// `GET /health`: uptime and live client count.
async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "live_sessions": state.gateway.registry().len().await,
    }))
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/start-session", post(start_session))
        .route("/send-message", post(send_message))
        .route("/send-message-button", post(send_message_button))
        .route("/send-image", post(send_image))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(forget_session))
        .route("/sessions/{id}/qr", get(session_qr))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("API server failed to bind to {addr}: {e}"))?;
    info!("API server listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

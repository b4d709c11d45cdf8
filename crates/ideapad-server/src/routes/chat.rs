//! Conversation routes.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ideapad_core::{
    ConversationId, ConversationSummary, Error, ErrorCode, SamplingOverrides,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::state::AppState;

/// Create chat router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(chat_health))
        .route("/model_info", get(model_info))
        .route("/conversations", get(list_conversations))
        .route("/user_query", post(user_query))
        .route("/start", post(start_conversation))
        .route("/continue", post(continue_conversation))
        .route("/end", post(end_conversation))
        .route("/change_model", post(change_model))
}

/// Sent for any body that fails to decode; the decoder's detail is logged
const MALFORMED_BODY_MESSAGE: &str = "Request body is malformed";

/// Failure body: a stable code plus its fixed message
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    /// Request body could not be decoded
    Body(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Core(err) => {
                let code = err.code();
                let status = match code {
                    ErrorCode::InvalidInput | ErrorCode::ConfigError => StatusCode::BAD_REQUEST,
                    ErrorCode::ConversationNotFound => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!("Request failed: {}", err);
                } else {
                    warn!("Request rejected: {}", err);
                }
                let body = ErrorBody {
                    code,
                    message: code.message().to_string(),
                };
                (status, body)
            }
            ApiError::Body(detail) => {
                warn!("Malformed request body: {}", detail);
                let body = ErrorBody {
                    code: ErrorCode::InvalidInput,
                    message: MALFORMED_BODY_MESSAGE.to_string(),
                };
                (StatusCode::BAD_REQUEST, body)
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Chat health check
pub async fn chat_health() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_path: String,
    pub backend: String,
    pub description: String,
    pub version: String,
}

/// Default model new conversations start on
pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfoResponse> {
    Json(ModelInfoResponse {
        model_path: state.default_sampling().model_path.clone(),
        backend: state.orchestrator.backend_name().to_string(),
        description: "Llama model for inference".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List live conversations
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<ConversationSummary>> {
    Json(state.orchestrator.list().await)
}

#[derive(Debug, Deserialize)]
pub struct UserQueryRequest {
    pub prompt: String,
}

/// Answer a single prompt on the default model without a conversation
pub async fn user_query(
    State(state): State<Arc<AppState>>,
    req: Result<Json<UserQueryRequest>, JsonRejection>,
) -> ApiResult<ContinueConversationResponse> {
    let Json(req) = req?;

    let response = state
        .orchestrator
        .one_shot(state.default_sampling().clone(), &req.prompt)
        .await?;
    Ok(Json(ContinueConversationResponse { response }))
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub conversation_id: ConversationId,
}

/// Start a conversation.
///
/// The body is optional; when present it overrides the server's default
/// sampling configuration for this conversation only.
pub async fn start_conversation(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<StartConversationResponse> {
    let overrides: SamplingOverrides = if body.iter().all(u8::is_ascii_whitespace) {
        SamplingOverrides::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::Body(e.to_string()))?
    };
    let config = overrides
        .apply(state.default_sampling())
        .map_err(Error::from)?;

    let conversation_id = state.orchestrator.start(config).await?;
    Ok(Json(StartConversationResponse { conversation_id }))
}

#[derive(Debug, Deserialize)]
pub struct ContinueConversationRequest {
    pub conversation_id: String,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ContinueConversationResponse {
    pub response: String,
}

/// Send a prompt within a conversation
pub async fn continue_conversation(
    State(state): State<Arc<AppState>>,
    req: Result<Json<ContinueConversationRequest>, JsonRejection>,
) -> ApiResult<ContinueConversationResponse> {
    let Json(req) = req?;
    let id = ConversationId::parse(&req.conversation_id)?;

    let response = state
        .orchestrator
        .continue_conversation(&id, &req.prompt)
        .await?;
    Ok(Json(ContinueConversationResponse { response }))
}

#[derive(Debug, Deserialize)]
pub struct EndConversationRequest {
    pub conversation_id: String,
}

/// End a conversation
pub async fn end_conversation(
    State(state): State<Arc<AppState>>,
    req: Result<Json<EndConversationRequest>, JsonRejection>,
) -> ApiResult<StatusResponse> {
    let Json(req) = req?;
    let id = ConversationId::parse(&req.conversation_id)?;

    state.orchestrator.end(&id).await?;
    Ok(Json(StatusResponse {
        status: "ended".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChangeModelRequest {
    pub conversation_id: String,
    pub model_path: String,
}

#[derive(Debug, Serialize)]
pub struct ChangeModelResponse {
    pub conversation_id: ConversationId,
    pub status: String,
}

/// Move a conversation to another model
pub async fn change_model(
    State(state): State<Arc<AppState>>,
    req: Result<Json<ChangeModelRequest>, JsonRejection>,
) -> ApiResult<ChangeModelResponse> {
    let Json(req) = req?;
    let id = ConversationId::parse(&req.conversation_id)?;

    let conversation_id = state.orchestrator.change_model(&id, &req.model_path).await?;
    Ok(Json(ChangeModelResponse {
        conversation_id,
        status: "model_changed".to_string(),
    }))
}

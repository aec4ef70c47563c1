//! REST API for stackboard
//!
//! HTTP surface of the persistence service. Every successful mutation is
//! also broadcast on the sync channel by the service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use stackboard_protocol::{FolderChanges, FolderId, ItemChanges, ItemId, NewFolder, NewItem};
use stackboard_store::StoreError;

use crate::service::PersistenceService;

// Shared state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PersistenceService>,
    pub ws_port: u16,
}

/// Failures rendered as `{ "error": message }`
pub enum ApiError {
    Store(StoreError),
    /// Body missing, not JSON, or missing required fields
    BadBody(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Store(e) => {
                let status = match e {
                    StoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            Self::BadBody(message) => (StatusCode::BAD_REQUEST, message),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;
type Body<T> = Result<Json<T>, JsonRejection>;

// Routes
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/data", get(get_data))
        .route("/items", post(create_item))
        .route("/items/:id", put(update_item).delete(delete_item))
        .route("/folders", post(create_folder))
        .route("/folders/:id", put(update_folder).delete(delete_folder))
}

// Handlers

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.service.backend_name(),
        "clients": state.service.hub().client_count().await,
        "wsPort": state.ws_port,
    }))
}

async fn get_data(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.snapshot().await?))
}

async fn create_item(
    State(state): State<AppState>,
    payload: Body<NewItem>,
) -> ApiResult<impl IntoResponse> {
    let item = state.service.create_item(payload?.0).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    changes: Body<ItemChanges>,
) -> ApiResult<impl IntoResponse> {
    let Json(changes) = changes?;
    Ok(Json(state.service.update_item(&ItemId::new(id), &changes).await?))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.delete_item(&ItemId::new(id)).await?))
}

async fn create_folder(
    State(state): State<AppState>,
    payload: Body<NewFolder>,
) -> ApiResult<impl IntoResponse> {
    let folder = state.service.create_folder(payload?.0).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn update_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
    changes: Body<FolderChanges>,
) -> ApiResult<impl IntoResponse> {
    let Json(changes) = changes?;
    Ok(Json(state.service.update_folder(&FolderId::new(id), &changes).await?))
}

async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.delete_folder(&FolderId::new(id)).await?))
}

//! HTTP surface: upload, polling read model, health, and single-item
//! image regeneration.

use crate::db::{self, Pool};
use crate::model::MenuResponse;
use crate::worker::{Job, JobQueue};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

pub type ApiResult<T> = Result<T, ApiError>;

/// API error carrying an HTTP status; serialized as `{"error": message}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Shared handler state. The queue is the only path into background work.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub queue: JobQueue,
    pub max_upload_bytes: usize,
}

pub fn create_router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/menus", post(upload_menu))
        .route("/menus/:id", get(get_menu))
        .route("/menu-items/:id/regenerate", post(regenerate_item))
        .route("/health", get(health))
        // Multipart framing overhead on top of the payload cap.
        .layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /menus — accept a multipart image upload, create the job record, and
/// hand it to the worker pool. Returns before any AI call is made.
async fn upload_menu(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let mut image: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read file: {e}")))?;
            image = Some(bytes.to_vec());
            break;
        }
    }

    let image = image.ok_or_else(|| ApiError::bad_request("No image file provided"))?;
    if image.is_empty() {
        return Err(ApiError::bad_request("No image file provided"));
    }
    if image.len() > state.max_upload_bytes {
        return Err(ApiError::bad_request(format!(
            "File size must be less than {} bytes",
            state.max_upload_bytes
        )));
    }

    let menu_id = db::create_menu(&state.pool, &image).await.map_err(|e| {
        error!(%e, "failed to create menu record");
        ApiError::internal("Failed to create menu record")
    })?;

    state
        .queue
        .submit(Job::Process { menu_id, image })
        .await
        .map_err(|e| {
            error!(%e, "failed to enqueue menu job");
            ApiError::unavailable("Processing queue unavailable")
        })?;

    info!(%menu_id, "accepted menu upload");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "menu_id": menu_id })),
    ))
}

/// GET /menus/:id — current snapshot of the job and all its items.
async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MenuResponse>> {
    let menu_id =
        Uuid::parse_str(&id).map_err(|_| ApiError::not_found("Menu not found"))?;
    let snapshot = db::get_menu_with_items(&state.pool, menu_id)
        .await
        .map_err(|e| {
            error!(%e, "failed to fetch menu");
            ApiError::internal("Failed to fetch menu")
        })?;
    let (menu, items) = snapshot.ok_or_else(|| ApiError::not_found("Menu not found"))?;
    Ok(Json(MenuResponse::from_parts(menu, items)))
}

/// POST /menu-items/:id/regenerate — queue a fresh image generation for one
/// item. A thin wrapper over the enrichment image step, outside the job
/// state machine.
async fn regenerate_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let item_id =
        Uuid::parse_str(&id).map_err(|_| ApiError::not_found("Menu item not found"))?;
    let item = db::get_item(&state.pool, item_id).await.map_err(|e| {
        error!(%e, "failed to fetch menu item");
        ApiError::internal("Failed to fetch menu item")
    })?;
    if item.is_none() {
        return Err(ApiError::not_found("Menu item not found"));
    }

    state
        .queue
        .submit(Job::RegenerateImage { item_id })
        .await
        .map_err(|e| {
            error!(%e, "failed to enqueue regeneration job");
            ApiError::unavailable("Processing queue unavailable")
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "item_id": item_id })),
    ))
}

/// GET /health — liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_status() {
        assert_eq!(
            ApiError::bad_request("x").status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::not_found("x").status, StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::internal("x").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::unavailable("x").status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn api_error_response_body() {
        let resp = ApiError::not_found("Menu not found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

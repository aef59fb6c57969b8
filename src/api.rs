//! HTTP surface of the feed: listing, lookup, like toggling and share counting.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path as AxumPath, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::catalog::{CatalogError, CatalogStore, UserId, VideoId, VideoRecord};

const VIDEO_NOT_FOUND: &str = "Video not found";
const LIKE_FIELDS_REQUIRED: &str = "Video ID and User ID are required";
const SHARE_FIELDS_REQUIRED: &str = "Video ID is required";
const SHARE_RECORDED: &str = "Share recorded successfully";

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<CatalogStore>,
}

impl AppState {
    pub fn new(catalog: Arc<CatalogStore>) -> Self {
        Self { catalog }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/videos", get(list_videos))
        .route("/videos/{id}", get(get_video))
        .route("/like", post(like_video))
        .route("/share", post(share_video))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => ApiError::not_found(VIDEO_NOT_FOUND),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /like`. Both ids arrive loosely typed from the browser, so
/// they are kept as raw JSON and interpreted by [`video_ref`] and
/// [`text_field`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    #[serde(default)]
    pub video_id: Option<Value>,
    #[serde(default)]
    pub user_id: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    #[serde(default)]
    pub video_id: Option<Value>,
    #[serde(default)]
    pub platform: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareResponse {
    pub success: bool,
    pub message: String,
    pub shares: i64,
}

/// How a request refers to a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoRef {
    Id(VideoId),
    /// Present, but cannot name any catalog entry.
    Unknown,
}

/// Reads a `videoId` field. `None` means the field counts as missing: absent,
/// `null`, `0`, `false` or an empty string. Numeric strings are accepted.
fn video_ref(value: Option<&Value>) -> Option<VideoRef> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::Number(number) => match number.as_u64() {
            Some(0) => None,
            Some(id) => Some(VideoRef::Id(VideoId(id))),
            None if number.as_f64() == Some(0.0) => None,
            None => Some(VideoRef::Unknown),
        },
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(
            text.parse::<VideoId>()
                .map(VideoRef::Id)
                .unwrap_or(VideoRef::Unknown),
        ),
        _ => Some(VideoRef::Unknown),
    }
}

/// Reads a free-form text field such as `userId` or `platform`, treating the
/// same falsy values as [`video_ref`] as missing. Numbers are stringified.
fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn resolve(video: VideoRef) -> ApiResult<VideoId> {
    match video {
        VideoRef::Id(id) => Ok(id),
        VideoRef::Unknown => Err(ApiError::not_found(VIDEO_NOT_FOUND)),
    }
}

/// Unparseable bodies are treated like empty ones so they fail the presence
/// check with the route's own message.
fn body_or_default<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!("ignoring unreadable request body: {rejection}");
            T::default()
        }
    }
}

async fn list_videos(State(state): State<AppState>) -> Json<Vec<VideoRecord>> {
    Json(state.catalog.list_all())
}

async fn get_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoRecord>> {
    let id = id
        .parse::<VideoId>()
        .map_err(|_| ApiError::not_found(VIDEO_NOT_FOUND))?;
    let record = state.catalog.get_by_id(id)?;
    Ok(Json(record))
}

async fn like_video(
    State(state): State<AppState>,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> ApiResult<Json<LikeResponse>> {
    let request = body_or_default(payload);
    let (Some(video), Some(user)) = (
        video_ref(request.video_id.as_ref()),
        text_field(request.user_id.as_ref()),
    ) else {
        return Err(ApiError::bad_request(LIKE_FIELDS_REQUIRED));
    };

    let video = resolve(video)?;
    let user = UserId::new(user);
    let toggle = state.catalog.toggle_like(video, &user)?;
    debug!(
        video_id = %video,
        user_id = %user,
        liked = toggle.liked,
        likes = toggle.likes,
        "like toggled"
    );

    Ok(Json(LikeResponse {
        liked: toggle.liked,
        likes: toggle.likes,
    }))
}

async fn share_video(
    State(state): State<AppState>,
    payload: Result<Json<ShareRequest>, JsonRejection>,
) -> ApiResult<Json<ShareResponse>> {
    let request = body_or_default(payload);
    let video = video_ref(request.video_id.as_ref())
        .ok_or_else(|| ApiError::bad_request(SHARE_FIELDS_REQUIRED))?;

    let video = resolve(video)?;
    let shares = state.catalog.adjust_shares(video, 1)?;

    match text_field(request.platform.as_ref()) {
        Some(platform) => info!(video_id = %video, %platform, shares, "video shared"),
        None => info!(video_id = %video, shares, "video shared"),
    }

    Ok(Json(ShareResponse {
        success: true,
        message: SHARE_RECORDED.to_string(),
        shares,
    }))
}

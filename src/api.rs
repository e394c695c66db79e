use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::json;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::FeedError;
use crate::feed::{FeedPage, FeedRequest, FeedService};
use crate::source_weights::SourceWeightsConfig;
use crate::users::{anon_id, UserDirectory};

/// Set by the authentication layer in front of this service.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedService>,
    pub users: Arc<UserDirectory>,
    pub weights: Arc<RwLock<SourceWeightsConfig>>,
    /// `None` when weights are configured inline and cannot be reloaded.
    pub weights_path: Option<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/v1/posts", get(get_posts))
        .route("/debug/source-weight", get(debug_source_weight))
        .route("/admin/reload-source-weights", get(admin_reload_source_weights))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        let status = match self {
            FeedError::TokenNotFound => StatusCode::NOT_FOUND,
            FeedError::BadRequest(_) => StatusCode::BAD_REQUEST,
            FeedError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(serde::Deserialize)]
struct PostsQuery {
    #[serde(default)]
    page_token: Option<String>,
    /// Kept as text so a malformed value gets the JSON error body.
    #[serde(default)]
    count: Option<String>,
}

fn parse_count(raw: &str) -> Result<usize, FeedError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| FeedError::BadRequest(format!("count must be a positive integer, got '{raw}'")))
}

async fn get_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PostsQuery>,
) -> Result<Json<FeedPage>, FeedError> {
    let user_id = headers.get(USER_HEADER).and_then(|v| v.to_str().ok());
    let user = state.users.resolve(user_id)?;
    let count = q.count.as_deref().map(parse_count).transpose()?;

    let page = state
        .feed
        .get_posts(FeedRequest {
            page_token: q.page_token,
            count,
            user,
        })
        .await?;
    Ok(Json(page))
}

async fn debug_source_weight(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<String, FeedError> {
    let s = q.get("source").cloned().unwrap_or_default();
    let user = state.users.resolve(q.get("user").map(String::as_str))?;
    let w = {
        let g = state.weights.read().unwrap_or_else(PoisonError::into_inner);
        g.resolve(&s, user.as_deref())
    };
    Ok(match user {
        Some(u) => format!("source='{}' user={} -> weight={:.2}", s, anon_id(&u.id), w),
        None => format!("source='{}' -> weight={:.2}", s, w),
    })
}

async fn admin_reload_source_weights(State(state): State<AppState>) -> String {
    let Some(path) = &state.weights_path else {
        return "skipped: weights are configured inline".to_string();
    };
    let fresh = SourceWeightsConfig::load_from_file(path);
    let mut w = state.weights.write().unwrap_or_else(PoisonError::into_inner);
    *w = fresh;
    tracing::info!(path = %path.display(), "source weights reloaded");
    "reloaded".to_string()
}

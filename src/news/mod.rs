//! News API
//!
//! Small HTTP service in front of the relay. It serves static news data and
//! turns webhook calls into `pageAction` commands on the admin channel, so
//! viewers reload their news panel.
//!
//! # Endpoints
//!
//! - `GET /api/news` - Current news item
//! - `POST /api/news/webhook` - Trigger a news update on every viewer

mod admin_link;

pub use admin_link::{AdminLink, CommandSink, LinkError};

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::{ApiError, ApiResult};
use crate::config::NewsConfig;
use crate::websocket::AdminCommand;

/// News item served by `GET /api/news`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsData {
    pub title: String,
    pub description: String,
}

impl From<&NewsConfig> for NewsData {
    fn from(config: &NewsConfig) -> Self {
        Self {
            title: config.title.clone(),
            description: config.description.clone(),
        }
    }
}

/// Reply to a webhook call
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

/// Shared state of the news API
#[derive(Clone)]
pub struct NewsState {
    pub news: NewsData,
    pub commands: Arc<dyn CommandSink>,
}

impl NewsState {
    pub fn new(news: NewsData, commands: Arc<dyn CommandSink>) -> Self {
        Self { news, commands }
    }
}

/// Build the news API router
pub fn build_router(state: NewsState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/news", get(get_news))
        .route("/api/news/webhook", post(news_webhook))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// GET /api/news
async fn get_news(State(state): State<Arc<NewsState>>) -> Json<NewsData> {
    tracing::info!("GET /api/news - News data sent");
    Json(state.news.clone())
}

/// POST /api/news/webhook
///
/// Issues exactly one `pageAction` command per call.
async fn news_webhook(
    State(state): State<Arc<NewsState>>,
    body: String,
) -> ApiResult<Json<WebhookResponse>> {
    tracing::info!(body = %body, "POST /api/news/webhook - Webhook received");

    let command = AdminCommand::update_news(Utc::now());
    state.commands.send_command(&command).map_err(|e| match e {
        LinkError::NotConnected | LinkError::Stopped => ApiError::ServiceUnavailable(e.to_string()),
        LinkError::Encode(_) => ApiError::Internal(e.to_string()),
    })?;

    Ok(Json(WebhookResponse {
        success: true,
        message: "News update triggered".to_string(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}

//! Shared application state, route table and the standalone sentiment endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::cache::ScoreCache;
use crate::config::Config;
use crate::products;
use crate::reviews;
use crate::sentiment::{SentimentAnalyzer, SentimentScores};

pub struct AppState {
    pub pool: PgPool,
    pub analyzer: SentimentAnalyzer,
    pub scores: ScoreCache,
    pub config: Config,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self {
            pool,
            analyzer: SentimentAnalyzer::new(),
            scores: ScoreCache::new(config.score_cache_ttl),
            config,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SentimentRequest {
    pub text: String,
}

#[utoipa::path(
    post,
    path = "/sentiment",
    request_body = SentimentRequest,
    responses((status = 200, description = "Polarity of the text", body = SentimentScores)),
    tag = "sentiment"
)]
pub async fn analyze_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SentimentRequest>,
) -> Result<Json<SentimentScores>, StatusCode> {
    Ok(Json(state.analyzer.polarity_scores(&req.text)))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/products", get(products::list_catalog).post(products::create_product))
        .route("/products/:id", get(products::get_product).patch(products::update_product))
        .route("/products/:id/cart", post(products::add_to_cart))
        .route("/products/:id/popularity", get(products::get_popularity))
        .route(
            "/products/:id/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route("/reviews/:id", patch(reviews::update_review))
        .route("/sentiment", post(analyze_text))
        .with_state(state)
}

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::engine::HotSearchEngine;
use crate::filter::FilterCriteria;
use crate::source::{parse_source_list, Source};
use crate::types::{CacheStat, TrendItem};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<HotSearchEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hotsearch", get(get_hotsearch))
        .route("/hotsearch/platforms", get(get_platforms))
        .route("/hotsearch/cache/stats", get(cache_stats))
        .route("/hotsearch/cache/clear", get(clear_cache))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    timestamp: String,
    service: &'static str,
}

async fn health() -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: "trendmonitor",
    })
}

/// Query string is kept stringly typed: bad numbers are ignored, not rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotSearchQuery {
    platforms: Option<String>,
    min_score: Option<String>,
    keyword: Option<String>,
    force_refresh: Option<String>,
}

async fn get_hotsearch(
    State(state): State<AppState>,
    Query(q): Query<HotSearchQuery>,
) -> Json<Vec<TrendItem>> {
    // Present-but-unknown platform names yield an empty list, not "all".
    let platforms = q.platforms.as_deref().map(parse_source_list);
    let force = q.force_refresh.as_deref() == Some("true");

    let items = match &platforms {
        Some(list) => state.engine.fetch_many(list, force).await,
        None => state.engine.fetch_all(force).await,
    };

    let criteria = FilterCriteria {
        sources: platforms,
        min_score: q.min_score.as_deref().and_then(|s| s.trim().parse().ok()),
        keyword: q.keyword,
    };
    Json(HotSearchEngine::filter(items, &criteria))
}

async fn get_platforms() -> Json<Vec<Source>> {
    Json(HotSearchEngine::list_known_sources())
}

async fn cache_stats(State(state): State<AppState>) -> Json<BTreeMap<Source, CacheStat>> {
    Json(state.engine.cache_stats())
}

#[derive(Serialize)]
struct MessageOut {
    message: &'static str,
}

async fn clear_cache(State(state): State<AppState>) -> Json<MessageOut> {
    state.engine.clear_cache();
    Json(MessageOut {
        message: "Cache cleared successfully",
    })
}

use crate::api::cache::StatsCache;
use crate::config::MAX_WINDOW_HOURS;
use crate::counter::VisitCounter;
use crate::error::{AppError, AppResult};
use crate::identity;
use crate::types::{
    CounterErrorResponse, CounterResponse, HealthResponse, StatsQueryParams, StatsResponse,
};
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub struct CounterState {
    pub counter: VisitCounter,
    pub stats_cache: StatsCache,
    pub recent_window_hours: u64,
    pub trust_proxy_headers: bool,
}

impl CounterState {
    fn recent_window(&self) -> Duration {
        Duration::from_secs(self.recent_window_hours.min(MAX_WINDOW_HOURS) * 3600)
    }
}

async fn count_visit(state: &CounterState, visitor_id: &str) -> AppResult<CounterResponse> {
    let now = chrono::Utc::now().timestamp_millis();
    let outcome = state.counter.record_visit(visitor_id, now).await?;
    let stats = state
        .counter
        .aggregate_stats(now, state.recent_window())
        .await?;

    Ok(CounterResponse {
        count: stats.total_visits,
        visit_count: outcome.visit_count,
        is_new_visitor: outcome.is_new_visitor,
        total_unique_visitors: stats.total_unique,
        total_visits: stats.total_visits,
        status: "success",
    })
}

/// GET|POST /api/visitor_counter - Count this visitor and return totals.
///
/// Storage failures never fail the request: the body carries `count: 0`
/// and an `error_type` instead.
pub async fn visitor_counter(State(state): State<Arc<CounterState>>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let visitor_id =
        identity::visitor_id_for_request(request.headers(), peer, state.trust_proxy_headers);

    match count_visit(&state, &visitor_id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, visitor_id = %visitor_id, "visit not counted");
            Json(CounterErrorResponse {
                count: 0,
                error: "visit could not be recorded".to_string(),
                error_type: e.kind(),
            })
            .into_response()
        }
    }
}

/// GET /api/stats - Aggregate visitor stats over a trailing window.
pub async fn stats(
    State(state): State<Arc<CounterState>>,
    Query(params): Query<StatsQueryParams>,
) -> AppResult<Json<StatsResponse>> {
    let hours = match params.hours {
        Some(hours) if hours < 1 => {
            return Err(AppError::Validation("hours must be at least 1".to_string()));
        }
        Some(hours) => (hours as u64).min(MAX_WINDOW_HOURS),
        None => state.recent_window_hours.min(MAX_WINDOW_HOURS),
    };

    if let Some(cached) = state.stats_cache.get(hours) {
        return Ok(Json(cached));
    }

    let now = chrono::Utc::now().timestamp_millis();
    let window = Duration::from_secs(hours * 3600);
    let stats = state.counter.aggregate_stats(now, window).await?;

    let response = StatsResponse {
        total_unique_visitors: stats.total_unique,
        total_visits: stats.total_visits,
        recent_visitors: stats.recent_window_count,
        window_hours: hours,
    };
    state.stats_cache.insert(hours, response.clone());
    Ok(Json(response))
}

/// GET /health - Store reachability.
pub async fn health(State(state): State<Arc<CounterState>>) -> Json<HealthResponse> {
    let store = state.counter.store();
    let store_ok = match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, backend = store.name(), "store health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if store_ok {
            "ok".into()
        } else {
            "degraded".into()
        },
        store_ok,
    })
}

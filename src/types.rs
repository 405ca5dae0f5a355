use serde::{Deserialize, Serialize};

/// Persisted per-visitor state. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub visitor_id: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub visit_count: i64,
}

impl VisitorRecord {
    /// Record for a visitor observed for the first time.
    pub fn first_visit(visitor_id: &str, now: i64) -> Self {
        Self {
            visitor_id: visitor_id.to_string(),
            first_seen: now,
            last_seen: now,
            visit_count: 1,
        }
    }

    /// The record after one more counted visit at `now`.
    pub fn next_visit(&self, now: i64) -> Self {
        Self {
            visitor_id: self.visitor_id.clone(),
            first_seen: self.first_seen,
            last_seen: now,
            visit_count: self.visit_count + 1,
        }
    }
}

/// Result of a single `record_visit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitOutcome {
    pub visit_count: i64,
    pub is_new_visitor: bool,
}

/// Summary computed on demand over every visitor record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub total_unique: i64,
    pub total_visits: i64,
    pub recent_window_count: i64,
}

/// Body of a successful counter response.
#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub count: i64,
    pub visit_count: i64,
    pub is_new_visitor: bool,
    pub total_unique_visitors: i64,
    pub total_visits: i64,
    pub status: &'static str,
}

/// Body returned by the counter endpoint when the store fails.
#[derive(Debug, Serialize)]
pub struct CounterErrorResponse {
    pub count: i64,
    pub error: String,
    pub error_type: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_ok: bool,
}

/// Query params for the stats endpoint.
#[derive(Debug, Deserialize)]
pub struct StatsQueryParams {
    pub hours: Option<i64>,
}

/// Stats overview.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_unique_visitors: i64,
    pub total_visits: i64,
    pub recent_visitors: i64,
    pub window_hours: u64,
}

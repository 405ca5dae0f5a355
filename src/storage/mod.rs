//! Persistence for visitor records.
//!
//! Every backend implements [`VisitorStore`]. The counting policy only relies
//! on `insert` refusing to overwrite and `update_if` acting as a
//! compare-and-swap, so backends are interchangeable.

pub mod memory;
pub mod migrations;
pub mod sqlite;

use crate::error::AppResult;
use crate::types::{AggregateStats, VisitorRecord};
use async_trait::async_trait;

#[async_trait]
pub trait VisitorStore: Send + Sync + 'static {
    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;

    async fn get(&self, visitor_id: &str) -> AppResult<Option<VisitorRecord>>;

    /// Insert a new record. Returns `false` without writing when a record
    /// with the same `visitor_id` already exists.
    async fn insert(&self, record: &VisitorRecord) -> AppResult<bool>;

    /// Replace `expected` with `updated` only if the stored record still
    /// equals `expected`. Returns whether the write happened.
    async fn update_if(
        &self,
        expected: &VisitorRecord,
        updated: &VisitorRecord,
    ) -> AppResult<bool>;

    /// Aggregate over all records; `recent_window_count` counts records with
    /// `last_seen >= since`.
    async fn stats(&self, since: i64) -> AppResult<AggregateStats>;

    /// Cheap reachability check.
    async fn ping(&self) -> AppResult<()>;
}

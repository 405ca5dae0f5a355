use crate::error::{AppError, AppResult};
use crate::storage::VisitorStore;
use crate::types::{AggregateStats, VisitOutcome, VisitorRecord};
use std::sync::Arc;
use std::time::Duration;

/// Minimum time between two counted visits of the same visitor.
pub const VISIT_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Read/CAS rounds before a contended `record_visit` gives up.
const MAX_ATTEMPTS: usize = 8;

/// Deduplicating visit counter over a [`VisitorStore`].
///
/// Updates are optimistic: the record is read, the cooldown decision is made
/// against it, and the write only lands if the record is unchanged. A lost
/// race re-reads and decides again, so concurrent requests for one visitor
/// never double count.
#[derive(Clone)]
pub struct VisitCounter {
    store: Arc<dyn VisitorStore>,
}

impl VisitCounter {
    pub fn new(store: Arc<dyn VisitorStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn VisitorStore> {
        &self.store
    }

    /// Count a visit from `visitor_id` at `now` (unix millis).
    pub async fn record_visit(&self, visitor_id: &str, now: i64) -> AppResult<VisitOutcome> {
        if visitor_id.is_empty() {
            return Err(AppError::Validation("visitor_id is required".to_string()));
        }

        let cooldown_ms = VISIT_COOLDOWN.as_millis() as i64;

        for attempt in 0..MAX_ATTEMPTS {
            match self.store.get(visitor_id).await? {
                None => {
                    let record = VisitorRecord::first_visit(visitor_id, now);
                    if self.store.insert(&record).await? {
                        tracing::debug!(visitor_id, "new visitor");
                        return Ok(VisitOutcome {
                            visit_count: 1,
                            is_new_visitor: true,
                        });
                    }
                }
                Some(current) => {
                    // A clock that went backwards also lands here
                    if now - current.last_seen < cooldown_ms {
                        return Ok(VisitOutcome {
                            visit_count: current.visit_count,
                            is_new_visitor: false,
                        });
                    }

                    let next = current.next_visit(now);
                    if self.store.update_if(&current, &next).await? {
                        tracing::debug!(
                            visitor_id,
                            visit_count = next.visit_count,
                            "returning visitor"
                        );
                        return Ok(VisitOutcome {
                            visit_count: next.visit_count,
                            is_new_visitor: false,
                        });
                    }
                }
            }

            tracing::debug!(
                visitor_id,
                attempt,
                "visitor record changed concurrently, retrying"
            );
        }

        tracing::warn!(
            visitor_id,
            attempts = MAX_ATTEMPTS,
            "gave up on contended visitor record"
        );
        Err(AppError::Conflict(format!(
            "visitor record kept changing after {MAX_ATTEMPTS} attempts"
        )))
    }

    /// Aggregate stats; the recent count covers `window` before `now` (unix millis).
    pub async fn aggregate_stats(&self, now: i64, window: Duration) -> AppResult<AggregateStats> {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let since = now.saturating_sub(window_ms);
        self.store.stats(since).await
    }
}

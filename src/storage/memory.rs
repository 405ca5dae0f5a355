use crate::error::AppResult;
use crate::storage::VisitorStore;
use crate::types::{AggregateStats, VisitorRecord};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-local store. Records live until the process exits.
///
/// Each key's entry lock makes `insert` and `update_if` atomic per visitor.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, VisitorRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VisitorStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, visitor_id: &str) -> AppResult<Option<VisitorRecord>> {
        Ok(self.records.get(visitor_id).map(|r| r.value().clone()))
    }

    async fn insert(&self, record: &VisitorRecord) -> AppResult<bool> {
        match self.records.entry(record.visitor_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn update_if(
        &self,
        expected: &VisitorRecord,
        updated: &VisitorRecord,
    ) -> AppResult<bool> {
        match self.records.get_mut(&expected.visitor_id) {
            Some(mut current) if *current == *expected => {
                *current = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self, since: i64) -> AppResult<AggregateStats> {
        let mut stats = AggregateStats::default();
        for entry in self.records.iter() {
            let record = entry.value();
            stats.total_unique += 1;
            stats.total_visits += record.visit_count;
            if record.last_seen >= since {
                stats.recent_window_count += 1;
            }
        }
        Ok(stats)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_refuses_to_overwrite() {
        let store = MemoryStore::new();
        let first = VisitorRecord::first_visit("v1", 1000);
        assert!(store.insert(&first).await.unwrap());

        let second = VisitorRecord::first_visit("v1", 2000);
        assert!(!store.insert(&second).await.unwrap());

        let stored = store.get("v1").await.unwrap().unwrap();
        assert_eq!(stored.first_seen, 1000);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_if_requires_matching_record() {
        let store = MemoryStore::new();
        let record = VisitorRecord::first_visit("v1", 1000);
        store.insert(&record).await.unwrap();

        let next = record.next_visit(5000);
        assert!(store.update_if(&record, &next).await.unwrap());

        // Stale expectation no longer matches
        let stale_next = record.next_visit(6000);
        assert!(!store.update_if(&record, &stale_next).await.unwrap());

        let stored = store.get("v1").await.unwrap().unwrap();
        assert_eq!(stored, next);
    }

    #[tokio::test]
    async fn test_update_if_missing_record() {
        let store = MemoryStore::new();
        let record = VisitorRecord::first_visit("ghost", 1000);
        assert!(!store
            .update_if(&record, &record.next_visit(2000))
            .await
            .unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stats_empty_and_populated() {
        let store = MemoryStore::new();
        assert_eq!(store.stats(0).await.unwrap(), AggregateStats::default());

        let a = VisitorRecord::first_visit("a", 1000);
        store.insert(&a).await.unwrap();
        store.update_if(&a, &a.next_visit(9000)).await.unwrap();
        store
            .insert(&VisitorRecord::first_visit("b", 2000))
            .await
            .unwrap();

        let stats = store.stats(5000).await.unwrap();
        assert_eq!(stats.total_unique, 2);
        assert_eq!(stats.total_visits, 3);
        assert_eq!(stats.recent_window_count, 1);
    }
}

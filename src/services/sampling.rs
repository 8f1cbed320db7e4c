use std::sync::Arc;

use uuid::Uuid;

use crate::db::{SamplingStore, StoreError};
use crate::mastery::types::{SampledOutcome, SamplingSummary};

/// Appends one immutable summary per recorded batch. Summaries are never
/// merged or rewritten.
pub struct SamplingRecorder<S> {
    store: Arc<S>,
}

impl<S: SamplingStore> SamplingRecorder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn summarize(
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        timestamp: i64,
        outcomes: Vec<SampledOutcome>,
    ) -> SamplingSummary {
        SamplingSummary {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            list_id: list_id.map(str::to_string),
            app_id: app_id.map(str::to_string),
            timestamp,
            outcomes,
        }
    }

    pub async fn record(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        timestamp: i64,
        outcomes: Vec<SampledOutcome>,
    ) -> Result<SamplingSummary, StoreError> {
        let summary = Self::summarize(user_id, list_id, app_id, timestamp, outcomes);
        self.append(&summary).await?;
        Ok(summary)
    }

    pub async fn append(&self, summary: &SamplingSummary) -> Result<(), StoreError> {
        self.store.append(summary).await?;
        tracing::debug!(
            user_id = %summary.user_id,
            sampling_id = %summary.id,
            outcomes = summary.outcomes.len(),
            correct = summary.correct_count(),
            "sampling recorded"
        );
        Ok(())
    }

    /// The `n` most recent summaries for the key, newest first.
    pub async fn recent(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        n: usize,
    ) -> Result<Vec<SamplingSummary>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.store.recent(user_id, list_id, app_id, n).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn outcomes(n: usize) -> Vec<SampledOutcome> {
        (0..n)
            .map(|i| SampledOutcome {
                item_id: format!("w{i}"),
                outcome: i % 2 == 0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_record_inserts_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let recorder = SamplingRecorder::new(Arc::clone(&store));
        let summary = recorder
            .record("u1", Some("l1"), Some("a1"), 100, outcomes(3))
            .await
            .unwrap();
        assert_eq!(store.sampling_count(), 1);
        assert_eq!(summary.outcomes.len(), 3);
        assert_eq!(summary.correct_count(), 2);
    }

    #[tokio::test]
    async fn test_same_key_never_merges() {
        let store = Arc::new(MemoryStore::new());
        let recorder = SamplingRecorder::new(Arc::clone(&store));
        let a = recorder.record("u1", Some("l1"), Some("a1"), 100, outcomes(1)).await.unwrap();
        let b = recorder.record("u1", Some("l1"), Some("a1"), 100, outcomes(2)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.sampling_count(), 2);
    }

    #[tokio::test]
    async fn test_recent_returns_newest_n() {
        let store = Arc::new(MemoryStore::new());
        let recorder = SamplingRecorder::new(Arc::clone(&store));
        for ts in [1, 5, 3, 2, 4] {
            recorder.record("u1", Some("l1"), Some("a1"), ts, outcomes(1)).await.unwrap();
        }
        let recent = recorder.recent("u1", Some("l1"), Some("a1"), 3).await.unwrap();
        let stamps: Vec<i64> = recent.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![5, 4, 3]);
        assert!(recorder.recent("u1", Some("l1"), Some("a1"), 0).await.unwrap().is_empty());
    }
}

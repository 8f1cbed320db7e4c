use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;

use super::config::MasteryConfig;
use super::evaluator::{classify, score, MasteryFilter};
use super::locks::KeyedLocks;
use super::scheduler::{AdaptiveScheduler, Schedulable};
use super::types::{
    BatchReceipt, MasteryState, OutcomeBatch, OutcomeEvent, SampledOutcome, SamplingSummary, StatKey,
    StatRecord, SubjectKind, ValidOutcome,
};
use super::updater;
use super::EngineError;
use crate::db::{SamplingStore, StatStore, StoreError};
use crate::services::sampling::SamplingRecorder;
use crate::services::stats_query::{StatsPage, StatsQueryService, StatsRequest};

pub const POINTS_PER_CORRECT: i64 = 10;

/// Entry point for the surrounding service. Sole writer of stat records.
pub struct MasteryEngine<S> {
    store: Arc<S>,
    config: MasteryConfig,
    scheduler: AdaptiveScheduler,
    locks: KeyedLocks<StatKey>,
    samplings: SamplingRecorder<S>,
    stats: StatsQueryService<S>,
}

impl<S> MasteryEngine<S>
where
    S: StatStore + SamplingStore,
{
    pub fn new(store: Arc<S>, config: MasteryConfig) -> Self {
        let mut scheduler = AdaptiveScheduler::new(config.weight_floor);
        if let Some(seed) = config.scheduler_seed {
            scheduler = scheduler.with_seed(seed);
        }

        Self {
            samplings: SamplingRecorder::new(Arc::clone(&store)),
            stats: StatsQueryService::new(Arc::clone(&store), config.thresholds),
            locks: KeyedLocks::new(),
            scheduler,
            store,
            config,
        }
    }

    pub fn config(&self) -> &MasteryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Applies a batch event by event, in order, then appends one sampling
    /// summary. A failing event stops the batch; events before it remain
    /// applied.
    pub async fn record_outcomes(&self, user_id: &str, batch: OutcomeBatch) -> Result<BatchReceipt, EngineError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(EngineError::Validation("userId is required".to_string()));
        }

        let batch_timestamp = match batch.timestamp {
            Some(ts) if ts.is_finite() && ts >= 0.0 => Some(ts.floor() as i64),
            Some(_) => {
                return Err(EngineError::Validation(
                    "batch timestamp must be a non-negative epoch second".to_string(),
                ))
            }
            None => None,
        };

        let mut applied = 0usize;
        let mut points_earned = 0i64;
        let mut latest = batch_timestamp;
        let mut sampled = Vec::with_capacity(batch.events.len());

        for (index, event) in batch.events.iter().enumerate() {
            let (outcome, keys) = self
                .prepare(user_id, event, &batch)
                .map_err(|err| EngineError::at_event(index, applied, err))?;

            try_join_all(keys.into_iter().map(|key| self.apply(key, &outcome)))
                .await
                .map_err(|err| {
                    tracing::error!(user_id, index, error = %err, "failed to apply outcome");
                    EngineError::at_event(index, applied, err)
                })?;

            applied += 1;
            if outcome.outcome {
                points_earned += POINTS_PER_CORRECT;
            }
            if batch_timestamp.is_none() {
                latest = latest.max(Some(outcome.timestamp));
            }
            sampled.push(SampledOutcome {
                item_id: outcome.item_id,
                outcome: outcome.outcome,
            });
        }

        let sampling_id = match latest {
            Some(timestamp) if !sampled.is_empty() => {
                let summary = SamplingRecorder::<S>::summarize(
                    user_id,
                    batch.list_id.as_deref(),
                    batch.app_id.as_deref(),
                    timestamp,
                    sampled,
                );
                self.with_retry("append_sampling", || self.samplings.append(&summary))
                    .await
                    .map_err(|source| EngineError::Sampling { applied, source })?;
                Some(summary.id)
            }
            _ => None,
        };

        tracing::info!(user_id, applied, points_earned, "outcomes recorded");

        Ok(BatchReceipt {
            applied,
            points_earned,
            sampling_id,
        })
    }

    pub async fn score_of(&self, user_id: &str, item_id: &str) -> Result<Option<f64>, EngineError> {
        let record = self.stat(&StatKey::item(user_id, item_id)).await?;
        Ok(record.as_ref().map(|r| score(Some(r))))
    }

    pub async fn classification_of(&self, user_id: &str, item_id: &str) -> Result<MasteryState, EngineError> {
        let record = self.stat(&StatKey::item(user_id, item_id)).await?;
        Ok(classify(record.as_ref(), &self.config.thresholds))
    }

    pub async fn stat(&self, key: &StatKey) -> Result<Option<StatRecord>, EngineError> {
        Ok(self.with_retry("get", || self.store.get(key)).await?)
    }

    /// Returns `items` reordered so unmastered items tend to come first.
    pub async fn schedule_items<T>(&self, user_id: &str, items: Vec<T>) -> Result<Vec<T>, EngineError>
    where
        T: Schedulable + Send,
    {
        if items.len() <= 1 {
            return Ok(items);
        }

        let ids: Vec<String> = items.iter().map(|item| item.item_id().to_string()).collect();
        let stats = self
            .with_retry("get_many", || self.store.get_many(user_id, SubjectKind::Item, &ids))
            .await?;

        tracing::debug!(user_id, items = items.len(), known = stats.len(), "scheduling items");
        Ok(self.scheduler.order(items, &stats))
    }

    pub async fn query_stats(&self, user_id: &str, request: &StatsRequest) -> Result<StatsPage, EngineError> {
        Ok(self.stats.query(user_id, request).await?)
    }

    pub async fn recent_samplings(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        n: usize,
    ) -> Result<Vec<SamplingSummary>, EngineError> {
        Ok(self.samplings.recent(user_id, list_id, app_id, n).await?)
    }

    pub async fn count_mastered(&self, user_id: &str, kind: SubjectKind) -> Result<usize, EngineError> {
        Ok(self.stats.count(user_id, kind, MasteryFilter::Mastered).await?)
    }

    /// Validates one event against its batch and lists the records it feeds.
    fn prepare(
        &self,
        user_id: &str,
        event: &OutcomeEvent,
        batch: &OutcomeBatch,
    ) -> Result<(ValidOutcome, Vec<StatKey>), EngineError> {
        if let Some(owner) = event.user_id.as_deref() {
            if owner != user_id {
                return Err(EngineError::Validation(format!(
                    "event belongs to user {owner}, not {user_id}"
                )));
            }
        }

        let outcome = OutcomeEvent {
            timestamp: event.timestamp.or(batch.timestamp),
            ..event.clone()
        }
        .validate()?;

        let mut keys = vec![StatKey::item(user_id, outcome.item_id.clone())];
        if let Some(list_id) = event.list_id.as_deref().or(batch.list_id.as_deref()) {
            keys.push(StatKey::new(user_id, list_id, SubjectKind::List));
        }
        if let Some(standard) = event.standard.as_deref() {
            keys.push(StatKey::new(user_id, standard, SubjectKind::Standard));
        }
        Ok((outcome, keys))
    }

    /// Read-modify-write of one record under its key lock.
    async fn apply(&self, key: StatKey, outcome: &ValidOutcome) -> Result<StatRecord, EngineError> {
        let _guard = self.locks.lock(&key).await;

        let existing = self.with_retry("get", || self.store.get(&key)).await?;
        let next = updater::fold(existing.as_ref(), &key, outcome, self.config.decay);
        self.with_retry("put", || self.store.put(&next)).await?;

        tracing::debug!(
            key = %key,
            total = next.total_outcomes,
            average = next.average,
            volatility = next.volatility,
            "stat updated"
        );
        Ok(next)
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let policy = self.config.storage_retry;
        let mut attempt = 1u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                    tracing::warn!(op, attempt, error = %err, "transient store failure, retrying");
                    tokio::time::sleep(policy.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

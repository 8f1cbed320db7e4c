use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::{SamplingStore, SortDir, SortField, StatQuery, StatStore, StoreError};
use crate::mastery::types::{SamplingSummary, StatKey, StatRecord, SubjectKind};

#[derive(Debug, Default)]
struct StatTable {
    index: HashMap<StatKey, usize>,
    rows: Vec<StatRecord>,
}

/// Process-local store. Rows keep insertion order, which is the natural
/// order used when a query is unsorted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stats: RwLock<StatTable>,
    samplings: RwLock<Vec<SamplingSummary>>,
    failing_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` writes fail with a transient error.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn stat_count(&self) -> usize {
        self.stats.read().rows.len()
    }

    pub fn sampling_count(&self) -> usize {
        self.samplings.read().len()
    }

    fn check_write(&self) -> Result<(), StoreError> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(StoreError::Unavailable("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl StatStore for MemoryStore {
    async fn get(&self, key: &StatKey) -> Result<Option<StatRecord>, StoreError> {
        let table = self.stats.read();
        Ok(table.index.get(key).map(|&idx| table.rows[idx].clone()))
    }

    async fn get_many(
        &self,
        user_id: &str,
        kind: SubjectKind,
        subject_ids: &[String],
    ) -> Result<HashMap<String, StatRecord>, StoreError> {
        let table = self.stats.read();
        let mut out = HashMap::with_capacity(subject_ids.len());
        for subject_id in subject_ids {
            let key = StatKey::new(user_id, subject_id.clone(), kind);
            if let Some(&idx) = table.index.get(&key) {
                out.insert(subject_id.clone(), table.rows[idx].clone());
            }
        }
        Ok(out)
    }

    async fn put(&self, record: &StatRecord) -> Result<(), StoreError> {
        self.check_write()?;
        let mut table = self.stats.write();
        let key = record.key();
        match table.index.get(&key).copied() {
            Some(idx) => table.rows[idx] = record.clone(),
            None => {
                let idx = table.rows.len();
                table.rows.push(record.clone());
                table.index.insert(key, idx);
            }
        }
        Ok(())
    }

    async fn query(&self, query: &StatQuery) -> Result<Vec<StatRecord>, StoreError> {
        let mut matched: Vec<StatRecord> = {
            let table = self.stats.read();
            table.rows.iter().filter(|r| query.matches(r)).cloned().collect()
        };

        if let Some(sort) = query.sort {
            if sort.field.column(query.kind).is_some() {
                // stable: ties keep natural order in both directions
                matched.sort_by(|a, b| {
                    let ord = compare_field(sort.field, a, b);
                    match sort.dir {
                        SortDir::Asc => ord,
                        SortDir::Desc => ord.reverse(),
                    }
                });
            }
        }

        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count(&self, query: &StatQuery) -> Result<usize, StoreError> {
        let table = self.stats.read();
        Ok(table.rows.iter().filter(|r| query.matches(r)).count())
    }
}

fn compare_field(field: SortField, a: &StatRecord, b: &StatRecord) -> CmpOrdering {
    match field {
        SortField::TotalOutcomes => a.total_outcomes.cmp(&b.total_outcomes),
        SortField::Average => a.average.total_cmp(&b.average),
        SortField::Volatility => a.volatility.total_cmp(&b.volatility),
        SortField::Duration => a.duration.total_cmp(&b.duration),
        SortField::Subject(_) => a.subject_id.cmp(&b.subject_id),
    }
}

impl SamplingStore for MemoryStore {
    async fn append(&self, summary: &SamplingSummary) -> Result<(), StoreError> {
        self.check_write()?;
        self.samplings.write().push(summary.clone());
        Ok(())
    }

    async fn recent(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SamplingSummary>, StoreError> {
        let samplings = self.samplings.read();
        let mut matched: Vec<(usize, &SamplingSummary)> = samplings
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.user_id == user_id && s.list_id.as_deref() == list_id && s.app_id.as_deref() == app_id
            })
            .collect();
        // newest first; later appends win timestamp ties
        matched.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(b.0.cmp(&a.0)));
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

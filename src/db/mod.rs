pub mod config;
pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::future::Future;

use serde::Serialize;
use thiserror::Error;

use crate::db::config::{DbConfig, StoreKind};
use crate::mastery::config::MasteryThresholds;
use crate::mastery::evaluator::MasteryFilter;
use crate::mastery::types::{SamplingSummary, StatKey, StatRecord, SubjectKind};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Sql(sqlx::Error::PoolTimedOut) | StoreError::Sql(sqlx::Error::Io(_)) => true,
            StoreError::Sql(sqlx::Error::Database(db)) => {
                let message = db.message().to_ascii_lowercase();
                message.contains("locked") || message.contains("busy")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    TotalOutcomes,
    Average,
    Volatility,
    Duration,
    /// Orders by subject id, but only for records of the named kind.
    Subject(SubjectKind),
}

impl SortField {
    /// Unrecognised keys yield `None`, which leaves records in store order.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value?.trim() {
            "total" => Some(SortField::TotalOutcomes),
            "avg" => Some(SortField::Average),
            "vol" => Some(SortField::Volatility),
            "dur" => Some(SortField::Duration),
            "standards" => Some(SortField::Subject(SubjectKind::Standard)),
            "lists" => Some(SortField::Subject(SubjectKind::List)),
            "items" => Some(SortField::Subject(SubjectKind::Item)),
            _ => None,
        }
    }

    /// `None` when the field does not exist on records of `kind`.
    pub fn column(&self, kind: SubjectKind) -> Option<&'static str> {
        match self {
            SortField::TotalOutcomes => Some("totalOutcomes"),
            SortField::Average => Some("average"),
            SortField::Volatility => Some("volatility"),
            SortField::Duration => Some("duration"),
            SortField::Subject(k) if *k == kind => Some("subjectId"),
            SortField::Subject(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    /// Anything other than `asc` sorts descending.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("asc") => SortDir::Asc,
            _ => SortDir::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSort {
    pub field: SortField,
    pub dir: SortDir,
}

#[derive(Debug, Clone)]
pub struct StatQuery {
    pub user_id: String,
    pub kind: SubjectKind,
    pub filter: MasteryFilter,
    pub thresholds: MasteryThresholds,
    pub subject_ids: Option<Vec<String>>,
    pub sort: Option<StatSort>,
    pub offset: usize,
    pub limit: usize,
}

impl StatQuery {
    pub fn new(user_id: impl Into<String>, kind: SubjectKind, thresholds: MasteryThresholds) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            filter: MasteryFilter::All,
            thresholds,
            subject_ids: None,
            sort: None,
            offset: 0,
            limit: usize::MAX,
        }
    }

    pub fn matches(&self, record: &StatRecord) -> bool {
        record.user_id == self.user_id
            && record.subject_kind == self.kind
            && self
                .subject_ids
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| *id == record.subject_id))
            && self.filter.matches(record, &self.thresholds)
    }
}

/// Keyed persistent stat records. Upserts keep a record's original position
/// in the store's natural order.
pub trait StatStore: Send + Sync {
    fn get(&self, key: &StatKey) -> impl Future<Output = Result<Option<StatRecord>, StoreError>> + Send;

    fn get_many(
        &self,
        user_id: &str,
        kind: SubjectKind,
        subject_ids: &[String],
    ) -> impl Future<Output = Result<HashMap<String, StatRecord>, StoreError>> + Send;

    fn put(&self, record: &StatRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn query(&self, query: &StatQuery) -> impl Future<Output = Result<Vec<StatRecord>, StoreError>> + Send;

    fn count(&self, query: &StatQuery) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

/// Append-only sampling summaries.
pub trait SamplingStore: Send + Sync {
    fn append(&self, summary: &SamplingSummary) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Newest first, at most `limit` entries.
    fn recent(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SamplingSummary>, StoreError>> + Send;
}

/// Store selected at start-up.
pub enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl StoreBackend {
    pub async fn open(config: &DbConfig) -> Result<Self, StoreError> {
        match config.kind {
            StoreKind::Memory => {
                tracing::info!("using in-memory stat store");
                Ok(StoreBackend::Memory(MemoryStore::new()))
            }
            StoreKind::Sqlite => {
                let store = SqliteStore::open(&config.sqlite).await?;
                tracing::info!(path = %config.sqlite.path.display(), "using sqlite stat store");
                Ok(StoreBackend::Sqlite(store))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory(_) => "memory",
            StoreBackend::Sqlite(_) => "sqlite",
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(_) => Ok(()),
            StoreBackend::Sqlite(store) => store.ping().await,
        }
    }
}

impl StatStore for StoreBackend {
    async fn get(&self, key: &StatKey) -> Result<Option<StatRecord>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.get(key).await,
            StoreBackend::Sqlite(s) => s.get(key).await,
        }
    }

    async fn get_many(
        &self,
        user_id: &str,
        kind: SubjectKind,
        subject_ids: &[String],
    ) -> Result<HashMap<String, StatRecord>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.get_many(user_id, kind, subject_ids).await,
            StoreBackend::Sqlite(s) => s.get_many(user_id, kind, subject_ids).await,
        }
    }

    async fn put(&self, record: &StatRecord) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(s) => s.put(record).await,
            StoreBackend::Sqlite(s) => s.put(record).await,
        }
    }

    async fn query(&self, query: &StatQuery) -> Result<Vec<StatRecord>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.query(query).await,
            StoreBackend::Sqlite(s) => s.query(query).await,
        }
    }

    async fn count(&self, query: &StatQuery) -> Result<usize, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.count(query).await,
            StoreBackend::Sqlite(s) => s.count(query).await,
        }
    }
}

impl SamplingStore for StoreBackend {
    async fn append(&self, summary: &SamplingSummary) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(s) => s.append(summary).await,
            StoreBackend::Sqlite(s) => s.append(summary).await,
        }
    }

    async fn recent(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SamplingSummary>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.recent(user_id, list_id, app_id, limit).await,
            StoreBackend::Sqlite(s) => s.recent(user_id, list_id, app_id, limit).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_parse() {
        assert_eq!(SortField::parse(Some("avg")), Some(SortField::Average));
        assert_eq!(
            SortField::parse(Some("lists")),
            Some(SortField::Subject(SubjectKind::List))
        );
        assert_eq!(SortField::parse(Some("score")), None);
        assert_eq!(SortField::parse(None), None);
    }

    #[test]
    fn test_subject_sort_only_applies_to_its_kind() {
        let field = SortField::Subject(SubjectKind::Item);
        assert_eq!(field.column(SubjectKind::Item), Some("subjectId"));
        assert_eq!(field.column(SubjectKind::List), None);
        assert_eq!(SortField::Average.column(SubjectKind::List), Some("average"));
    }

    #[test]
    fn test_sort_dir_defaults_to_desc() {
        assert_eq!(SortDir::parse(Some("asc")), SortDir::Asc);
        assert_eq!(SortDir::parse(Some("desc")), SortDir::Desc);
        assert_eq!(SortDir::parse(Some("sideways")), SortDir::Desc);
        assert_eq!(SortDir::parse(None), SortDir::Desc);
    }

    #[test]
    fn test_unavailable_is_transient() {
        assert!(StoreError::Unavailable("down".to_string()).is_transient());
        assert!(!StoreError::Decode("bad kind".to_string()).is_transient());
    }
}

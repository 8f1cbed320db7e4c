use std::sync::Arc;

use serde::Serialize;

use crate::db::{SortDir, SortField, StatQuery, StatSort, StatStore, StoreError};
use crate::mastery::config::MasteryThresholds;
use crate::mastery::evaluator::MasteryFilter;
use crate::mastery::types::{StatRecord, SubjectKind};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 200;
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_SORT: &str = "items";

/// Raw query parameters; unrecognised values fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct StatsRequest {
    pub kind: Option<SubjectKind>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub sort_dir: Option<String>,
    pub page_size: Option<i64>,
    pub page: Option<i64>,
    pub subject_ids: Option<Vec<String>>,
}

impl StatsRequest {
    pub fn new(kind: SubjectKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: i64, page_size: i64) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, key: impl Into<String>, dir: impl Into<String>) -> Self {
        self.sort = Some(key.into());
        self.sort_dir = Some(dir.into());
        self
    }
}

/// What a stats page was actually computed with. `num` is the effective page
/// size after clamping to `[1, MAX_PAGE_SIZE]`; `sort` is `None` when records
/// are in store order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub num: i64,
    pub page: i64,
    pub sort: Option<String>,
    pub sort_dir: SortDir,
    pub mastery: MasteryFilter,
    pub has_next_page: bool,
}

#[derive(Debug, Clone)]
pub struct StatsPage {
    pub records: Vec<StatRecord>,
    pub has_next_page: bool,
    pub meta: PageMeta,
}

pub struct StatsQueryService<S> {
    store: Arc<S>,
    thresholds: MasteryThresholds,
}

impl<S: StatStore> StatsQueryService<S> {
    pub fn new(store: Arc<S>, thresholds: MasteryThresholds) -> Self {
        Self { store, thresholds }
    }

    /// Fetches one page, probing one record past it to learn whether another
    /// page follows.
    pub async fn query(&self, user_id: &str, request: &StatsRequest) -> Result<StatsPage, StoreError> {
        let query = self.build_query(user_id, request);
        let page_size = query.limit.saturating_sub(1);
        let page = page_number(request.page);

        let mut records = self.store.query(&query).await?;
        let has_next_page = records.len() == query.limit;
        if has_next_page {
            records.truncate(page_size);
        }

        tracing::debug!(
            user_id,
            kind = %query.kind,
            filter = query.filter.as_str(),
            page,
            returned = records.len(),
            has_next_page,
            "stats query"
        );

        Ok(StatsPage {
            records,
            has_next_page,
            meta: PageMeta {
                num: page_size as i64,
                page,
                sort: query.sort.map(|_| sort_key(request).to_string()),
                sort_dir: SortDir::parse(request.sort_dir.as_deref()),
                mastery: query.filter,
                has_next_page,
            },
        })
    }

    pub async fn count(&self, user_id: &str, kind: SubjectKind, filter: MasteryFilter) -> Result<usize, StoreError> {
        let mut query = StatQuery::new(user_id, kind, self.thresholds);
        query.filter = filter;
        self.store.count(&query).await
    }

    fn build_query(&self, user_id: &str, request: &StatsRequest) -> StatQuery {
        let page_size = page_size(request.page_size);
        let page = page_number(request.page);

        let mut query = StatQuery::new(user_id, request.kind.unwrap_or(SubjectKind::Item), self.thresholds);
        query.filter = MasteryFilter::parse(request.filter.as_deref());
        query.subject_ids = request.subject_ids.clone();
        query.sort = SortField::parse(Some(sort_key(request)))
            .filter(|field| field.column(query.kind).is_some())
            .map(|field| StatSort {
                field,
                dir: SortDir::parse(request.sort_dir.as_deref()),
            });
        // pages past the addressable range are simply empty
        query.offset = (page - 1)
            .checked_mul(page_size)
            .and_then(|offset| usize::try_from(offset).ok())
            .unwrap_or(usize::MAX);
        query.limit = page_size as usize + 1;
        query
    }
}

fn sort_key(request: &StatsRequest) -> &str {
    request.sort.as_deref().unwrap_or(DEFAULT_SORT)
}

fn page_size(raw: Option<i64>) -> i64 {
    raw.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

fn page_number(raw: Option<i64>) -> i64 {
    raw.unwrap_or(DEFAULT_PAGE).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    async fn seeded(n: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 0..n {
            store
                .put(&StatRecord {
                    user_id: "u1".to_string(),
                    subject_id: format!("w{i:02}"),
                    subject_kind: SubjectKind::Item,
                    total_outcomes: i as i64,
                    average: (i % 10) as f64 / 10.0,
                    volatility: 0.1,
                    duration: 2.0,
                    last_updated: 0,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_pagination_boundaries() {
        let service = StatsQueryService::new(seeded(25).await, MasteryThresholds::default());

        let first = service
            .query("u1", &StatsRequest::new(SubjectKind::Item).page(1, 20))
            .await
            .unwrap();
        assert_eq!(first.records.len(), 20);
        assert!(first.has_next_page);

        let second = service
            .query("u1", &StatsRequest::new(SubjectKind::Item).page(2, 20))
            .await
            .unwrap();
        assert_eq!(second.records.len(), 5);
        assert!(!second.has_next_page);
    }

    #[tokio::test]
    async fn test_exact_page_has_no_next() {
        let service = StatsQueryService::new(seeded(20).await, MasteryThresholds::default());
        let page = service
            .query("u1", &StatsRequest::new(SubjectKind::Item).page(1, 20))
            .await
            .unwrap();
        assert_eq!(page.records.len(), 20);
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn test_page_below_one_is_clamped() {
        let service = StatsQueryService::new(seeded(5).await, MasteryThresholds::default());
        let page = service
            .query("u1", &StatsRequest::new(SubjectKind::Item).page(-3, 2))
            .await
            .unwrap();
        assert_eq!(page.meta.page, 1);
        // default sort: items, descending
        assert_eq!(page.meta.sort.as_deref(), Some("items"));
        assert_eq!(page.records[0].subject_id, "w04");
        assert_eq!(page.records[1].subject_id, "w03");
    }

    #[tokio::test]
    async fn test_unrecognised_params_use_defaults() {
        let service = StatsQueryService::new(seeded(12).await, MasteryThresholds::default());
        let request = StatsRequest::new(SubjectKind::Item)
            .filter("everything")
            .sort("popularity", "sideways");
        let page = service.query("u1", &request).await.unwrap();

        assert_eq!(page.meta.mastery, MasteryFilter::All);
        assert_eq!(page.meta.sort_dir, SortDir::Desc);
        assert_eq!(page.meta.sort, None);
        assert_eq!(page.records.len(), 12);
        // unsorted: store order
        assert_eq!(page.records[0].subject_id, "w00");
        assert_eq!(page.records[11].subject_id, "w11");
    }

    #[tokio::test]
    async fn test_sort_by_total_desc() {
        let service = StatsQueryService::new(seeded(12).await, MasteryThresholds::default());
        let page = service
            .query("u1", &StatsRequest::new(SubjectKind::Item).sort("total", "desc"))
            .await
            .unwrap();
        assert_eq!(page.records[0].total_outcomes, 11);
        assert_eq!(page.meta.sort.as_deref(), Some("total"));
    }

    #[tokio::test]
    async fn test_huge_page_is_empty() {
        let service = StatsQueryService::new(seeded(5).await, MasteryThresholds::default());
        let page = service
            .query("u1", &StatsRequest::new(SubjectKind::Item).page(i64::MAX, 20))
            .await
            .unwrap();
        assert!(page.records.is_empty());
        assert!(!page.has_next_page);
        assert_eq!(page.meta.page, i64::MAX);
    }

    #[tokio::test]
    async fn test_page_size_is_capped() {
        let service = StatsQueryService::new(seeded(5).await, MasteryThresholds::default());
        let page = service
            .query("u1", &StatsRequest::new(SubjectKind::Item).page(1, 500))
            .await
            .unwrap();
        assert_eq!(page.meta.num, MAX_PAGE_SIZE);
        assert_eq!(page.records.len(), 5);
    }

    #[tokio::test]
    async fn test_subject_sort_of_other_kind_reports_store_order() {
        let store = Arc::new(MemoryStore::new());
        for id in ["l1", "l3", "l2"] {
            store
                .put(&StatRecord {
                    user_id: "u1".to_string(),
                    subject_id: id.to_string(),
                    subject_kind: SubjectKind::List,
                    total_outcomes: 1,
                    average: 1.0,
                    volatility: 0.0,
                    duration: 0.0,
                    last_updated: 0,
                })
                .await
                .unwrap();
        }
        let service = StatsQueryService::new(store, MasteryThresholds::default());

        let page = service
            .query("u1", &StatsRequest::new(SubjectKind::List))
            .await
            .unwrap();
        assert_eq!(page.meta.sort, None);
        let ids: Vec<&str> = page.records.iter().map(|r| r.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "l3", "l2"]);

        let page = service
            .query("u1", &StatsRequest::new(SubjectKind::List).sort("lists", "asc"))
            .await
            .unwrap();
        assert_eq!(page.meta.sort.as_deref(), Some("lists"));
        assert_eq!(page.records[2].subject_id, "l3");
    }

    #[tokio::test]
    async fn test_count_mastered() {
        let service = StatsQueryService::new(seeded(25).await, MasteryThresholds::default());
        // totals >= 5, average >= 0.8 => i in {8, 9, 18, 19}
        let count = service
            .count("u1", SubjectKind::Item, MasteryFilter::Mastered)
            .await
            .unwrap();
        assert_eq!(count, 4);
    }
}

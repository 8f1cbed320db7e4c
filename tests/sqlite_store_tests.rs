use std::sync::Arc;

use tempfile::TempDir;

use danci_mastery::db::config::SqliteStoreConfig;
use danci_mastery::db::{
    SamplingStore, SortDir, SortField, SqliteStore, StatQuery, StatSort, StatStore, StoreBackend,
};
use danci_mastery::mastery::{
    MasteryEngine, MasteryFilter, MasteryThresholds, OutcomeBatch, OutcomeEvent, SamplingSummary,
    StatKey, StatRecord, SubjectKind,
};

mod common;

async fn open_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(&SqliteStoreConfig::at(dir.path().join("nested").join("stats.db")))
        .await
        .unwrap()
}

fn record(subject: &str, total: i64, average: f64, volatility: f64) -> StatRecord {
    StatRecord {
        user_id: "u1".to_string(),
        subject_id: subject.to_string(),
        subject_kind: SubjectKind::Item,
        total_outcomes: total,
        average,
        volatility,
        duration: 2.0,
        last_updated: 100,
    }
}

fn sampling(id: &str, timestamp: i64) -> SamplingSummary {
    SamplingSummary {
        id: id.to_string(),
        user_id: "u1".to_string(),
        list_id: Some("l1".to_string()),
        app_id: Some("app".to_string()),
        timestamp,
        outcomes: Vec::new(),
    }
}

#[tokio::test]
async fn test_put_upserts_and_get_reads_back() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let first = record("w1", 1, 1.0, 0.0);
    store.put(&first).await.unwrap();
    let updated = record("w1", 2, 0.75, 0.25);
    store.put(&updated).await.unwrap();

    let loaded = store.get(&StatKey::item("u1", "w1")).await.unwrap();
    assert_eq!(loaded, Some(updated));
    assert!(store.get(&StatKey::item("u1", "w2")).await.unwrap().is_none());
    assert!(store
        .get(&StatKey::new("u1", "w1", SubjectKind::List))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_get_many_returns_known_subjects_only() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.put(&record("w1", 3, 0.5, 0.1)).await.unwrap();
    store.put(&record("w2", 3, 0.9, 0.1)).await.unwrap();

    let ids = vec!["w1".to_string(), "w3".to_string()];
    let found = store.get_many("u1", SubjectKind::Item, &ids).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key("w1"));
    assert!(store.get_many("u1", SubjectKind::Item, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_filters_sorts_and_pages() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.put(&record("w1", 10, 0.9, 0.1)).await.unwrap();
    store.put(&record("w2", 12, 0.4, 0.5)).await.unwrap();
    store.put(&record("w3", 2, 0.2, 0.0)).await.unwrap();
    store.put(&record("w4", 8, 0.85, 0.5)).await.unwrap();
    // upsert keeps w1 first in natural order
    store.put(&record("w1", 11, 0.9, 0.1)).await.unwrap();

    let thresholds = MasteryThresholds::default();
    let base = StatQuery::new("u1", SubjectKind::Item, thresholds);

    let all = store.query(&base).await.unwrap();
    let order: Vec<&str> = all.iter().map(|r| r.subject_id.as_str()).collect();
    assert_eq!(order, vec!["w1", "w2", "w3", "w4"]);

    let mut mastered = base.clone();
    mastered.filter = MasteryFilter::Mastered;
    let ids: Vec<String> = store
        .query(&mastered)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.subject_id)
        .collect();
    assert_eq!(ids, vec!["w1"]);

    let mut unmastered = base.clone();
    unmastered.filter = MasteryFilter::Unmastered;
    assert_eq!(store.count(&unmastered).await.unwrap(), 2);

    let mut struggling = base.clone();
    struggling.filter = MasteryFilter::Struggling;
    let rows = store.query(&struggling).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].subject_id, "w2");

    let mut by_total = base.clone();
    by_total.sort = Some(StatSort {
        field: SortField::TotalOutcomes,
        dir: SortDir::Desc,
    });
    by_total.offset = 1;
    by_total.limit = 2;
    let ids: Vec<String> = store
        .query(&by_total)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.subject_id)
        .collect();
    assert_eq!(ids, vec!["w1", "w4"]);

    let mut restricted = base.clone();
    restricted.subject_ids = Some(vec!["w3".to_string(), "w4".to_string()]);
    assert_eq!(store.count(&restricted).await.unwrap(), 2);
    restricted.subject_ids = Some(Vec::new());
    assert!(store.query(&restricted).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recent_samplings_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.append(&sampling("s1", 100)).await.unwrap();
    store.append(&sampling("s2", 300)).await.unwrap();
    store.append(&sampling("s3", 200)).await.unwrap();
    store.append(&sampling("s4", 300)).await.unwrap();

    let recent = store.recent("u1", Some("l1"), Some("app"), 3).await.unwrap();
    let ids: Vec<&str> = recent.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["s4", "s2", "s3"]);

    assert!(store.recent("u1", Some("l1"), None, 3).await.unwrap().is_empty());
    assert!(store.recent("u2", Some("l1"), Some("app"), 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir).await;
        store.put(&record("w1", 4, 0.5, 0.2)).await.unwrap();
        store.pool().close().await;
    }

    let store = open_store(&dir).await;
    let loaded = store.get(&StatKey::item("u1", "w1")).await.unwrap().unwrap();
    assert_eq!(loaded.total_outcomes, 4);
}

#[tokio::test]
async fn test_engine_over_sqlite_backend() {
    let dir = TempDir::new().unwrap();
    let store = StoreBackend::Sqlite(open_store(&dir).await);
    let engine = MasteryEngine::new(Arc::new(store), common::test_config());

    let events = (0..6)
        .map(|i| OutcomeEvent::new("w1", i, true).with_standard("RL.5.4"))
        .collect();
    let receipt = engine
        .record_outcomes("u1", OutcomeBatch::new(events).for_list("l1", "app"))
        .await
        .unwrap();
    assert_eq!(receipt.applied, 6);
    assert_eq!(receipt.points_earned, 60);

    assert_eq!(engine.count_mastered("u1", SubjectKind::Item).await.unwrap(), 1);
    assert_eq!(engine.count_mastered("u1", SubjectKind::Standard).await.unwrap(), 1);

    let samplings = engine
        .recent_samplings("u1", Some("l1"), Some("app"), 5)
        .await
        .unwrap();
    assert_eq!(samplings.len(), 1);
    assert_eq!(samplings[0].outcomes.len(), 6);
    assert_eq!(samplings[0].timestamp, 5);
}

#[tokio::test]
async fn test_schedule_and_query_beyond_bind_limit() {
    let dir = TempDir::new().unwrap();
    let store = StoreBackend::Sqlite(open_store(&dir).await);
    let engine = MasteryEngine::new(Arc::new(store), common::test_config());
    engine
        .record_outcomes("u1", OutcomeBatch::new(vec![OutcomeEvent::new("w7", 1, true)]))
        .await
        .unwrap();

    let items: Vec<String> = (0..40_000).map(|i| format!("w{i}")).collect();
    let mut ordered = engine.schedule_items("u1", items.clone()).await.unwrap();
    assert_eq!(ordered.len(), items.len());
    ordered.sort();
    let mut expected = items.clone();
    expected.sort();
    assert_eq!(ordered, expected);

    let known = engine
        .store()
        .get_many("u1", SubjectKind::Item, &items)
        .await
        .unwrap();
    assert_eq!(known.len(), 1);

    let mut query = StatQuery::new("u1", SubjectKind::Item, MasteryThresholds::default());
    query.subject_ids = Some(items);
    assert_eq!(engine.store().count(&query).await.unwrap(), 1);
    assert_eq!(engine.store().query(&query).await.unwrap()[0].subject_id, "w7");
}

use std::collections::HashMap;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::config::SqliteStoreConfig;
use super::{SamplingStore, StatQuery, StatStore, StoreError};
use crate::mastery::evaluator::MasteryFilter;
use crate::mastery::types::{SampledOutcome, SamplingSummary, StatKey, StatRecord, SubjectKind};

const SCHEMA_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS "stat_records" (
      "userId" TEXT NOT NULL,
      "subjectId" TEXT NOT NULL,
      "subjectKind" TEXT NOT NULL,
      "totalOutcomes" INTEGER NOT NULL,
      "average" REAL NOT NULL,
      "volatility" REAL NOT NULL,
      "duration" REAL NOT NULL,
      "lastUpdated" INTEGER NOT NULL,
      PRIMARY KEY ("userId", "subjectId", "subjectKind")
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS "idx_stat_records_user_kind" ON "stat_records" ("userId", "subjectKind")"#,
    r#"
    CREATE TABLE IF NOT EXISTS "sampling_summaries" (
      "seq" INTEGER PRIMARY KEY AUTOINCREMENT,
      "id" TEXT NOT NULL UNIQUE,
      "userId" TEXT NOT NULL,
      "listId" TEXT,
      "appId" TEXT,
      "timestamp" INTEGER NOT NULL,
      "outcomes" TEXT NOT NULL
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS "idx_samplings_lookup" ON "sampling_summaries" ("userId", "listId", "appId", "timestamp")"#,
];

const STAT_COLUMNS: &str = r#""userId","subjectId","subjectKind","totalOutcomes","average","volatility","duration","lastUpdated""#;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA_SQL {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

impl StatStore for SqliteStore {
    async fn get(&self, key: &StatKey) -> Result<Option<StatRecord>, StoreError> {
        let sql = format!(
            r#"SELECT {STAT_COLUMNS} FROM "stat_records"
            WHERE "userId" = ? AND "subjectId" = ? AND "subjectKind" = ?
            LIMIT 1"#
        );
        let row = sqlx::query(&sql)
            .bind(&key.user_id)
            .bind(&key.subject_id)
            .bind(key.kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_stat_row).transpose()
    }

    async fn get_many(
        &self,
        user_id: &str,
        kind: SubjectKind,
        subject_ids: &[String],
    ) -> Result<HashMap<String, StatRecord>, StoreError> {
        if subject_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(r#"SELECT {STAT_COLUMNS} FROM "stat_records" WHERE "userId" = "#));
        qb.push_bind(user_id);
        qb.push(r#" AND "subjectKind" = "#);
        qb.push_bind(kind.as_str());
        qb.push(r#" AND "subjectId" IN (SELECT value FROM json_each("#);
        qb.push_bind(serde_json::to_string(subject_ids)?);
        qb.push("))");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = map_stat_row(row)?;
            out.insert(record.subject_id.clone(), record);
        }
        Ok(out)
    }

    async fn put(&self, record: &StatRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO "stat_records"
              ("userId","subjectId","subjectKind","totalOutcomes","average","volatility","duration","lastUpdated")
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT ("userId","subjectId","subjectKind") DO UPDATE SET
              "totalOutcomes" = excluded."totalOutcomes",
              "average" = excluded."average",
              "volatility" = excluded."volatility",
              "duration" = excluded."duration",
              "lastUpdated" = excluded."lastUpdated"
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.subject_id)
        .bind(record.subject_kind.as_str())
        .bind(record.total_outcomes)
        .bind(record.average)
        .bind(record.volatility)
        .bind(record.duration)
        .bind(record.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, query: &StatQuery) -> Result<Vec<StatRecord>, StoreError> {
        if matches!(&query.subject_ids, Some(ids) if ids.is_empty()) || query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(r#"SELECT {STAT_COLUMNS} FROM "stat_records""#));
        push_where(&mut qb, query)?;

        qb.push(" ORDER BY ");
        if let Some(sort) = query.sort {
            if let Some(column) = sort.field.column(query.kind) {
                qb.push(format!(r#""{column}" {}, "#, sort.dir.as_sql()));
            }
        }
        qb.push("rowid ASC LIMIT ");
        qb.push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_stat_row).collect()
    }

    async fn count(&self, query: &StatQuery) -> Result<usize, StoreError> {
        if matches!(&query.subject_ids, Some(ids) if ids.is_empty()) {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(r#"SELECT COUNT(*) FROM "stat_records""#);
        push_where(&mut qb, query)?;
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as usize)
    }
}

/// Subject ids travel as one JSON array bind, so the id count is not bounded
/// by SQLite's host-parameter limit.
fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, query: &StatQuery) -> Result<(), StoreError> {
    let t = &query.thresholds;

    qb.push(r#" WHERE "userId" = "#);
    qb.push_bind(query.user_id.clone());
    qb.push(r#" AND "subjectKind" = "#);
    qb.push_bind(query.kind.as_str());

    if let Some(ids) = &query.subject_ids {
        qb.push(r#" AND "subjectId" IN (SELECT value FROM json_each("#);
        qb.push_bind(serde_json::to_string(ids)?);
        qb.push("))");
    }

    match query.filter {
        MasteryFilter::All => {
            qb.push(r#" AND "totalOutcomes" >= 0"#);
        }
        MasteryFilter::Mastered => {
            qb.push(r#" AND "totalOutcomes" >= "#);
            qb.push_bind(t.min_total_outcomes_for_mastery);
            qb.push(r#" AND "average" >= "#);
            qb.push_bind(t.min_average_for_mastery);
            qb.push(r#" AND "volatility" <= "#);
            qb.push_bind(t.max_volatility_for_mastery);
        }
        MasteryFilter::Unmastered => {
            qb.push(r#" AND "totalOutcomes" >= "#);
            qb.push_bind(t.min_total_outcomes_for_mastery);
            qb.push(r#" AND ("average" < "#);
            qb.push_bind(t.min_average_for_mastery);
            qb.push(r#" OR "volatility" > "#);
            qb.push_bind(t.max_volatility_for_mastery);
            qb.push(")");
        }
        MasteryFilter::Struggling => {
            qb.push(r#" AND "totalOutcomes" >= "#);
            qb.push_bind(t.struggling_floor);
            qb.push(r#" AND "average" < "#);
            qb.push_bind(t.struggling_average_ceiling);
            qb.push(r#" AND "volatility" >= "#);
            qb.push_bind(t.max_volatility_for_mastery);
        }
    }
    Ok(())
}

fn map_stat_row(row: &SqliteRow) -> Result<StatRecord, StoreError> {
    let kind: String = row.try_get("subjectKind")?;
    let subject_kind = SubjectKind::parse(&kind)
        .ok_or_else(|| StoreError::Decode(format!("unknown subject kind {kind:?}")))?;

    Ok(StatRecord {
        user_id: row.try_get("userId")?,
        subject_id: row.try_get("subjectId")?,
        subject_kind,
        total_outcomes: row.try_get("totalOutcomes")?,
        average: row.try_get("average")?,
        volatility: row.try_get("volatility")?,
        duration: row.try_get("duration")?,
        last_updated: row.try_get("lastUpdated")?,
    })
}

impl SamplingStore for SqliteStore {
    async fn append(&self, summary: &SamplingSummary) -> Result<(), StoreError> {
        let outcomes = serde_json::to_string(&summary.outcomes)?;
        sqlx::query(
            r#"
            INSERT INTO "sampling_summaries" ("id","userId","listId","appId","timestamp","outcomes")
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&summary.id)
        .bind(&summary.user_id)
        .bind(&summary.list_id)
        .bind(&summary.app_id)
        .bind(summary.timestamp)
        .bind(outcomes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        app_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SamplingSummary>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT "id","userId","listId","appId","timestamp","outcomes"
            FROM "sampling_summaries"
            WHERE "userId" = ? AND "listId" IS ? AND "appId" IS ?
            ORDER BY "timestamp" DESC, "seq" DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(list_id)
        .bind(app_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_sampling_row).collect()
    }
}

fn map_sampling_row(row: &SqliteRow) -> Result<SamplingSummary, StoreError> {
    let raw: String = row.try_get("outcomes")?;
    let outcomes: Vec<SampledOutcome> = serde_json::from_str(&raw)?;
    Ok(SamplingSummary {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        list_id: row.try_get("listId")?,
        app_id: row.try_get("appId")?,
        timestamp: row.try_get("timestamp")?,
        outcomes,
    })
}

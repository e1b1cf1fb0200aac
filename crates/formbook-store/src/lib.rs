//! Store seam for formbook: canonical race/runner queries and result upsert.
//!
//! The canonical store is externally owned; this crate only reads races and
//! runners and writes the reconciled result rows. Both implementations
//! return rows in ascending id order so tie-breaking stays reproducible.

use async_trait::async_trait;
use chrono::NaiveDate;
use formbook_core::{CanonicalRace, CanonicalRunner, RaceId, RunnerId, RunnerResult};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;

pub const CRATE_NAME: &str = "formbook-store";

/// Rows returned per unbounded race query; resolution never needs more.
const DEFAULT_RACE_LIMIT: i64 = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("upsert rejected for race {race_id} runner {runner_id}: {source}")]
    Upsert {
        race_id: RaceId,
        runner_id: RunnerId,
        #[source]
        source: sqlx::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Race query filter; `None` fields do not constrain the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceFilter {
    pub course_substring: Option<String>,
    pub date: Option<NaiveDate>,
    pub off_time: Option<String>,
    pub limit: Option<usize>,
}

/// Runner query filter; course/date filters apply to the joined parent race.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerFilter {
    pub race_id: Option<RaceId>,
    pub date: Option<NaiveDate>,
    pub course_substring: Option<String>,
}

/// Canonical runner joined with its parent race.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEntry {
    pub runner: CanonicalRunner,
    pub race: CanonicalRace,
}

#[async_trait]
pub trait FormStore: Send + Sync {
    async fn query_races(&self, filter: &RaceFilter) -> Result<Vec<CanonicalRace>, StoreError>;

    async fn query_runners(&self, filter: &RunnerFilter)
        -> Result<Vec<CanonicalEntry>, StoreError>;

    async fn upsert_result(&self, record: &RunnerResult) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: FormStore + ?Sized> FormStore for std::sync::Arc<S> {
    async fn query_races(&self, filter: &RaceFilter) -> Result<Vec<CanonicalRace>, StoreError> {
        (**self).query_races(filter).await
    }

    async fn query_runners(
        &self,
        filter: &RunnerFilter,
    ) -> Result<Vec<CanonicalEntry>, StoreError> {
        (**self).query_runners(filter).await
    }

    async fn upsert_result(&self, record: &RunnerResult) -> Result<(), StoreError> {
        (**self).upsert_result(record).await
    }
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgFormStore {
    pool: PgPool,
}

impl PgFormStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(StoreError::Query)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl FormStore for PgFormStore {
    async fn query_races(&self, filter: &RaceFilter) -> Result<Vec<CanonicalRace>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT race_id, course, race_date, off_time
              FROM races
             WHERE ($1::text IS NULL OR course ILIKE '%' || $1 || '%')
               AND ($2::date IS NULL OR race_date = $2)
               AND ($3::text IS NULL OR off_time = $3)
             ORDER BY race_id
             LIMIT COALESCE($4, $5)
            "#,
        )
        .bind(filter.course_substring.as_deref())
        .bind(filter.date)
        .bind(filter.off_time.as_deref())
        .bind(filter.limit.map(|l| l as i64))
        .bind(DEFAULT_RACE_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(CanonicalRace {
                race_id: RaceId(row.try_get("race_id").map_err(StoreError::Query)?),
                course: row.try_get("course").map_err(StoreError::Query)?,
                date: row.try_get("race_date").map_err(StoreError::Query)?,
                off_time: row.try_get("off_time").map_err(StoreError::Query)?,
            });
        }
        tracing::debug!(rows = out.len(), "query_races");
        Ok(out)
    }

    async fn query_runners(
        &self,
        filter: &RunnerFilter,
    ) -> Result<Vec<CanonicalEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT ru.runner_id, ru.race_id, ru.horse_name,
                   ra.course, ra.race_date, ra.off_time
              FROM runners ru
              JOIN races ra ON ra.race_id = ru.race_id
             WHERE ($1::bigint IS NULL OR ru.race_id = $1)
               AND ($2::date IS NULL OR ra.race_date = $2)
               AND ($3::text IS NULL OR ra.course ILIKE '%' || $3 || '%')
             ORDER BY ru.runner_id
            "#,
        )
        .bind(filter.race_id.map(|id| id.0))
        .bind(filter.date)
        .bind(filter.course_substring.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let race_id = RaceId(row.try_get("race_id").map_err(StoreError::Query)?);
            out.push(CanonicalEntry {
                runner: CanonicalRunner {
                    runner_id: RunnerId(row.try_get("runner_id").map_err(StoreError::Query)?),
                    race_id,
                    horse_name: row.try_get("horse_name").map_err(StoreError::Query)?,
                },
                race: CanonicalRace {
                    race_id,
                    course: row.try_get("course").map_err(StoreError::Query)?,
                    date: row.try_get("race_date").map_err(StoreError::Query)?,
                    off_time: row.try_get("off_time").map_err(StoreError::Query)?,
                },
            });
        }
        tracing::debug!(rows = out.len(), "query_runners");
        Ok(out)
    }

    async fn upsert_result(&self, record: &RunnerResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO runner_results
                   (race_id, runner_id, horse_name, draw, pace, comment, rating,
                    matched_via, confidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (race_id, runner_id) DO UPDATE
               SET horse_name = EXCLUDED.horse_name,
                   draw = EXCLUDED.draw,
                   pace = EXCLUDED.pace,
                   comment = EXCLUDED.comment,
                   rating = EXCLUDED.rating,
                   matched_via = EXCLUDED.matched_via,
                   confidence = EXCLUDED.confidence
            "#,
        )
        .bind(record.race_id.0)
        .bind(record.runner_id.0)
        .bind(&record.horse_name)
        .bind(record.draw)
        .bind(record.pace.as_deref())
        .bind(record.comment.as_deref())
        .bind(record.rating)
        .bind(record.matched_via.as_str())
        .bind(record.confidence)
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::Upsert {
            race_id: record.race_id,
            runner_id: record.runner_id,
            source,
        })?;
        Ok(())
    }
}

/// Deterministic in-memory store with the same filter semantics as the
/// Postgres implementation. Backs fixture-first tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryFormStore {
    races: Vec<CanonicalRace>,
    runners: Vec<CanonicalRunner>,
    upserts: Mutex<Vec<RunnerResult>>,
    fail_queries: bool,
    fail_upserts: bool,
}

impl MemoryFormStore {
    pub fn new(mut races: Vec<CanonicalRace>, mut runners: Vec<CanonicalRunner>) -> Self {
        races.sort_by_key(|r| r.race_id);
        runners.sort_by_key(|r| r.runner_id);
        Self {
            races,
            runners,
            upserts: Mutex::new(Vec::new()),
            fail_queries: false,
            fail_upserts: false,
        }
    }

    /// Every query fails with `StoreError::Unavailable`.
    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Every upsert fails with `StoreError::Unavailable`.
    pub fn failing_upserts(mut self) -> Self {
        self.fail_upserts = true;
        self
    }

    pub async fn upserted(&self) -> Vec<RunnerResult> {
        self.upserts.lock().await.clone()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl FormStore for MemoryFormStore {
    async fn query_races(&self, filter: &RaceFilter) -> Result<Vec<CanonicalRace>, StoreError> {
        if self.fail_queries {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        let limit = filter.limit.unwrap_or(DEFAULT_RACE_LIMIT as usize);
        Ok(self
            .races
            .iter()
            .filter(|race| {
                filter
                    .course_substring
                    .as_deref()
                    .map_or(true, |sub| contains_ci(&race.course, sub))
                    && filter.date.map_or(true, |date| race.date == date)
                    && filter
                        .off_time
                        .as_deref()
                        .map_or(true, |time| race.off_time == time)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query_runners(
        &self,
        filter: &RunnerFilter,
    ) -> Result<Vec<CanonicalEntry>, StoreError> {
        if self.fail_queries {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        let mut out = Vec::new();
        for runner in &self.runners {
            let Some(race) = self.races.iter().find(|r| r.race_id == runner.race_id) else {
                continue;
            };
            let keep = filter.race_id.map_or(true, |id| runner.race_id == id)
                && filter.date.map_or(true, |date| race.date == date)
                && filter
                    .course_substring
                    .as_deref()
                    .map_or(true, |sub| contains_ci(&race.course, sub));
            if keep {
                out.push(CanonicalEntry {
                    runner: runner.clone(),
                    race: race.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn upsert_result(&self, record: &RunnerResult) -> Result<(), StoreError> {
        if self.fail_upserts {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        let mut upserts = self.upserts.lock().await;
        match upserts
            .iter_mut()
            .find(|r| r.race_id == record.race_id && r.runner_id == record.runner_id)
        {
            Some(existing) => *existing = record.clone(),
            None => upserts.push(record.clone()),
        }
        Ok(())
    }
}

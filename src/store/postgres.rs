//! PostgreSQL backends: analysis store, prompt versions and usage metrics.
//!
//! All three share one `PgPool`. [`ensure_schema`] creates the tables with
//! idempotent DDL; migrations are managed outside this crate.

use super::{AnalysisRecord, AnalysisStore, NewAnalysisRecord, StoreError, StoreResult};
use crate::config_cache::{ConfigSource, PromptStore, PromptVersion};
use crate::fingerprint::Fingerprint;
use crate::telemetry::{MetricsSink, MetricsSummary, UsageMetric};
use crate::types::AnalysisVariant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS analyses (
        id UUID PRIMARY KEY,
        request_key TEXT NOT NULL UNIQUE,
        fingerprint TEXT NOT NULL,
        session_id TEXT,
        product_name TEXT,
        analysis_type TEXT NOT NULL,
        analysis_result JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_analyses_fingerprint ON analyses (fingerprint)",
    "CREATE INDEX IF NOT EXISTS idx_analyses_session ON analyses (session_id, created_at DESC)",
    r#"CREATE TABLE IF NOT EXISTS prompt_versions (
        id UUID PRIMARY KEY,
        version TEXT NOT NULL,
        language TEXT NOT NULL,
        content TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (version, language)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ai_consumption_metrics (
        id UUID PRIMARY KEY,
        session_id TEXT,
        request_key TEXT NOT NULL,
        resolution_path TEXT NOT NULL,
        cache_hit BOOLEAN NOT NULL,
        response_time_ms BIGINT NOT NULL,
        openai_cost_usd DOUBLE PRECISION,
        model TEXT,
        tokens_used BIGINT,
        prompt_tokens BIGINT,
        completion_tokens BIGINT,
        discarded_cost_usd DOUBLE PRECISION,
        discarded_tokens BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_metrics_created ON ai_consumption_metrics (created_at)",
];

const ANALYSIS_COLUMNS: &str = "id, request_key, fingerprint, session_id, product_name, \
    analysis_type, analysis_result, created_at, updated_at";

const PROMPT_COLUMNS: &str = "id, version, language, content, is_active, created_at, updated_at";

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == UNIQUE_VIOLATION)
}

/// Open a pool against `database_url`.
pub async fn connect(database_url: &str, acquire_timeout: Duration) -> StoreResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .map_err(backend)
}

/// Create the tables and indexes if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> StoreResult<()> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await.map_err(backend)?;
    }
    info!("database schema ensured");
    Ok(())
}

fn analysis_from_row(row: &PgRow) -> StoreResult<AnalysisRecord> {
    let fp: String = row.try_get("fingerprint").map_err(backend)?;
    let fingerprint = Fingerprint::from_hex(&fp)
        .ok_or_else(|| StoreError::Backend(format!("invalid fingerprint in row: {}", fp)))?;
    let variant: String = row.try_get("analysis_type").map_err(backend)?;
    let variant = variant
        .parse::<AnalysisVariant>()
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(AnalysisRecord {
        id: row.try_get("id").map_err(backend)?,
        request_key: row.try_get("request_key").map_err(backend)?,
        fingerprint,
        variant,
        session_ref: row.try_get("session_id").map_err(backend)?,
        product_name: row.try_get("product_name").map_err(backend)?,
        payload: row.try_get("analysis_result").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

/// `analyses` table. The unique index on `request_key` resolves races.
#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn find_by_key(&self, request_key: &str) -> StoreResult<Option<AnalysisRecord>> {
        let q = format!("SELECT {} FROM analyses WHERE request_key = $1", ANALYSIS_COLUMNS);
        let row = sqlx::query(&q)
            .bind(request_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(analysis_from_row).transpose()
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Vec<AnalysisRecord>> {
        let q = format!(
            "SELECT {} FROM analyses WHERE fingerprint = $1 ORDER BY created_at DESC",
            ANALYSIS_COLUMNS
        );
        let rows = sqlx::query(&q)
            .bind(fingerprint.to_hex())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(analysis_from_row).collect()
    }

    async fn create(&self, record: NewAnalysisRecord) -> StoreResult<AnalysisRecord> {
        let q = format!(
            "INSERT INTO analyses (id, request_key, fingerprint, session_id, product_name, \
             analysis_type, analysis_result) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            ANALYSIS_COLUMNS
        );
        let result = sqlx::query(&q)
            .bind(Uuid::new_v4())
            .bind(&record.request_key)
            .bind(record.fingerprint.to_hex())
            .bind(&record.session_ref)
            .bind(&record.product_name)
            .bind(record.variant.as_str())
            .bind(&record.payload)
            .fetch_one(&self.pool)
            .await;
        match result {
            Ok(row) => {
                let created = analysis_from_row(&row)?;
                debug!(id = %created.id, key = %created.request_key, "analysis row inserted");
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
                key: record.request_key,
            }),
            Err(e) => Err(backend(e)),
        }
    }

    async fn list_recent(&self, session_ref: &str, limit: usize) -> StoreResult<Vec<AnalysisRecord>> {
        let q = format!(
            "SELECT {} FROM analyses WHERE session_id = $1 ORDER BY created_at DESC LIMIT $2",
            ANALYSIS_COLUMNS
        );
        let rows = sqlx::query(&q)
            .bind(session_ref)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(analysis_from_row).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<AnalysisRecord>> {
        let q = format!("SELECT {} FROM analyses WHERE id = $1", ANALYSIS_COLUMNS);
        let row = sqlx::query(&q)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(analysis_from_row).transpose()
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

fn prompt_from_row(row: &PgRow) -> StoreResult<PromptVersion> {
    Ok(PromptVersion {
        id: row.try_get("id").map_err(backend)?,
        version: row.try_get("version").map_err(backend)?,
        language: row.try_get("language").map_err(backend)?,
        content: row.try_get("content").map_err(backend)?,
        active: row.try_get("is_active").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

/// `prompt_versions` table. At most one active version per language.
#[derive(Clone)]
pub struct PgPromptStore {
    pool: PgPool,
}

impl PgPromptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromptStore for PgPromptStore {
    async fn create_version(
        &self,
        version: &str,
        language: &str,
        content: &str,
        activate: bool,
    ) -> crate::Result<PromptVersion> {
        let q = format!(
            "INSERT INTO prompt_versions (id, version, language, content, is_active) \
             VALUES ($1, $2, $3, $4, FALSE) RETURNING {}",
            PROMPT_COLUMNS
        );
        let row = sqlx::query(&q)
            .bind(Uuid::new_v4())
            .bind(version)
            .bind(language)
            .bind(content)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict {
                        key: format!("{}:{}", language, version),
                    }
                } else {
                    backend(e)
                }
            })?;
        let created = prompt_from_row(&row)?;
        info!(version = version, language = language, "prompt version created");
        if activate {
            if let Some(active) = self.activate_version(version, language).await? {
                return Ok(active);
            }
        }
        Ok(created)
    }

    async fn activate_version(&self, version: &str, language: &str) -> crate::Result<Option<PromptVersion>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let target: Option<Uuid> = sqlx::query(
            "SELECT id FROM prompt_versions WHERE version = $1 AND language = $2 FOR UPDATE",
        )
        .bind(version)
        .bind(language)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .map(|row| row.try_get("id"))
        .transpose()
        .map_err(backend)?;

        let Some(id) = target else {
            tx.rollback().await.map_err(backend)?;
            warn!(version = version, language = language, "prompt version not found");
            return Ok(None);
        };

        sqlx::query(
            "UPDATE prompt_versions SET is_active = FALSE, updated_at = now() \
             WHERE language = $1 AND is_active AND id <> $2",
        )
        .bind(language)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let q = format!(
            "UPDATE prompt_versions SET is_active = TRUE, updated_at = now() WHERE id = $1 RETURNING {}",
            PROMPT_COLUMNS
        );
        let row = sqlx::query(&q)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        info!(version = version, language = language, "prompt version activated");
        Ok(Some(prompt_from_row(&row)?))
    }

    async fn active_prompt(&self, language: &str) -> crate::Result<Option<PromptVersion>> {
        let q = format!(
            "SELECT {} FROM prompt_versions WHERE language = $1 AND is_active \
             ORDER BY updated_at DESC LIMIT 1",
            PROMPT_COLUMNS
        );
        let row = sqlx::query(&q)
            .bind(language)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.as_ref().map(prompt_from_row).transpose()?)
    }

    async fn get_version(&self, version: &str, language: &str) -> crate::Result<Option<PromptVersion>> {
        let q = format!(
            "SELECT {} FROM prompt_versions WHERE version = $1 AND language = $2",
            PROMPT_COLUMNS
        );
        let row = sqlx::query(&q)
            .bind(version)
            .bind(language)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.as_ref().map(prompt_from_row).transpose()?)
    }

    async fn list_versions(&self, language: Option<&str>) -> crate::Result<Vec<PromptVersion>> {
        let q = format!(
            "SELECT {} FROM prompt_versions WHERE ($1::TEXT IS NULL OR language = $1) \
             ORDER BY created_at DESC",
            PROMPT_COLUMNS
        );
        let rows = sqlx::query(&q)
            .bind(language)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.iter().map(prompt_from_row).collect::<StoreResult<Vec<_>>>()?)
    }
}

#[async_trait]
impl ConfigSource for PgPromptStore {
    async fn fetch(&self, key: &str) -> crate::Result<Option<String>> {
        Ok(self.active_prompt(key).await?.map(|p| p.content))
    }
}

/// `ai_consumption_metrics` table.
#[derive(Clone)]
pub struct PgMetricsSink {
    pool: PgPool,
}

impl PgMetricsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Aggregate over metrics recorded at or after `since` (all when `None`).
    pub async fn summary(&self, since: Option<DateTime<Utc>>) -> crate::Result<MetricsSummary> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE cache_hit) AS hits, \
                COALESCE(SUM(openai_cost_usd), 0) AS cost, \
                COALESCE(AVG(response_time_ms)::DOUBLE PRECISION, 0) AS latency, \
                COALESCE(SUM(prompt_tokens), 0)::BIGINT AS prompt_tokens, \
                COALESCE(SUM(completion_tokens), 0)::BIGINT AS completion_tokens, \
                COALESCE(SUM(tokens_used), 0)::BIGINT AS tokens, \
                COUNT(*) FILTER (WHERE resolution_path = 'conflict_recovered') AS duplicates, \
                COALESCE(SUM(discarded_cost_usd), 0) AS discarded \
             FROM ai_consumption_metrics WHERE ($1::TIMESTAMPTZ IS NULL OR created_at >= $1)",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let count = |col: &str| -> StoreResult<u64> {
            let v: i64 = row.try_get(col).map_err(backend)?;
            Ok(v.max(0) as u64)
        };
        let total_requests = count("total")?;
        let cache_hits = count("hits")?;
        Ok(MetricsSummary {
            total_requests,
            cache_hits,
            cache_hit_rate: if total_requests > 0 {
                cache_hits as f64 / total_requests as f64
            } else {
                0.0
            },
            total_cost_usd: row.try_get("cost").map_err(backend)?,
            average_latency_ms: row.try_get("latency").map_err(backend)?,
            prompt_tokens: count("prompt_tokens")?,
            completion_tokens: count("completion_tokens")?,
            total_tokens: count("tokens")?,
            duplicate_provider_calls: count("duplicates")?,
            discarded_cost_usd: row.try_get("discarded").map_err(backend)?,
        })
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[async_trait]
impl MetricsSink for PgMetricsSink {
    async fn record(&self, metric: UsageMetric) -> crate::Result<()> {
        let tokens = metric.tokens;
        sqlx::query(
            "INSERT INTO ai_consumption_metrics (id, session_id, request_key, resolution_path, \
             cache_hit, response_time_ms, openai_cost_usd, model, tokens_used, prompt_tokens, \
             completion_tokens, discarded_cost_usd, discarded_tokens, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(metric.id)
        .bind(&metric.session_ref)
        .bind(&metric.request_key)
        .bind(metric.path.as_str())
        .bind(metric.cache_hit)
        .bind(to_i64(metric.latency_ms))
        .bind(metric.cost_usd)
        .bind(&metric.model)
        .bind(tokens.map(|t| to_i64(t.total_tokens)))
        .bind(tokens.map(|t| to_i64(t.prompt_tokens)))
        .bind(tokens.map(|t| to_i64(t.completion_tokens)))
        .bind(metric.discarded_cost_usd)
        .bind(metric.discarded_tokens.map(to_i64))
        .bind(metric.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::telemetry::ResolutionPath;
    use serde_json::json;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = connect(&url, Duration::from_secs(5)).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL at DATABASE_URL"]
    async fn test_unique_request_key_conflicts() {
        let store = PgAnalysisStore::new(pool().await);
        let fp = fingerprint([Uuid::new_v4().as_bytes().as_slice()]);
        let new = NewAnalysisRecord {
            request_key: format!("{}:complete:default", fp),
            fingerprint: fp,
            variant: AnalysisVariant::Complete,
            session_ref: Some("pg-test".into()),
            product_name: Some("Test".into()),
            payload: json!({"confidence_score": 0.5}),
        };
        let created = store.create(new.clone()).await.unwrap();
        let err = store.create(new.clone()).await.unwrap_err();
        assert!(err.is_conflict());
        let found = store.find_by_key(&new.request_key).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(store.find_by_fingerprint(&fp).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL at DATABASE_URL"]
    async fn test_prompt_activation_and_metrics() {
        let pool = pool().await;
        let prompts = PgPromptStore::new(pool.clone());
        let lang = format!("t{}", &Uuid::new_v4().simple().to_string()[..6]);
        prompts.create_version("v1", &lang, "one", true).await.unwrap();
        prompts.create_version("v2", &lang, "two", true).await.unwrap();
        assert_eq!(prompts.fetch(&lang).await.unwrap().as_deref(), Some("two"));
        let active: Vec<_> = prompts
            .list_versions(Some(&lang))
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.active)
            .collect();
        assert_eq!(active.len(), 1);

        let sink = PgMetricsSink::new(pool);
        let since = Utc::now();
        sink.record(UsageMetric::new(ResolutionPath::DurableHit, "k", 5))
            .await
            .unwrap();
        let summary = sink.summary(Some(since)).await.unwrap();
        assert!(summary.total_requests >= 1);
    }
}

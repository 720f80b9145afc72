//! Caller-facing result types.

use crate::fingerprint::Fingerprint;
use crate::store::AnalysisRecord;
use crate::structured::AnalysisReport;
use crate::telemetry::ResolutionPath;
use crate::tokens::TokenUsage;
use crate::types::AnalysisVariant;
use crate::{Error, ErrorContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Complete outcome of one orchestration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub request_key: String,
    pub fingerprint: Fingerprint,
    pub variant: AnalysisVariant,
    /// Session of the caller, not of the request that first produced the record.
    pub session_ref: Option<String>,
    pub report: AnalysisReport,
    pub path: ResolutionPath,
    pub cache_hit: bool,
    /// False only when the durable write failed and the result was served anyway.
    pub persisted: bool,
    pub latency_ms: u64,
    pub cost_usd: Option<f64>,
    pub tokens: Option<TokenUsage>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub(crate) fn from_record(
        record: AnalysisRecord,
        path: ResolutionPath,
        session_ref: Option<String>,
        latency_ms: u64,
    ) -> Result<Self> {
        let report = decode_report(&record)?;
        Ok(Self {
            id: record.id,
            request_key: record.request_key,
            fingerprint: record.fingerprint,
            variant: record.variant,
            session_ref,
            report,
            path,
            cache_hit: path.is_cache_hit(),
            persisted: true,
            latency_ms,
            cost_usd: None,
            tokens: None,
            model: None,
            created_at: record.created_at,
        })
    }

    pub(crate) fn with_usage(mut self, model: String, tokens: TokenUsage, cost_usd: f64) -> Self {
        self.model = Some(model);
        self.tokens = Some(tokens);
        self.cost_usd = Some(cost_usd);
        self
    }

    pub(crate) fn unpersisted(mut self) -> Self {
        self.persisted = false;
        self
    }

    pub fn product_name(&self) -> Option<&str> {
        self.report.product_name()
    }
}

/// History entry: enough to list past analyses without the full report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub variant: AnalysisVariant,
    pub product_name: Option<String>,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<&AnalysisRecord> for AnalysisSummary {
    fn from(record: &AnalysisRecord) -> Self {
        Self {
            id: record.id,
            fingerprint: record.fingerprint,
            variant: record.variant,
            product_name: record.product_name.clone(),
            score: record
                .payload
                .pointer("/general_rating/score")
                .and_then(serde_json::Value::as_f64),
            created_at: record.created_at,
        }
    }
}

fn decode_report(record: &AnalysisRecord) -> Result<AnalysisReport> {
    serde_json::from_value(record.payload.clone()).map_err(|e| {
        Error::validation_with_context(
            "stored analysis does not match the report schema",
            ErrorContext::new()
                .with_source("durable_record")
                .with_details(format!("id {}: {}", record.id, e)),
        )
    })
}

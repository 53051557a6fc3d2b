//! # Report Snapshot
//!
//! The immutable result of one analysis run. Reports are shared as
//! `Arc<AnalysisReport>` and serialize to a versioned JSON document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluate::{EvaluatorFailure, Measurement, Status};
use crate::registry::CategoryId;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("report schema version {found} is not supported (expected {expected})")]
    IncompatibleSchema { found: u64, expected: u32 },
    #[error("report has no schema_version field")]
    MissingSchemaVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    LikelyOriginal,
    PossiblyProcessed,
    LikelyNotOriginal,
}

impl Tier {
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Tier::LikelyOriginal,
            60..=79 => Tier::PossiblyProcessed,
            _ => Tier::LikelyNotOriginal,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::LikelyOriginal => "likely original",
            Tier::PossiblyProcessed => "possibly lightly processed",
            Tier::LikelyNotOriginal => "likely not original",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pass: usize,
    pub warning: usize,
    pub fail: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.pass += 1,
            Status::Warning => self.warning += 1,
            Status::Fail => self.fail += 1,
            Status::NotApplicable => {}
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.warning + self.fail
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub file_name: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub sha256: String,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub metric_id: String,
    pub label: String,
    pub description: String,
    pub status: Option<Status>,
    pub result_label: String,
    pub raw_measurement: Measurement,
    pub flagged: bool,
    /// Set when the evaluator did not produce a verdict.
    pub failure: Option<EvaluatorFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub id: CategoryId,
    pub label: String,
    pub status_bearing: bool,
    pub score: Option<f64>,
    pub metrics: Vec<MetricEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub metric_id: String,
    pub failure: EvaluatorFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub schema_version: u32,
    pub session_id: u64,
    pub timestamp: DateTime<Utc>,
    pub subject: SubjectInfo,
    pub overall_score: u8,
    pub tier: Tier,
    pub status_counts: StatusCounts,
    pub degraded: bool,
    pub categories: Vec<CategoryReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisReport {
    pub fn category(&self, id: CategoryId) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn entry(&self, metric_id: &str) -> Option<&MetricEntry> {
        self.categories
            .iter()
            .flat_map(|c| c.metrics.iter())
            .find(|m| m.metric_id == metric_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MetricEntry> {
        self.categories.iter().flat_map(|c| c.metrics.iter())
    }

    pub fn flagged(&self) -> impl Iterator<Item = &MetricEntry> {
        self.entries().filter(|m| m.flagged)
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a report, refusing documents written under another schema version.
    pub fn from_json(input: &str) -> Result<Self, ReportError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or(ReportError::MissingSchemaVersion)?;
        if found != REPORT_SCHEMA_VERSION as u64 {
            return Err(ReportError::IncompatibleSchema {
                found,
                expected: REPORT_SCHEMA_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

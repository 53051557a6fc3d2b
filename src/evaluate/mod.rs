//! # Evaluator Contract
//!
//! Each metric's forensic logic is an [`Evaluator`]: a read-only function of the
//! subject bytes, its attributes and the decoded probe that returns a
//! [`Verdict`] or an [`EvaluatorFailure`]. [`run_metric`] wraps an invocation
//! with the rules every evaluator is held to.

pub mod builtin;
mod quant;
mod readings;
mod structural;

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probe::ContainerProbe;
use crate::registry::{MetricDescriptor, MetricRegistry};
use crate::subject::SubjectAttributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Warning,
    Fail,
    NotApplicable,
}

impl Status {
    /// Contribution to a category score; `None` is excluded from the denominator.
    pub fn weight(&self) -> Option<f64> {
        match self {
            Status::Pass => Some(1.0),
            Status::Warning => Some(0.5),
            Status::Fail => Some(0.0),
            Status::NotApplicable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Measurement {
    None,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Record(BTreeMap<String, Measurement>),
}

impl Measurement {
    pub fn text(value: impl Into<String>) -> Self {
        Measurement::Text(value.into())
    }

    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Measurement)>,
    {
        Measurement::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Measurement::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: Option<Status>,
    pub result_label: String,
    pub measurement: Measurement,
}

impl Verdict {
    pub fn pass(label: impl Into<String>) -> Self {
        Self::with_status(Status::Pass, label)
    }

    pub fn warning(label: impl Into<String>) -> Self {
        Self::with_status(Status::Warning, label)
    }

    pub fn fail(label: impl Into<String>) -> Self {
        Self::with_status(Status::Fail, label)
    }

    pub fn with_status(status: Status, label: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            result_label: label.into(),
            measurement: Measurement::None,
        }
    }

    pub fn reading(label: impl Into<String>, measurement: Measurement) -> Self {
        Self {
            status: None,
            result_label: label.into(),
            measurement,
        }
    }

    pub fn not_applicable(bears_status: bool) -> Self {
        Self {
            status: bears_status.then_some(Status::NotApplicable),
            result_label: "not applicable".to_string(),
            measurement: Measurement::None,
        }
    }

    pub fn measured(mut self, measurement: Measurement) -> Self {
        self.measurement = measurement;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatorFailure {
    #[error("evaluator panicked: {message}")]
    Panicked { message: String },
    #[error("evaluator exceeded its {budget_ms} ms budget")]
    TimedOut { budget_ms: u64 },
    #[error("evaluator unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("malformed input: {reason}")]
    Malformed { reason: String },
    #[error("evaluator broke its contract: {reason}")]
    ContractViolation { reason: String },
    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvaluatorFailure {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        EvaluatorFailure::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        EvaluatorFailure::Malformed {
            reason: reason.into(),
        }
    }
}

/// Verdict of another metric in the same category.
#[derive(Debug, Clone)]
pub struct PriorVerdict {
    pub metric_id: &'static str,
    pub verdict: Verdict,
}

static NEVER_CANCELLED: AtomicBool = AtomicBool::new(false);

pub struct EvaluationContext<'a> {
    pub bytes: &'a [u8],
    pub attributes: &'a SubjectAttributes,
    pub probe: &'a ContainerProbe,
    /// Filled only for cross-referential metrics.
    pub prior: &'a [PriorVerdict],
    cancel: &'a AtomicBool,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        bytes: &'a [u8],
        attributes: &'a SubjectAttributes,
        probe: &'a ContainerProbe,
    ) -> Self {
        Self {
            bytes,
            attributes,
            probe,
            prior: &[],
            cancel: &NEVER_CANCELLED,
        }
    }

    pub fn with_prior(mut self, prior: &'a [PriorVerdict]) -> Self {
        self.prior = prior;
        self
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Convenience for long-running evaluators polling between steps.
    pub fn check_cancelled(&self) -> Result<(), EvaluatorFailure> {
        if self.is_cancelled() {
            Err(EvaluatorFailure::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub trait Evaluator: Send + Sync {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure>;
}

impl<F> Evaluator for F
where
    F: Fn(&EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> + Send + Sync,
{
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
        self(ctx)
    }
}

/// Pins a closure to the evaluator signature so its types infer.
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> + Send + Sync,
{
    f
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Verdict(Verdict),
    Failed(EvaluatorFailure),
}

impl MetricOutcome {
    pub fn status(&self) -> Option<Status> {
        match self {
            MetricOutcome::Verdict(v) => v.status,
            MetricOutcome::Failed(_) => None,
        }
    }
}

/// Evaluate one metric under the contract: applicability is checked first,
/// panics become failures and the status shape must match the descriptor.
pub fn run_metric(
    descriptor: &MetricDescriptor,
    evaluator: &dyn Evaluator,
    ctx: &EvaluationContext<'_>,
) -> MetricOutcome {
    if !descriptor.applicability.applies(ctx.attributes, ctx.probe) {
        return MetricOutcome::Verdict(Verdict::not_applicable(descriptor.bears_status));
    }

    let result = catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(ctx)));
    let verdict = match result {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(failure)) => return MetricOutcome::Failed(failure),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            return MetricOutcome::Failed(EvaluatorFailure::Panicked { message });
        }
    };

    match (descriptor.bears_status, verdict.status) {
        (true, None) => MetricOutcome::Failed(EvaluatorFailure::ContractViolation {
            reason: "status-bearing metric returned no status".to_string(),
        }),
        (false, Some(_)) => MetricOutcome::Failed(EvaluatorFailure::ContractViolation {
            reason: "informational metric returned a status".to_string(),
        }),
        _ => MetricOutcome::Verdict(verdict),
    }
}

/// Metric id to evaluator mapping.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.evaluators.keys().collect();
        ids.sort();
        f.debug_struct("EvaluatorRegistry")
            .field("metrics", &ids)
            .finish()
    }
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric_id: impl Into<String>, evaluator: impl Evaluator + 'static) {
        self.evaluators.insert(metric_id.into(), Arc::new(evaluator));
    }

    pub fn with(mut self, metric_id: impl Into<String>, evaluator: impl Evaluator + 'static) -> Self {
        self.insert(metric_id, evaluator);
        self
    }

    pub fn get(&self, metric_id: &str) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(metric_id).cloned()
    }

    pub fn contains(&self, metric_id: &str) -> bool {
        self.evaluators.contains_key(metric_id)
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    /// Descriptors in `registry` that have no evaluator.
    pub fn missing_for(&self, registry: &MetricRegistry) -> Vec<&'static str> {
        registry
            .metrics()
            .iter()
            .filter(|m| !self.contains(m.id))
            .map(|m| m.id)
            .collect()
    }

    /// Attach the `Unavailable` placeholder to every descriptor lacking an evaluator.
    pub fn fill_placeholders(&mut self, registry: &MetricRegistry) {
        for id in self.missing_for(registry) {
            self.insert(id, builtin::Unavailable);
        }
    }
}

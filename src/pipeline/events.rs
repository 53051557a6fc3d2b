//! # Pipeline Events
//!
//! Progress reports sent from evaluation workers back to the coordinator of
//! the session that dispatched the job.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::evaluate::MetricOutcome;

#[derive(Debug)]
pub enum EvaluationEvent {
    /// A worker picked up the job; the per-evaluator budget starts now.
    /// Setting `worker` makes that worker exit once the job returns.
    Started {
        metric_id: &'static str,
        worker: Arc<AtomicBool>,
    },
    /// The evaluator returned, failed or was skipped because of cancellation.
    Finished {
        metric_id: &'static str,
        outcome: MetricOutcome,
    },
}

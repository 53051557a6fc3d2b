//! Built-in evaluators for the reference taxonomy.

use super::{EvaluationContext, Evaluator, EvaluatorFailure, EvaluatorRegistry, Verdict};
use super::{readings, structural};
use crate::registry::MetricRegistry;

pub(super) type EvalFn = fn(&EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure>;

/// Placeholder for metrics whose analysis is not implemented.
#[derive(Debug, Clone, Copy)]
pub struct Unavailable;

impl Evaluator for Unavailable {
    fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
        Err(EvaluatorFailure::unavailable("no analysis implemented for this metric"))
    }
}

/// Evaluators for every metric of [`MetricRegistry::reference`].
pub fn builtin_evaluators() -> EvaluatorRegistry {
    let mut evaluators = EvaluatorRegistry::new();
    for (id, eval) in structural::EVALUATORS.iter().chain(readings::EVALUATORS) {
        evaluators.insert(*id, *eval);
    }
    evaluators.fill_placeholders(MetricRegistry::reference());
    evaluators
}

/// Ids backed by a real evaluator rather than the placeholder.
pub fn implemented_metrics() -> impl Iterator<Item = &'static str> {
    structural::EVALUATORS
        .iter()
        .chain(readings::EVALUATORS)
        .map(|(id, _)| *id)
}

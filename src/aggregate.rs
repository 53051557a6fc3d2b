//! # Aggregation Engine
//!
//! Folds one outcome per registered metric into category scores, the overall
//! score, status counts and the report's category blocks.

use std::collections::HashMap;

use tracing::debug;

use crate::config::WeightConfig;
use crate::evaluate::{EvaluatorFailure, Measurement, MetricOutcome};
use crate::registry::{CategoryId, MetricDescriptor, MetricRegistry};
use crate::report::{CategoryReport, Diagnostic, MetricEntry, StatusCounts, Tier};

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub overall_score: u8,
    pub tier: Tier,
    pub status_counts: StatusCounts,
    pub degraded: bool,
    pub categories: Vec<CategoryReport>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn aggregate(
    registry: &MetricRegistry,
    outcomes: &HashMap<&'static str, MetricOutcome>,
    weights: &WeightConfig,
) -> Aggregation {
    let mut status_counts = StatusCounts::default();
    let mut diagnostics = Vec::new();
    let mut categories = Vec::with_capacity(registry.categories().len());
    let mut status_metrics = 0usize;
    let mut status_failures = 0usize;

    for category in registry.categories() {
        let status_bearing = registry.is_status_bearing(category.id);
        let mut sum = 0.0;
        let mut includable = 0usize;
        let mut metrics = Vec::new();

        for descriptor in registry.metrics_in(category.id) {
            let outcome = outcomes.get(descriptor.id).cloned().unwrap_or_else(|| {
                MetricOutcome::Failed(EvaluatorFailure::unavailable("no outcome recorded"))
            });
            if descriptor.bears_status {
                status_metrics += 1;
            }
            match &outcome {
                MetricOutcome::Verdict(verdict) => {
                    if let Some(status) = verdict.status.filter(|_| descriptor.bears_status) {
                        status_counts.record(status);
                        if let Some(weight) = status.weight() {
                            sum += weight;
                            includable += 1;
                        }
                    }
                }
                MetricOutcome::Failed(failure) => {
                    if descriptor.bears_status {
                        status_failures += 1;
                    }
                    diagnostics.push(Diagnostic {
                        metric_id: descriptor.id.to_string(),
                        failure: failure.clone(),
                    });
                }
            }
            metrics.push(entry(descriptor, outcome));
        }

        let score = (status_bearing && includable > 0).then(|| sum / includable as f64 * 100.0);
        categories.push(CategoryReport {
            id: category.id,
            label: category.label.to_string(),
            status_bearing,
            score,
            metrics,
        });
    }

    let degraded = status_metrics > 0 && status_failures == status_metrics;
    let overall_score = if degraded {
        0
    } else {
        overall(&categories, weights)
    };
    debug!(
        overall_score,
        degraded,
        failures = diagnostics.len(),
        "aggregated outcomes"
    );

    Aggregation {
        overall_score,
        tier: Tier::from_score(overall_score),
        status_counts,
        degraded,
        categories,
        diagnostics,
    }
}

/// Weighted mean of the defined status-bearing category scores.
fn overall(categories: &[CategoryReport], weights: &WeightConfig) -> u8 {
    let others = categories
        .iter()
        .filter(|c| c.status_bearing && c.id != CategoryId::Professional)
        .count();
    let weight_of = |id: CategoryId| {
        if id == CategoryId::Professional {
            weights.professional
        } else {
            (1.0 - weights.professional) / others as f64
        }
    };

    let defined: Vec<(f64, f64)> = categories
        .iter()
        .filter_map(|c| c.score.map(|s| (weight_of(c.id), s)))
        .collect();
    if defined.is_empty() {
        return 0;
    }
    let total_weight: f64 = defined.iter().map(|(w, _)| w).sum();
    let mean = if total_weight > 0.0 {
        defined.iter().map(|(w, s)| w * s).sum::<f64>() / total_weight
    } else {
        defined.iter().map(|(_, s)| s).sum::<f64>() / defined.len() as f64
    };
    mean.round().clamp(0.0, 100.0) as u8
}

fn entry(descriptor: &MetricDescriptor, outcome: MetricOutcome) -> MetricEntry {
    let base = MetricEntry {
        metric_id: descriptor.id.to_string(),
        label: descriptor.label.to_string(),
        description: descriptor.description.to_string(),
        status: None,
        result_label: String::new(),
        raw_measurement: Measurement::None,
        flagged: false,
        failure: None,
    };
    match outcome {
        MetricOutcome::Verdict(verdict) => MetricEntry {
            flagged: descriptor.adverse_when_true && verdict.measurement.as_bool() == Some(true),
            status: verdict.status,
            result_label: verdict.result_label,
            raw_measurement: verdict.measurement,
            ..base
        },
        MetricOutcome::Failed(failure) => MetricEntry {
            result_label: failure.to_string(),
            failure: Some(failure),
            ..base
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{Status, Verdict};
    use crate::registry::CategoryDescriptor;

    fn category(id: CategoryId) -> CategoryDescriptor {
        CategoryDescriptor {
            id,
            label: id.as_str(),
            description: "",
        }
    }

    fn small_registry() -> MetricRegistry {
        MetricRegistry::new(
            vec![
                category(CategoryId::Professional),
                category(CategoryId::Quality),
                category(CategoryId::Editing),
            ],
            vec![
                MetricDescriptor::status("professional.a", CategoryId::Professional, "A", ""),
                MetricDescriptor::status("professional.b", CategoryId::Professional, "B", ""),
                MetricDescriptor::status("quality.c", CategoryId::Quality, "C", ""),
                MetricDescriptor::reading("editing.d", CategoryId::Editing, "D", "").adverse(),
            ],
        )
        .expect("registry")
    }

    fn verdict(status: Status) -> MetricOutcome {
        MetricOutcome::Verdict(Verdict::with_status(status, "x"))
    }

    #[test]
    fn weighted_mean_over_defined_categories() {
        let registry = small_registry();
        let outcomes = HashMap::from([
            ("professional.a", verdict(Status::Pass)),
            ("professional.b", verdict(Status::Warning)),
            ("quality.c", verdict(Status::Fail)),
            (
                "editing.d",
                MetricOutcome::Verdict(Verdict::reading("no", Measurement::Bool(false))),
            ),
        ]);
        let agg = aggregate(&registry, &outcomes, &WeightConfig::default());
        // professional 75 * 0.6 + quality 0 * 0.4
        assert_eq!(agg.overall_score, 45);
        assert_eq!(agg.tier, Tier::LikelyNotOriginal);
        assert_eq!(agg.status_counts, StatusCounts { pass: 1, warning: 1, fail: 1 });
        assert_eq!(agg.categories[0].score, Some(75.0));
        assert_eq!(agg.categories[2].score, None);
        assert!(!agg.degraded);
    }

    #[test]
    fn undefined_category_is_renormalised_away() {
        let registry = small_registry();
        let outcomes = HashMap::from([
            ("professional.a", verdict(Status::Pass)),
            ("professional.b", verdict(Status::Pass)),
            ("quality.c", verdict(Status::NotApplicable)),
        ]);
        let agg = aggregate(&registry, &outcomes, &WeightConfig::default());
        assert_eq!(agg.categories[1].score, None);
        assert_eq!(agg.overall_score, 100);
        // editing.d had no outcome
        assert_eq!(agg.diagnostics.len(), 1);
        assert_eq!(agg.diagnostics[0].metric_id, "editing.d");
    }

    #[test]
    fn all_status_metrics_failed_is_degraded() {
        let registry = small_registry();
        let failed = || MetricOutcome::Failed(EvaluatorFailure::TimedOut { budget_ms: 10 });
        let outcomes = HashMap::from([
            ("professional.a", failed()),
            ("professional.b", failed()),
            ("quality.c", failed()),
            (
                "editing.d",
                MetricOutcome::Verdict(Verdict::reading("yes", Measurement::Bool(true))),
            ),
        ]);
        let agg = aggregate(&registry, &outcomes, &WeightConfig::default());
        assert!(agg.degraded);
        assert_eq!(agg.overall_score, 0);
        assert_eq!(agg.status_counts.total(), 0);
        assert_eq!(agg.diagnostics.len(), 3);
        let d = &agg.categories[2].metrics[0];
        assert!(d.flagged);
    }

    #[test]
    fn all_not_applicable_scores_zero_without_degrading() {
        let registry = small_registry();
        let outcomes = HashMap::from([
            ("professional.a", verdict(Status::NotApplicable)),
            ("professional.b", verdict(Status::NotApplicable)),
            ("quality.c", verdict(Status::NotApplicable)),
            (
                "editing.d",
                MetricOutcome::Verdict(Verdict::reading("no", Measurement::Bool(false))),
            ),
        ]);
        let agg = aggregate(&registry, &outcomes, &WeightConfig::default());
        assert_eq!(agg.overall_score, 0);
        assert!(!agg.degraded);
        assert!(agg.diagnostics.is_empty());
    }

    #[test]
    fn failed_entry_carries_failure_text() {
        let registry = small_registry();
        let outcomes = HashMap::from([(
            "professional.a",
            MetricOutcome::Failed(EvaluatorFailure::Panicked {
                message: "bad".into(),
            }),
        )]);
        let agg = aggregate(&registry, &outcomes, &WeightConfig::default());
        let entry = &agg.categories[0].metrics[0];
        assert_eq!(entry.status, None);
        assert_eq!(entry.result_label, "evaluator panicked: bad");
        assert!(entry.failure.is_some());
    }
}

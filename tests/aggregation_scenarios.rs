//! Aggregation over the reference taxonomy with hand-built outcomes.

use std::collections::HashMap;

use originscope::aggregate::aggregate;
use originscope::config::WeightConfig;
use originscope::evaluate::{EvaluatorFailure, Measurement, MetricOutcome, Status, Verdict};
use originscope::registry::{CategoryId, MetricRegistry};
use originscope::report::Tier;

/// Every reference metric gets a verdict: checks from `status`, readings empty.
fn outcomes_with(status: impl Fn(&str) -> Status) -> HashMap<&'static str, MetricOutcome> {
    MetricRegistry::reference()
        .metrics()
        .iter()
        .map(|m| {
            let verdict = if m.bears_status {
                Verdict::with_status(status(m.id), "scripted")
            } else {
                Verdict::reading("not recorded", Measurement::None)
            };
            (m.id, MetricOutcome::Verdict(verdict))
        })
        .collect()
}

#[test]
fn all_professional_checks_passing() {
    let registry = MetricRegistry::reference();
    let outcomes = outcomes_with(|_| Status::Pass);
    let agg = aggregate(registry, &outcomes, &WeightConfig::default());

    assert_eq!(agg.status_counts.pass, 14);
    assert_eq!(agg.status_counts.warning, 0);
    assert_eq!(agg.status_counts.fail, 0);
    assert!(agg.overall_score >= 90);
    assert_eq!(agg.tier, Tier::LikelyOriginal);
    assert!(!agg.degraded);
    assert!(agg.diagnostics.is_empty());
}

#[test]
fn categories_follow_registry_order() {
    let agg = aggregate(
        MetricRegistry::reference(),
        &outcomes_with(|_| Status::Pass),
        &WeightConfig::default(),
    );
    let ids: Vec<CategoryId> = agg.categories.iter().map(|c| c.id).collect();
    assert_eq!(
        ids,
        vec![
            CategoryId::Professional,
            CategoryId::Exif,
            CategoryId::Quality,
            CategoryId::Compression,
            CategoryId::Editing,
            CategoryId::Advanced,
            CategoryId::File,
        ]
    );
    let total: usize = agg.categories.iter().map(|c| c.metrics.len()).sum();
    assert_eq!(total, 74);
    // only the professional block carries a score
    for category in &agg.categories {
        assert_eq!(category.score.is_some(), category.id == CategoryId::Professional);
    }
}

#[test]
fn warnings_and_failures_lower_the_tier() {
    let registry = MetricRegistry::reference();
    let failing = [
        "professional.exif_format_validation",
        "professional.third_party_software_data",
        "professional.exif_internal_consistency",
    ];
    let outcomes = outcomes_with(|id| {
        if failing.contains(&id) {
            Status::Fail
        } else if id == "professional.embedded_thumbnail_consistency" {
            Status::Warning
        } else {
            Status::Pass
        }
    });
    let agg = aggregate(registry, &outcomes, &WeightConfig::default());

    assert_eq!(agg.status_counts.fail, 3);
    assert_eq!(agg.status_counts.warning, 1);
    assert_eq!(agg.status_counts.pass, 10);
    // (10 + 0.5) / 14
    assert_eq!(agg.overall_score, 75);
    assert_eq!(agg.tier, Tier::PossiblyProcessed);
}

#[test]
fn not_applicable_checks_leave_the_denominator() {
    let registry = MetricRegistry::reference();
    let outcomes = outcomes_with(|id| match id {
        "professional.mpf_data_integrity"
        | "professional.flashpix_ready_data"
        | "professional.apple_arot_data" => Status::NotApplicable,
        "professional.histogram_integrity" => Status::Fail,
        _ => Status::Pass,
    });
    let agg = aggregate(registry, &outcomes, &WeightConfig::default());

    // 10 of 11 counted checks pass
    assert_eq!(agg.overall_score, 91);
    assert_eq!(agg.status_counts.total(), 11);
}

#[test]
fn every_check_not_applicable_scores_zero_without_degrading() {
    let agg = aggregate(
        MetricRegistry::reference(),
        &outcomes_with(|_| Status::NotApplicable),
        &WeightConfig::default(),
    );
    assert_eq!(agg.overall_score, 0);
    assert!(!agg.degraded);
    let professional = &agg.categories[0];
    assert!(professional.score.is_none());
}

#[test]
fn every_check_failing_to_evaluate_is_degraded() {
    let registry = MetricRegistry::reference();
    let mut outcomes = outcomes_with(|_| Status::Pass);
    for metric in registry.metrics_in(CategoryId::Professional) {
        outcomes.insert(
            metric.id,
            MetricOutcome::Failed(EvaluatorFailure::unavailable("decoder missing")),
        );
    }
    let agg = aggregate(registry, &outcomes, &WeightConfig::default());

    assert!(agg.degraded);
    assert_eq!(agg.overall_score, 0);
    assert_eq!(agg.tier, Tier::LikelyNotOriginal);
    assert_eq!(agg.diagnostics.len(), 14);
    assert_eq!(agg.status_counts.total(), 0);
}

#[test]
fn missing_outcomes_are_reported_as_failures() {
    let registry = MetricRegistry::reference();
    let mut outcomes = outcomes_with(|_| Status::Pass);
    outcomes.remove("exif.lens");
    let agg = aggregate(registry, &outcomes, &WeightConfig::default());

    assert_eq!(agg.diagnostics.len(), 1);
    assert_eq!(agg.diagnostics[0].metric_id, "exif.lens");
    let exif = agg
        .categories
        .iter()
        .find(|c| c.id == CategoryId::Exif)
        .expect("exif block");
    let lens = exif
        .metrics
        .iter()
        .find(|m| m.metric_id == "exif.lens")
        .expect("lens entry");
    assert!(lens.failure.is_some());
    // readings never move the score
    assert_eq!(agg.overall_score, 100);
}

#[test]
fn adverse_editing_readings_are_flagged() {
    let registry = MetricRegistry::reference();
    let mut outcomes = outcomes_with(|_| Status::Pass);
    outcomes.insert(
        "editing.resized",
        MetricOutcome::Verdict(Verdict::reading("yes", Measurement::Bool(true))),
    );
    outcomes.insert(
        "editing.cropped",
        MetricOutcome::Verdict(Verdict::reading("no", Measurement::Bool(false))),
    );
    let agg = aggregate(registry, &outcomes, &WeightConfig::default());

    let editing = agg
        .categories
        .iter()
        .find(|c| c.id == CategoryId::Editing)
        .expect("editing block");
    let flagged: Vec<&str> = editing
        .metrics
        .iter()
        .filter(|m| m.flagged)
        .map(|m| m.metric_id.as_str())
        .collect();
    assert_eq!(flagged, vec!["editing.resized"]);
    assert_eq!(agg.overall_score, 100);
}

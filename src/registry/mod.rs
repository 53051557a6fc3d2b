//! # Metric Registry
//!
//! Static catalog of metric descriptors grouped into ordered categories. The
//! registry is pure data: evaluators are attached separately through
//! [`crate::evaluate::EvaluatorRegistry`].

mod taxonomy;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probe::{ContainerFormat, ContainerProbe};
use crate::subject::SubjectAttributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryId {
    Professional,
    Exif,
    Quality,
    Compression,
    Editing,
    Advanced,
    File,
}

impl CategoryId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryId::Professional => "professional",
            CategoryId::Exif => "exif",
            CategoryId::Quality => "quality",
            CategoryId::Compression => "compression",
            CategoryId::Editing => "editing",
            CategoryId::Advanced => "advanced",
            CategoryId::File => "file",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryDescriptor {
    pub id: CategoryId,
    pub label: &'static str,
    pub description: &'static str,
}

/// Rule deciding whether a metric can run for a given file.
#[derive(Debug, Clone, Copy)]
pub enum Applicability {
    Always,
    Jpeg,
    ExifPresent,
    MpfPresent,
    FlashPixPresent,
    AppleDevice,
    Custom(fn(&SubjectAttributes, &ContainerProbe) -> bool),
}

impl Applicability {
    pub fn applies(&self, attributes: &SubjectAttributes, probe: &ContainerProbe) -> bool {
        match self {
            Applicability::Always => true,
            Applicability::Jpeg => probe.format == ContainerFormat::Jpeg,
            Applicability::ExifPresent => probe.exif().is_some(),
            Applicability::MpfPresent => probe.jpeg.as_ref().is_some_and(|j| j.mpf.is_some()),
            Applicability::FlashPixPresent => probe.jpeg.as_ref().is_some_and(|j| j.flashpix),
            Applicability::AppleDevice => probe
                .camera_make()
                .is_some_and(|make| make.trim().eq_ignore_ascii_case("apple")),
            Applicability::Custom(rule) => rule(attributes, probe),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub id: &'static str,
    pub category: CategoryId,
    pub label: &'static str,
    pub description: &'static str,
    pub bears_status: bool,
    pub applicability: Applicability,
    /// Receives the verdicts of its own category, after they complete.
    pub cross_referential: bool,
    /// A `true` reading is semantically adverse (editing-trace style flags).
    pub adverse_when_true: bool,
}

impl MetricDescriptor {
    /// A metric producing pass/warning/fail/not_applicable.
    pub const fn status(
        id: &'static str,
        category: CategoryId,
        label: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            category,
            label,
            description,
            bears_status: true,
            applicability: Applicability::Always,
            cross_referential: false,
            adverse_when_true: false,
        }
    }

    /// A purely informational reading.
    pub const fn reading(
        id: &'static str,
        category: CategoryId,
        label: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            bears_status: false,
            ..Self::status(id, category, label, description)
        }
    }

    pub const fn when(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub const fn cross_referential(mut self) -> Self {
        self.cross_referential = true;
        self
    }

    pub const fn adverse(mut self) -> Self {
        self.adverse_when_true = true;
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate category: {0}")]
    DuplicateCategory(&'static str),
    #[error("duplicate metric id: {0}")]
    DuplicateMetric(&'static str),
    #[error("metric {metric} references undeclared category {category}")]
    UnknownCategory {
        metric: &'static str,
        category: &'static str,
    },
    #[error("registry declares no metrics")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct MetricRegistry {
    categories: Vec<CategoryDescriptor>,
    metrics: Vec<MetricDescriptor>,
    index: HashMap<&'static str, usize>,
}

static REFERENCE: Lazy<MetricRegistry> = Lazy::new(|| {
    MetricRegistry::new(taxonomy::categories(), taxonomy::metrics())
        .unwrap_or_else(|err| panic!("reference taxonomy is inconsistent: {err}"))
});

impl MetricRegistry {
    /// Validate and build a registry. Metrics are kept in declaration order.
    pub fn new(
        categories: Vec<CategoryDescriptor>,
        metrics: Vec<MetricDescriptor>,
    ) -> Result<Self, RegistryError> {
        if metrics.is_empty() {
            return Err(RegistryError::Empty);
        }
        for (i, cat) in categories.iter().enumerate() {
            if categories[..i].iter().any(|c| c.id == cat.id) {
                return Err(RegistryError::DuplicateCategory(cat.id.as_str()));
            }
        }
        let mut index = HashMap::with_capacity(metrics.len());
        for (i, metric) in metrics.iter().enumerate() {
            if !categories.iter().any(|c| c.id == metric.category) {
                return Err(RegistryError::UnknownCategory {
                    metric: metric.id,
                    category: metric.category.as_str(),
                });
            }
            if index.insert(metric.id, i).is_some() {
                return Err(RegistryError::DuplicateMetric(metric.id));
            }
        }
        Ok(Self {
            categories,
            metrics,
            index,
        })
    }

    /// The built-in taxonomy: seven categories, 74 metrics.
    pub fn reference() -> &'static MetricRegistry {
        &REFERENCE
    }

    pub fn categories(&self) -> &[CategoryDescriptor] {
        &self.categories
    }

    pub fn metrics(&self) -> &[MetricDescriptor] {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MetricDescriptor> {
        self.index.get(id).map(|i| &self.metrics[*i])
    }

    pub fn category(&self, id: CategoryId) -> Option<&CategoryDescriptor> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn metrics_in(&self, category: CategoryId) -> impl Iterator<Item = &MetricDescriptor> {
        self.metrics.iter().filter(move |m| m.category == category)
    }

    /// A category is status-bearing when any of its metrics bears status.
    pub fn is_status_bearing(&self, category: CategoryId) -> bool {
        self.metrics_in(category).any(|m| m.bears_status)
    }
}

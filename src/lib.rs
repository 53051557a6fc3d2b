//! Image originality analysis: a registry of forensic metrics, pluggable
//! evaluators, verdict aggregation and a cancellable single-session lifecycle.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod evaluate;
pub mod logging;
pub mod pipeline;
pub mod probe;
pub mod registry;
pub mod report;
pub mod subject;

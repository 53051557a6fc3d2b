//! # Pipeline Module
//!
//! The analysis lifecycle controller. One session is live at a time; each
//! session runs on its own coordinator thread that loads the subject,
//! dispatches metric jobs to the shared worker pool, enforces the time budgets
//! and publishes the aggregated report.

pub mod events;
pub mod workers;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::config::{Config, ConfigError};
use crate::evaluate::builtin::builtin_evaluators;
use crate::evaluate::{EvaluatorFailure, EvaluatorRegistry, MetricOutcome, PriorVerdict};
use crate::probe::ContainerProbe;
use crate::registry::{MetricDescriptor, MetricRegistry, RegistryError};
use crate::report::{AnalysisReport, REPORT_SCHEMA_VERSION, SubjectInfo};
use crate::subject::{AdmissionError, LoadedSubject, SubjectAttributes, Submission};

use events::EvaluationEvent;
use workers::{EvaluationJob, PreparedSubject};

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Analyzing,
    Ready,
}

impl Phase {
    /// A session is still working toward a report.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Loading | Phase::Analyzing)
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("no evaluator registered for: {}", .0.join(", "))]
    MissingEvaluators(Vec<&'static str>),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error("no report within {0:?}")]
    TimedOut(Duration),
    #[error("session {0} was superseded or reset before completing")]
    Superseded(SessionId),
}

struct Session {
    id: SessionId,
    bytes: Arc<[u8]>,
    cancel: Arc<AtomicBool>,
    coordinator: Option<thread::JoinHandle<()>>,
}

impl Session {
    fn retire(mut self, retired: &mut Vec<thread::JoinHandle<()>>) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.coordinator.take() {
            retired.push(handle);
        }
    }
}

struct ControllerState {
    phase: Phase,
    session: Option<Session>,
    report: Option<Arc<AnalysisReport>>,
    job_tx: Option<Sender<EvaluationJob>>,
    workers: Vec<thread::JoinHandle<()>>,
    retired: Vec<thread::JoinHandle<()>>,
}

struct Shared {
    config: Config,
    registry: Arc<MetricRegistry>,
    evaluators: EvaluatorRegistry,
    job_rx: Receiver<EvaluationJob>,
    state: Mutex<ControllerState>,
    changed: Condvar,
    next_session: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the worker stuck in an abandoned job and keep the pool at size.
    fn replace_worker(&self, worker: &AtomicBool) {
        worker.store(true, Ordering::Relaxed);
        let mut state = self.lock();
        if state.job_tx.is_none() {
            return;
        }
        state.workers.retain(|h| !h.is_finished());
        state
            .workers
            .push(workers::spawn_evaluation_worker(self.job_rx.clone()));
        debug!(workers = state.workers.len(), "replacement worker spawned");
    }
}

pub struct AnalysisController {
    shared: Arc<Shared>,
}

impl AnalysisController {
    /// Build a controller and start its worker pool. Every registered metric
    /// must have an evaluator.
    pub fn new(
        config: Config,
        registry: Arc<MetricRegistry>,
        evaluators: EvaluatorRegistry,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let missing = evaluators.missing_for(&registry);
        if !missing.is_empty() {
            return Err(SetupError::MissingEvaluators(missing));
        }

        let workers = config.effective_workers();
        let (job_tx, job_rx) = unbounded::<EvaluationJob>();
        let handles = workers::spawn_evaluation_workers(workers, job_rx.clone());
        info!(
            workers,
            metrics = registry.len(),
            "analysis controller started"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                registry,
                evaluators,
                job_rx,
                state: Mutex::new(ControllerState {
                    phase: Phase::Idle,
                    session: None,
                    report: None,
                    job_tx: Some(job_tx),
                    workers: handles,
                    retired: Vec::new(),
                }),
                changed: Condvar::new(),
                next_session: AtomicU64::new(0),
            }),
        })
    }

    /// Controller over the reference taxonomy and the built-in evaluators.
    pub fn with_builtins(config: Config) -> Result<Self, SetupError> {
        Self::new(
            config,
            Arc::new(MetricRegistry::reference().clone()),
            builtin_evaluators(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.shared.registry
    }

    /// Validate and install a new session, cancelling whatever was running.
    /// A rejected submission leaves the controller untouched.
    pub fn admit(&self, submission: Submission) -> Result<SessionId, AdmissionError> {
        if let Err(err) = submission.validate(self.shared.config.max_file_size_bytes) {
            warn!(file_name = %submission.attributes.file_name, "submission rejected: {err}");
            return Err(err);
        }

        let mut state = self.shared.lock();
        let Some(job_tx) = state.job_tx.clone() else {
            return Err(AdmissionError::ShutDown);
        };

        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let Submission { bytes, attributes } = submission;
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let cancel = Arc::new(AtomicBool::new(false));

        let ControllerState {
            session, retired, ..
        } = &mut *state;
        if let Some(old) = session.take() {
            info!(session_id = old.id, superseded_by = id, "cancelling active session");
            old.retire(retired);
        }
        retired.retain(|h| !h.is_finished());

        info!(
            session_id = id,
            file_name = %attributes.file_name,
            size = bytes.len(),
            "subject admitted"
        );
        let run = SessionRun {
            shared: self.shared.clone(),
            id,
            bytes: bytes.clone(),
            attributes,
            cancel: cancel.clone(),
            job_tx,
        };
        let coordinator = thread::spawn(move || run.execute());

        state.session = Some(Session {
            id,
            bytes,
            cancel,
            coordinator: Some(coordinator),
        });
        state.report = None;
        state.phase = Phase::Loading;
        self.shared.changed.notify_all();
        Ok(id)
    }

    /// Cancel outstanding work and drop the session and its bytes.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        let ControllerState {
            session, retired, ..
        } = &mut *state;
        if let Some(old) = session.take() {
            info!(session_id = old.id, "session reset");
            old.retire(retired);
        }
        state.report = None;
        state.phase = Phase::Idle;
        self.shared.changed.notify_all();
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    pub fn current_report(&self) -> Option<Arc<AnalysisReport>> {
        self.shared.lock().report.clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.lock().session.as_ref().map(|s| s.id)
    }

    pub fn subject_bytes(&self) -> Option<Arc<[u8]>> {
        self.shared.lock().session.as_ref().map(|s| s.bytes.clone())
    }

    /// Block until the live session publishes, the controller goes idle or
    /// `timeout` elapses.
    pub fn wait_for_report(&self, timeout: Duration) -> Option<Arc<AnalysisReport>> {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| s.phase.is_active())
            .unwrap_or_else(PoisonError::into_inner);
        state.report.clone()
    }

    /// Block until no session is Loading or Analyzing; returns the phase reached.
    pub fn wait_until_settled(&self, timeout: Duration) -> Phase {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| s.phase.is_active())
            .unwrap_or_else(PoisonError::into_inner);
        state.phase
    }

    /// Admit `submission` and wait for its report.
    pub fn analyze(
        &self,
        submission: Submission,
        timeout: Duration,
    ) -> Result<Arc<AnalysisReport>, AnalysisError> {
        let id = self.admit(submission)?;
        match self.wait_for_report(timeout) {
            Some(report) if report.session_id == id => Ok(report),
            Some(_) => Err(AnalysisError::Superseded(id)),
            None if self.session_id() == Some(id) => Err(AnalysisError::TimedOut(timeout)),
            None => Err(AnalysisError::Superseded(id)),
        }
    }

    /// Cancel the live session, close the worker pool and join the threads
    /// that exit within the evaluator budget. Idempotent.
    pub fn shutdown(&self) {
        let (workers, retired) = {
            let mut state = self.shared.lock();
            let Some(job_tx) = state.job_tx.take() else {
                return;
            };
            drop(job_tx);
            let ControllerState {
                session, retired, ..
            } = &mut *state;
            if let Some(old) = session.take() {
                old.retire(retired);
            }
            state.report = None;
            state.phase = Phase::Idle;
            self.shared.changed.notify_all();
            (
                std::mem::take(&mut state.workers),
                std::mem::take(&mut state.retired),
            )
        };

        let deadline = Instant::now() + self.shared.config.evaluator_timeout();
        let mut detached = 0usize;
        for handle in retired.into_iter().chain(workers) {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(self.shared.config.poll_interval());
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                detached += 1;
            }
        }
        if detached > 0 {
            warn!(detached, "threads still busy at shutdown were detached");
        }
        info!("analysis controller shut down");
    }
}

impl Drop for AnalysisController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A job a worker has picked up.
struct Running {
    since: Instant,
    worker: Arc<AtomicBool>,
}

/// Everything a coordinator thread needs for one session.
struct SessionRun {
    shared: Arc<Shared>,
    id: SessionId,
    bytes: Arc<[u8]>,
    attributes: SubjectAttributes,
    cancel: Arc<AtomicBool>,
    job_tx: Sender<EvaluationJob>,
}

impl SessionRun {
    fn execute(self) {
        let started = Instant::now();
        let subject = LoadedSubject::new(self.bytes.clone(), self.attributes.clone());
        let probe = ContainerProbe::inspect(&subject.bytes);
        debug!(
            session_id = self.id,
            format = probe.format.name(),
            "subject loaded"
        );
        let prepared = Arc::new(PreparedSubject { subject, probe });

        if !self.advance(Phase::Loading, Phase::Analyzing) {
            return;
        }

        let Some(outcomes) = self.evaluate_all(&prepared) else {
            debug!(session_id = self.id, "session cancelled during analysis");
            return;
        };

        let agg = aggregate(&self.shared.registry, &outcomes, &self.shared.config.weights);
        let subject = &prepared.subject;
        let report = AnalysisReport {
            schema_version: REPORT_SCHEMA_VERSION,
            session_id: self.id,
            timestamp: Utc::now(),
            subject: SubjectInfo {
                file_name: subject.attributes.file_name.clone(),
                file_size_bytes: subject.attributes.file_size_bytes,
                mime_type: subject.attributes.mime_type.clone(),
                last_modified: subject.attributes.last_modified,
                sha256: subject.sha256.clone(),
                md5: subject.md5.clone(),
            },
            overall_score: agg.overall_score,
            tier: agg.tier,
            status_counts: agg.status_counts,
            degraded: agg.degraded,
            categories: agg.categories,
            diagnostics: agg.diagnostics,
        };
        self.publish(report, started.elapsed());
    }

    fn is_current(&self, state: &ControllerState) -> bool {
        !self.cancel.load(Ordering::Relaxed)
            && state.session.as_ref().is_some_and(|s| s.id == self.id)
    }

    fn advance(&self, from: Phase, to: Phase) -> bool {
        let mut state = self.shared.lock();
        if !self.is_current(&state) || state.phase != from {
            return false;
        }
        state.phase = to;
        self.shared.changed.notify_all();
        true
    }

    fn publish(&self, report: AnalysisReport, elapsed: Duration) {
        let mut state = self.shared.lock();
        if !self.is_current(&state) || state.phase != Phase::Analyzing {
            debug!(session_id = self.id, "discarding report of a stale session");
            return;
        }
        info!(
            session_id = self.id,
            overall_score = report.overall_score,
            tier = report.tier.label(),
            degraded = report.degraded,
            failures = report.diagnostics.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "report published"
        );
        state.report = Some(Arc::new(report));
        state.phase = Phase::Ready;
        self.shared.changed.notify_all();
    }

    /// Run the first wave, then cross-referential metrics with the first
    /// wave's verdicts. `None` when the session was cancelled.
    fn evaluate_all(
        &self,
        prepared: &Arc<PreparedSubject>,
    ) -> Option<HashMap<&'static str, MetricOutcome>> {
        let registry = &self.shared.registry;
        let deadline = Instant::now() + self.shared.config.analysis_timeout();
        let mut outcomes = HashMap::with_capacity(registry.len());

        let (second, first): (Vec<&MetricDescriptor>, Vec<&MetricDescriptor>) = registry
            .metrics()
            .iter()
            .partition(|m| m.cross_referential);

        self.run_wave(&first, prepared, &mut outcomes, deadline)?;
        if !second.is_empty() {
            self.run_wave(&second, prepared, &mut outcomes, deadline)?;
        }
        Some(outcomes)
    }

    fn run_wave(
        &self,
        wave: &[&MetricDescriptor],
        prepared: &Arc<PreparedSubject>,
        outcomes: &mut HashMap<&'static str, MetricOutcome>,
        deadline: Instant,
    ) -> Option<()> {
        let (event_tx, event_rx) = unbounded::<EvaluationEvent>();
        // None until a worker reports Started
        let mut pending: HashMap<&'static str, Option<Running>> = HashMap::new();

        for descriptor in wave {
            let Some(evaluator) = self.shared.evaluators.get(descriptor.id) else {
                outcomes.insert(
                    descriptor.id,
                    MetricOutcome::Failed(EvaluatorFailure::unavailable("no evaluator registered")),
                );
                continue;
            };
            let prior = if descriptor.cross_referential {
                prior_verdicts(&self.shared.registry, descriptor, outcomes)
            } else {
                Vec::new()
            };
            let job = EvaluationJob {
                session_id: self.id,
                descriptor: (*descriptor).clone(),
                evaluator,
                prepared: prepared.clone(),
                prior,
                cancel: self.cancel.clone(),
                events: event_tx.clone(),
            };
            if self.job_tx.send(job).is_err() {
                outcomes.insert(
                    descriptor.id,
                    MetricOutcome::Failed(EvaluatorFailure::unavailable("worker pool shut down")),
                );
                continue;
            }
            pending.insert(descriptor.id, None);
        }
        drop(event_tx);

        self.collect(event_rx, pending, outcomes, deadline)
    }

    fn collect(
        &self,
        event_rx: Receiver<EvaluationEvent>,
        mut pending: HashMap<&'static str, Option<Running>>,
        outcomes: &mut HashMap<&'static str, MetricOutcome>,
        deadline: Instant,
    ) -> Option<()> {
        let config = &self.shared.config;
        let budget = config.evaluator_timeout();

        while !pending.is_empty() {
            if self.cancel.load(Ordering::Relaxed) {
                // evaluators that ignore cancellation must not keep their workers
                for running in pending.into_values().flatten() {
                    self.shared.replace_worker(&running.worker);
                }
                return None;
            }

            match event_rx.recv_timeout(config.poll_interval()) {
                Ok(EvaluationEvent::Started { metric_id, worker }) => {
                    if let Some(slot) = pending.get_mut(metric_id) {
                        *slot = Some(Running {
                            since: Instant::now(),
                            worker,
                        });
                    }
                }
                Ok(EvaluationEvent::Finished { metric_id, outcome }) => {
                    // a result for an already force-failed metric is late and ignored
                    if pending.remove(metric_id).is_some() {
                        outcomes.insert(metric_id, outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    for (metric_id, _) in pending.drain() {
                        outcomes.insert(
                            metric_id,
                            MetricOutcome::Failed(EvaluatorFailure::unavailable(
                                "worker exited without reporting",
                            )),
                        );
                    }
                    break;
                }
            }

            let now = Instant::now();
            let overdue: Vec<&'static str> = pending
                .iter()
                .filter(|(_, running)| {
                    running
                        .as_ref()
                        .is_some_and(|r| now.duration_since(r.since) >= budget)
                })
                .map(|(id, _)| *id)
                .collect();
            for metric_id in overdue {
                warn!(session_id = self.id, metric_id, "evaluator exceeded its budget");
                if let Some(Some(running)) = pending.remove(metric_id) {
                    self.shared.replace_worker(&running.worker);
                }
                outcomes.insert(
                    metric_id,
                    MetricOutcome::Failed(EvaluatorFailure::TimedOut {
                        budget_ms: config.evaluator_timeout_ms,
                    }),
                );
            }

            if now >= deadline && !pending.is_empty() {
                warn!(
                    session_id = self.id,
                    remaining = pending.len(),
                    "analysis budget exhausted"
                );
                // queued jobs find the wave closed and skip themselves
                for (metric_id, running) in pending.drain() {
                    if let Some(running) = running {
                        self.shared.replace_worker(&running.worker);
                    }
                    outcomes.insert(
                        metric_id,
                        MetricOutcome::Failed(EvaluatorFailure::TimedOut {
                            budget_ms: config.analysis_timeout_ms,
                        }),
                    );
                }
            }
        }

        if self.cancel.load(Ordering::Relaxed) {
            return None;
        }
        Some(())
    }
}

/// Verdicts already produced for the other metrics of `descriptor`'s category.
fn prior_verdicts(
    registry: &MetricRegistry,
    descriptor: &MetricDescriptor,
    outcomes: &HashMap<&'static str, MetricOutcome>,
) -> Vec<PriorVerdict> {
    registry
        .metrics_in(descriptor.category)
        .filter(|m| m.id != descriptor.id)
        .filter_map(|m| match outcomes.get(m.id) {
            Some(MetricOutcome::Verdict(verdict)) => Some(PriorVerdict {
                metric_id: m.id,
                verdict: verdict.clone(),
            }),
            _ => None,
        })
        .collect()
}

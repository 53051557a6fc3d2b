//! # Pipeline Workers
//!
//! The shared evaluation pool. Workers outlive sessions: each job carries the
//! subject, cancellation flag and event channel of the session it belongs to.
//!
//! A coordinator that gives up on a running job releases the worker through
//! the flag sent with `Started` and spawns a replacement, so a hung evaluator
//! costs one detached thread instead of a pool slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use crate::evaluate::{
    EvaluationContext, Evaluator, EvaluatorFailure, MetricOutcome, PriorVerdict, run_metric,
};
use crate::probe::ContainerProbe;
use crate::registry::MetricDescriptor;
use crate::subject::LoadedSubject;

use super::events::EvaluationEvent;

/// Subject after Loading: digests computed and container decoded.
#[derive(Debug)]
pub struct PreparedSubject {
    pub subject: LoadedSubject,
    pub probe: ContainerProbe,
}

/// One metric evaluation for one session.
pub struct EvaluationJob {
    pub session_id: u64,
    pub descriptor: MetricDescriptor,
    pub evaluator: Arc<dyn Evaluator>,
    pub prepared: Arc<PreparedSubject>,
    pub prior: Vec<PriorVerdict>,
    pub cancel: Arc<AtomicBool>,
    pub events: Sender<EvaluationEvent>,
}

impl EvaluationJob {
    fn run(self, released: &Arc<AtomicBool>) {
        let metric_id = self.descriptor.id;
        if self.cancel.load(Ordering::Relaxed) {
            let _ = self.events.send(EvaluationEvent::Finished {
                metric_id,
                outcome: MetricOutcome::Failed(EvaluatorFailure::Cancelled),
            });
            return;
        }
        // the coordinator stopped collecting this wave; nobody wants the result
        let started = EvaluationEvent::Started {
            metric_id,
            worker: released.clone(),
        };
        if self.events.send(started).is_err() {
            debug!(session_id = self.session_id, metric_id, "wave closed, job skipped");
            return;
        }

        let prepared = &self.prepared;
        let ctx = EvaluationContext::new(
            &prepared.subject.bytes,
            &prepared.subject.attributes,
            &prepared.probe,
        )
        .with_prior(&self.prior)
        .with_cancel(&self.cancel);
        let outcome = run_metric(&self.descriptor, self.evaluator.as_ref(), &ctx);
        debug!(
            session_id = self.session_id,
            metric_id,
            failed = matches!(outcome, MetricOutcome::Failed(_)),
            "metric evaluated"
        );
        let _ = self
            .events
            .send(EvaluationEvent::Finished { metric_id, outcome });
    }
}

/// Spawn one evaluation worker. It exits once every job sender is dropped, or
/// after the job it was released from returns.
pub fn spawn_evaluation_worker(rx: Receiver<EvaluationJob>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let released = Arc::new(AtomicBool::new(false));
        for job in rx.iter() {
            job.run(&released);
            if released.load(Ordering::Relaxed) {
                debug!("released worker exiting");
                break;
            }
        }
    })
}

/// Spawn the evaluation worker threads.
pub fn spawn_evaluation_workers(
    workers: usize,
    rx: Receiver<EvaluationJob>,
) -> Vec<thread::JoinHandle<()>> {
    (0..workers.max(1))
        .map(|_| spawn_evaluation_worker(rx.clone()))
        .collect()
}

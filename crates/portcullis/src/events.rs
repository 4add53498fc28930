//! Outcome events emitted by the decider.
//!
//! The decider reports every terminal outcome to an [`EventSink`]; sinks
//! log, count, or fan out. Decision logic never depends on them.

use portcullis_common::{ChallengeOutcome, ChallengeStats, GrantOutcome, VerificationVerdict};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::protocol::TokenCarrier;

/// What happened to one login attempt
#[derive(Debug, Clone)]
pub struct ChallengeEvent {
    pub identifier: String,
    pub outcome: ChallengeOutcome,
    /// Failure count read at decision time
    pub failure_count: u32,
    pub carrier: Option<TokenCarrier>,
    pub verdict: Option<VerificationVerdict>,
    /// None when the pipeline was not invoked or did not answer
    pub grant: Option<GrantOutcome>,
}

/// Receiver of decider outcomes
pub trait EventSink: Send + Sync {
    fn on_outcome(&self, event: &ChallengeEvent);
}

/// Logs every outcome through `tracing`
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_outcome(&self, event: &ChallengeEvent) {
        match event.outcome {
            ChallengeOutcome::NotRequired => tracing::debug!(
                identifier = %event.identifier,
                outcome = %event.outcome,
                failure_count = event.failure_count,
                grant = ?event.grant,
                "Login attempt passed through"
            ),
            ChallengeOutcome::ChallengeSucceeded => tracing::info!(
                identifier = %event.identifier,
                outcome = %event.outcome,
                carrier = ?event.carrier,
                verdict = ?event.verdict,
                grant = ?event.grant,
                "Challenge passed"
            ),
            ChallengeOutcome::ChallengeFailed | ChallengeOutcome::ChallengeIssued => tracing::warn!(
                identifier = %event.identifier,
                outcome = %event.outcome,
                failure_count = event.failure_count,
                carrier = ?event.carrier,
                "Challenge demanded"
            ),
        }
    }
}

/// Atomic challenge counters, exposed on `/metrics`
#[derive(Default)]
pub struct ChallengeMetrics {
    not_required: AtomicU64,
    issued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    /// 0 = none yet, otherwise `encode(outcome)`
    last_outcome: AtomicU8,
}

impl ChallengeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ChallengeStats {
        ChallengeStats {
            not_required: self.not_required.load(Ordering::Relaxed),
            challenges_issued: self.issued.load(Ordering::Relaxed),
            challenges_succeeded: self.succeeded.load(Ordering::Relaxed),
            challenges_failed: self.failed.load(Ordering::Relaxed),
            last_outcome: decode(self.last_outcome.load(Ordering::Relaxed)),
        }
    }

    pub fn last_outcome(&self) -> Option<ChallengeOutcome> {
        decode(self.last_outcome.load(Ordering::Relaxed))
    }
}

impl EventSink for ChallengeMetrics {
    fn on_outcome(&self, event: &ChallengeEvent) {
        let counter = match event.outcome {
            ChallengeOutcome::NotRequired => &self.not_required,
            ChallengeOutcome::ChallengeIssued => &self.issued,
            ChallengeOutcome::ChallengeSucceeded => &self.succeeded,
            ChallengeOutcome::ChallengeFailed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.last_outcome.store(encode(event.outcome), Ordering::Relaxed);
    }
}

fn encode(outcome: ChallengeOutcome) -> u8 {
    match outcome {
        ChallengeOutcome::NotRequired => 1,
        ChallengeOutcome::ChallengeSucceeded => 2,
        ChallengeOutcome::ChallengeFailed => 3,
        ChallengeOutcome::ChallengeIssued => 4,
    }
}

fn decode(raw: u8) -> Option<ChallengeOutcome> {
    match raw {
        1 => Some(ChallengeOutcome::NotRequired),
        2 => Some(ChallengeOutcome::ChallengeSucceeded),
        3 => Some(ChallengeOutcome::ChallengeFailed),
        4 => Some(ChallengeOutcome::ChallengeIssued),
        _ => None,
    }
}

/// Forwards each event to several sinks in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn on_outcome(&self, event: &ChallengeEvent) {
        for sink in &self.sinks {
            sink.on_outcome(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(outcome: ChallengeOutcome) -> ChallengeEvent {
        ChallengeEvent {
            identifier: "192.168.1.101".to_string(),
            outcome,
            failure_count: 1,
            carrier: None,
            verdict: None,
            grant: None,
        }
    }

    #[test]
    fn test_metrics_count_each_outcome() {
        let metrics = ChallengeMetrics::new();
        assert_eq!(metrics.last_outcome(), None);

        metrics.on_outcome(&event(ChallengeOutcome::ChallengeIssued));
        metrics.on_outcome(&event(ChallengeOutcome::ChallengeIssued));
        metrics.on_outcome(&event(ChallengeOutcome::ChallengeSucceeded));

        let stats = metrics.snapshot();
        assert_eq!(stats.challenges_issued, 2);
        assert_eq!(stats.challenges_succeeded, 1);
        assert_eq!(stats.challenges_failed, 0);
        assert_eq!(stats.last_outcome, Some(ChallengeOutcome::ChallengeSucceeded));
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(ChallengeMetrics::new());
        let second = Arc::new(ChallengeMetrics::new());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(Arc::new(TracingEventSink))
            .with(second.clone());

        fanout.on_outcome(&event(ChallengeOutcome::ChallengeFailed));

        assert_eq!(first.snapshot().challenges_failed, 1);
        assert_eq!(second.snapshot().challenges_failed, 1);
    }
}

//! Per-attempt decision state machine.

use axum::{
    body::Bytes,
    http::HeaderMap,
    response::Response,
};
use portcullis_common::{ChallengeOutcome, GrantOutcome, VerificationVerdict};
use std::sync::Arc;

use super::{GuardConfig, LedgerUnavailablePolicy};
use crate::events::{ChallengeEvent, EventSink};
use crate::ledger::FailureLedger;
use crate::pipeline::{GrantPipeline, GrantRequest, PipelineError};
use crate::protocol::{ChallengeProtocol, TokenCarrier, TokenRequestForm};
use crate::verifier::Verifier;

/// One inbound token request
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    /// Caller identifier, supplied by the transport layer
    pub identifier: String,
    pub headers: HeaderMap,
    /// Raw form body, forwarded verbatim
    pub body: Bytes,
}

/// Result of a decision cycle
#[derive(Debug)]
pub struct Decision {
    pub outcome: ChallengeOutcome,
    /// Pipeline classification, when the pipeline was invoked
    pub grant: Option<GrantOutcome>,
    /// Response to send to the caller
    pub response: Response,
}

/// Decides, per attempt, whether a challenge is owed and whether it was met
pub struct ChallengeDecider {
    config: Arc<GuardConfig>,
    ledger: Arc<dyn FailureLedger>,
    verifier: Arc<dyn Verifier>,
    pipeline: Arc<dyn GrantPipeline>,
    protocol: ChallengeProtocol,
    events: Arc<dyn EventSink>,
}

impl ChallengeDecider {
    pub fn new(
        config: Arc<GuardConfig>,
        ledger: Arc<dyn FailureLedger>,
        verifier: Arc<dyn Verifier>,
        pipeline: Arc<dyn GrantPipeline>,
        protocol: ChallengeProtocol,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            ledger,
            verifier,
            pipeline,
            protocol,
            events,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run one attempt through the guard.
    ///
    /// # Errors
    /// Only pipeline transport failures are returned; every guard-level
    /// condition (challenge owed, token rejected, verifier down, ledger
    /// down) is resolved into a [`Decision`].
    pub async fn handle(&self, attempt: LoginAttempt) -> Result<Decision, PipelineError> {
        let form = TokenRequestForm::parse(&attempt.body);

        if !self.config.protects(&form.grant_types) {
            let grant = self.pipeline.exchange(grant_request(attempt)).await?;
            return Ok(Decision {
                outcome: ChallengeOutcome::NotRequired,
                grant: Some(grant.outcome),
                response: grant.response,
            });
        }

        let failure_count = self.failure_count(&attempt.identifier).await;

        if failure_count < self.config.failure_threshold {
            return self
                .forward(attempt, failure_count, ChallengeOutcome::NotRequired, None, None)
                .await;
        }

        let Some(token) = self.protocol.extract_token(&attempt.headers, &form) else {
            self.emit(ChallengeEvent {
                identifier: attempt.identifier,
                outcome: ChallengeOutcome::ChallengeIssued,
                failure_count,
                carrier: None,
                verdict: None,
                grant: None,
            });
            return Ok(self.challenge(ChallengeOutcome::ChallengeIssued));
        };

        let verdict = self.verifier.verify(&self.config.secret_key, &token.value).await;

        if verdict.passes() {
            if verdict == VerificationVerdict::ServiceUnavailable {
                tracing::warn!(
                    identifier = %attempt.identifier,
                    "Verifier unavailable, letting challenged attempt through"
                );
            }
            return self
                .forward(
                    attempt,
                    failure_count,
                    ChallengeOutcome::ChallengeSucceeded,
                    Some(token.carrier),
                    Some(verdict),
                )
                .await;
        }

        // A failed challenge is itself a failure
        self.record_failure(&attempt.identifier).await;
        self.emit(ChallengeEvent {
            identifier: attempt.identifier,
            outcome: ChallengeOutcome::ChallengeFailed,
            failure_count,
            carrier: Some(token.carrier),
            verdict: Some(verdict),
            grant: None,
        });

        Ok(self.challenge(ChallengeOutcome::ChallengeFailed))
    }

    /// Pass the attempt to the pipeline and settle the ledger from its answer
    async fn forward(
        &self,
        attempt: LoginAttempt,
        failure_count: u32,
        outcome: ChallengeOutcome,
        carrier: Option<TokenCarrier>,
        verdict: Option<VerificationVerdict>,
    ) -> Result<Decision, PipelineError> {
        let identifier = attempt.identifier.clone();
        let result = self.pipeline.exchange(grant_request(attempt)).await;

        let grant = result.as_ref().ok().map(|g| g.outcome);
        match grant {
            Some(GrantOutcome::Granted) => self.record_success(&identifier).await,
            Some(GrantOutcome::Rejected) => self.record_failure(&identifier).await,
            Some(GrantOutcome::Other) | None => {}
        }

        self.emit(ChallengeEvent {
            identifier,
            outcome,
            failure_count,
            carrier,
            verdict,
            grant,
        });

        let grant = result?;
        Ok(Decision {
            outcome,
            grant: Some(grant.outcome),
            response: grant.response,
        })
    }

    async fn failure_count(&self, identifier: &str) -> u32 {
        match self.ledger.failure_count(identifier).await {
            Ok(count) => count,
            Err(e) => {
                let policy = self.config.ledger_unavailable_policy;
                tracing::warn!(identifier = %identifier, error = %e, policy = ?policy, "Failure ledger unavailable");
                match policy {
                    LedgerUnavailablePolicy::FailClosed => self.config.failure_threshold,
                    LedgerUnavailablePolicy::FailOpen => 0,
                }
            }
        }
    }

    async fn record_failure(&self, identifier: &str) {
        if let Err(e) = self.ledger.record_failure(identifier).await {
            tracing::warn!(identifier = %identifier, error = %e, "Could not record login failure");
        }
    }

    async fn record_success(&self, identifier: &str) {
        if let Err(e) = self.ledger.record_success(identifier).await {
            tracing::warn!(identifier = %identifier, error = %e, "Could not reset failure count");
        }
    }

    fn emit(&self, event: ChallengeEvent) {
        self.events.on_outcome(&event);
    }

    fn challenge(&self, outcome: ChallengeOutcome) -> Decision {
        Decision {
            outcome,
            grant: None,
            response: self.protocol.challenge(),
        }
    }
}

fn grant_request(attempt: LoginAttempt) -> GrantRequest {
    GrantRequest {
        headers: attempt.headers,
        body: attempt.body,
    }
}

//! Application state and shared resources.

use anyhow::{Context, Result};
use axum::http::HeaderName;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, LedgerBackend};
use crate::events::{ChallengeMetrics, FanoutSink, TracingEventSink};
use crate::guard::ChallengeDecider;
use crate::ledger::{FailureLedger, MemoryLedger, RedisLedger, sweep_worker};
use crate::pipeline::{GrantPipeline, UpstreamPipeline};
use crate::protocol::ChallengeProtocol;
use crate::verifier::{RecaptchaVerifier, Verifier};

/// How often the memory ledger is swept for expired records
fn sweep_interval(failure_ttl_secs: u64) -> Duration {
    Duration::from_secs(failure_ttl_secs.clamp(1, 60))
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Challenge orchestration
    pub decider: Arc<ChallengeDecider>,

    /// Failure ledger (also pinged by readiness checks)
    pub ledger: Arc<dyn FailureLedger>,

    /// Challenge counters
    pub metrics: Arc<ChallengeMetrics>,

    /// Trusted header naming the client address, if any
    pub client_ip_header: Option<HeaderName>,
}

impl AppState {
    /// Create application state, connecting to Redis when configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let ledger: Arc<dyn FailureLedger> = match config.ledger.backend {
            LedgerBackend::Memory => {
                let ledger = Arc::new(MemoryLedger::new(config.ledger.failure_ttl_secs));
                if let Some(ttl) = config.ledger.failure_ttl_secs {
                    // Expired records are dropped in the background
                    tokio::spawn(sweep_worker(ledger.clone(), sweep_interval(ttl)));
                }
                ledger
            }
            LedgerBackend::Redis => {
                // Connection manager handles reconnection
                let client = redis::Client::open(config.ledger.redis_url.as_str())
                    .context("Failed to create Redis client")?;
                let redis = ConnectionManager::new(client)
                    .await
                    .context("Failed to connect to Redis")?;
                tracing::info!(redis_url = %config.ledger.redis_url, "Redis ledger connected");
                Arc::new(RedisLedger::new(redis, config.ledger.failure_ttl_secs))
            }
        };

        let verifier = Arc::new(RecaptchaVerifier::new(
            &config.recaptcha.verification_uri,
            Duration::from_millis(config.recaptcha.timeout_ms),
        )?);

        let pipeline = Arc::new(UpstreamPipeline::new(
            &config.upstream.token_url,
            Duration::from_secs(config.upstream.timeout_secs),
        )?);

        let state = Self::from_parts(config, ledger, verifier, pipeline)?;
        state.seed_ledger().await?;

        Ok(state)
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: AppConfig,
        ledger: Arc<dyn FailureLedger>,
        verifier: Arc<dyn Verifier>,
        pipeline: Arc<dyn GrantPipeline>,
    ) -> Result<Self> {
        let protocol = ChallengeProtocol::new(&config.recaptcha.challenge_url)?;

        let client_ip_header = config
            .client_ip_header
            .as_deref()
            .map(HeaderName::try_from)
            .transpose()
            .context("Invalid client_ip_header")?;

        let metrics = Arc::new(ChallengeMetrics::new());
        let events = FanoutSink::new()
            .with(Arc::new(TracingEventSink))
            .with(metrics.clone());

        let decider = Arc::new(ChallengeDecider::new(
            Arc::new(config.guard_config()),
            ledger.clone(),
            verifier,
            pipeline,
            protocol,
            Arc::new(events),
        ));

        Ok(Self {
            config: Arc::new(config),
            decider,
            ledger,
            metrics,
            client_ip_header,
        })
    }

    /// Apply `ledger.seed_failures` from configuration
    pub async fn seed_ledger(&self) -> Result<()> {
        for seed in &self.config.ledger.seed_failures {
            self.ledger
                .seed(&seed.identifier, seed.count)
                .await
                .with_context(|| format!("Failed to seed ledger for {}", seed.identifier))?;
            tracing::info!(identifier = %seed.identifier, count = seed.count, "Ledger seeded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_interval_tracks_short_ttls() {
        assert_eq!(sweep_interval(0), Duration::from_secs(1));
        assert_eq!(sweep_interval(15), Duration::from_secs(15));
        assert_eq!(sweep_interval(86_400), Duration::from_secs(60));
    }
}

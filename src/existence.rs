//! Remote existence checks with breaker-guarded fallback.
//!
//! Users and rooms are owned by separate services. An existence check
//! first probes the owning service through that service's circuit breaker;
//! if the breaker is open or the probe fails for any reason, it falls back
//! to the local directory replica. Only a local read failure surfaces as
//! an error, so a flapping dependency degrades to slightly stale answers
//! instead of failed bookings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::directory::{DirectoryError, DirectoryRead};
use crate::observability;

#[derive(Debug)]
pub enum ProbeError {
    Transport(String),
    Status(u16),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Transport(e) => write!(f, "transport error: {e}"),
            ProbeError::Status(code) => write!(f, "unexpected status: {code}"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// A yes/no existence probe against a remote service.
#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    async fn exists(&self, id: u64) -> Result<bool, ProbeError>;
}

/// HTTP probe: GET `{base_url}/{id}`. 200 means the record exists, 404
/// means it does not, anything 4xx/5xx beyond that is a probe failure and
/// counts against the breaker.
pub struct HttpProbe {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProbe {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ExistenceProbe for HttpProbe {
    async fn exists(&self, id: u64) -> Result<bool, ProbeError> {
        let url = format!("{}/{id}", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::OK {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

/// One remote dependency's existence check: probe, breaker, local fallback.
#[derive(Clone)]
pub struct ExistenceChecker {
    breaker: Arc<CircuitBreaker>,
    probe: Arc<dyn ExistenceProbe>,
    local: Arc<dyn DirectoryRead>,
}

impl ExistenceChecker {
    pub fn new(
        breaker: Arc<CircuitBreaker>,
        probe: Arc<dyn ExistenceProbe>,
        local: Arc<dyn DirectoryRead>,
    ) -> Self {
        Self {
            breaker,
            probe,
            local,
        }
    }

    /// Remote answer when the dependency is reachable, local answer
    /// otherwise. Errs only when the local read itself fails.
    pub async fn exists(&self, id: u64) -> Result<bool, DirectoryError> {
        match self.breaker.call(|| self.probe.exists(id)).await {
            Ok(found) => Ok(found),
            Err(BreakerError::Open) => {
                tracing::debug!(
                    dependency = self.breaker.name(),
                    id,
                    "circuit breaker open, using local directory"
                );
                self.fallback(id).await
            }
            Err(BreakerError::Service(e)) => {
                tracing::warn!(
                    dependency = self.breaker.name(),
                    id,
                    error = %e,
                    "existence probe failed, using local directory"
                );
                self.fallback(id).await
            }
        }
    }

    async fn fallback(&self, id: u64) -> Result<bool, DirectoryError> {
        metrics::counter!(
            observability::EXISTENCE_FALLBACKS_TOTAL,
            "dependency" => self.breaker.name().to_string()
        )
        .increment(1);
        self.local.exists(id).await
    }
}

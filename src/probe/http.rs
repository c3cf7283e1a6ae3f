//! HTTP probe implementation.

use std::time::{Duration, Instant};

use super::{ProbeError, ProbeOutcome, Prober};

/// HTTP prober sharing one pooled client across all checks.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gamesman-status/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self { client })
    }

    /// Issue a single GET and classify the result.
    ///
    /// Latency runs from dispatch until the status line arrives (the body is
    /// not read), or until the failure or timeout. On timeout the in-flight
    /// request is dropped and the elapsed time is reported, not the limit.
    pub async fn check(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, self.client.get(url).send()).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(response)) => ProbeOutcome::from_status(response.status().as_u16(), elapsed),
            Ok(Err(e)) => {
                let err = if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Network(e.to_string())
                };
                tracing::debug!("Probe {} failed after {:?}: {}", url, elapsed, err);
                ProbeOutcome::failed(&err, elapsed)
            }
            Err(_) => {
                tracing::debug!("Probe {} timed out after {:?}", url, elapsed);
                ProbeOutcome::failed(&ProbeError::Timeout(timeout), elapsed)
            }
        }
    }
}

impl Prober for HttpProber {
    async fn run(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        self.check(url, timeout).await
    }
}

//! Readiness probing of the Elasticsearch HTTP endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::StartOptions;
use crate::endpoint::ServiceEndpoint;
use crate::error::{ElasticError, Result};
use crate::observer::{LifecycleEvent, LifecycleObserver};

/// Per-request timeout for a single probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `GET /` until the service answers 200.
pub struct ReadinessProbe {
    http: reqwest::Client,
    poll_interval: Duration,
    timeout: Option<Duration>,
    observer: Arc<dyn LifecycleObserver>,
}

impl ReadinessProbe {
    pub fn new(
        poll_interval: Duration,
        timeout: Option<Duration>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ElasticError::Http(e.to_string()))?;
        Ok(Self {
            http,
            poll_interval,
            timeout,
            observer,
        })
    }

    pub fn from_options(
        options: &StartOptions,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<Self> {
        Self::new(options.poll_interval, options.startup_timeout, observer)
    }

    /// Block until the endpoint root returns exactly HTTP 200.
    ///
    /// Sleeps one interval before every probe. Connection errors and any
    /// other status count as "not ready yet". Without a timeout this only
    /// returns once the service is up; drop the future to cancel.
    ///
    /// Returns the number of probes issued.
    pub async fn wait_until_up(&self, endpoint: &ServiceEndpoint) -> Result<u32> {
        let url = endpoint.url();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            tokio::time::sleep(self.poll_interval).await;
            attempts += 1;

            match self.http.get(&url).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                    self.observer.on_event(&LifecycleEvent::ServiceReady {
                        endpoint: url,
                        attempts,
                        elapsed: started.elapsed(),
                    });
                    return Ok(attempts);
                }
                Ok(resp) => {
                    self.observer.on_event(&LifecycleEvent::ProbeNotReady {
                        attempt: attempts,
                        status: resp.status().as_u16(),
                    });
                }
                Err(e) => {
                    self.observer.on_event(&LifecycleEvent::ProbeFailed {
                        attempt: attempts,
                        reason: e.to_string(),
                    });
                }
            }

            if let Some(timeout) = self.timeout
                && started.elapsed() >= timeout
            {
                return Err(ElasticError::ReadinessTimeout {
                    endpoint: url,
                    attempts,
                    timeout,
                });
            }
        }
    }
}

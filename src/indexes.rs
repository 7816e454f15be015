//! Destructive index reset: wipe everything, then recreate the requested
//! indexes in order.
//!
//! Nothing here aborts early. The wipe and every creation are attempted and
//! their outcomes collected in a [`ResetReport`].

use std::sync::Arc;
use std::time::Duration;

use crate::config::IndexSpec;
use crate::endpoint::ServiceEndpoint;
use crate::error::{ElasticError, Result};
use crate::observer::{LifecycleEvent, LifecycleObserver};

/// Path that addresses every index.
pub const ALL_INDEXES: &str = "_all";

/// Longest response body kept in a failure reason.
const MAX_REASON_LEN: usize = 512;

/// A failed wipe or index creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFailure {
    /// Index name, or `_all` for the wipe.
    pub index: String,
    /// HTTP status, when the service answered at all.
    pub status: Option<u16>,
    pub reason: String,
}

impl std::fmt::Display for IndexFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.index, status, self.reason),
            None => write!(f, "{}: {}", self.index, self.reason),
        }
    }
}

/// Outcome of [`IndexClient::reset_indexes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Whether the wipe succeeded.
    pub wiped: bool,
    /// Indexes created, in creation order.
    pub created: Vec<String>,
    /// Failed operations, in the order attempted. The wipe comes first.
    pub failures: Vec<IndexFailure>,
}

impl ResetReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures for index creation only (the wipe excluded).
    pub fn index_failures(&self) -> impl Iterator<Item = &IndexFailure> {
        self.failures.iter().filter(|f| f.index != ALL_INDEXES)
    }
}

/// Client for the index-management endpoints.
pub struct IndexClient {
    http: reqwest::Client,
    observer: Arc<dyn LifecycleObserver>,
}

impl IndexClient {
    pub fn new(observer: Arc<dyn LifecycleObserver>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ElasticError::Http(e.to_string()))?;
        Ok(Self { http, observer })
    }

    /// `DELETE /_all`, then `PUT /{name}` for each spec in order.
    pub async fn reset_indexes(
        &self,
        endpoint: &ServiceEndpoint,
        specs: &[IndexSpec],
    ) -> ResetReport {
        let mut report = ResetReport::default();

        tracing::debug!("Wiping out all current indices");
        let wipe = self.http.delete(endpoint.join(ALL_INDEXES)).send().await;
        match check(ALL_INDEXES, wipe).await {
            Ok(()) => {
                report.wiped = true;
                self.observer.on_event(&LifecycleEvent::IndexesWiped);
            }
            Err(failure) => {
                self.observer.on_event(&LifecycleEvent::WipeFailed {
                    reason: failure.to_string(),
                });
                report.failures.push(failure);
            }
        }

        for spec in specs {
            tracing::debug!("Creating {} index", spec.name);
            let response = self
                .http
                .put(endpoint.join(&spec.name))
                .json(&spec.body)
                .send()
                .await;

            match check(&spec.name, response).await {
                Ok(()) => {
                    self.observer.on_event(&LifecycleEvent::IndexCreated {
                        name: spec.name.clone(),
                    });
                    report.created.push(spec.name.clone());
                }
                Err(failure) => {
                    self.observer.on_event(&LifecycleEvent::IndexCreateFailed {
                        name: spec.name.clone(),
                        reason: failure.to_string(),
                    });
                    report.failures.push(failure);
                }
            }
        }

        report
    }
}

/// Turn a response into success or an [`IndexFailure`] carrying the body.
async fn check(
    index: &str,
    response: reqwest::Result<reqwest::Response>,
) -> std::result::Result<(), IndexFailure> {
    let response = response.map_err(|e| IndexFailure {
        index: index.to_string(),
        status: None,
        reason: e.to_string(),
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let mut reason = response.text().await.unwrap_or_default();
    if reason.len() > MAX_REASON_LEN {
        let mut cut = MAX_REASON_LEN;
        while !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);
        reason.push_str("...");
    }
    if reason.is_empty() {
        reason = status.canonical_reason().unwrap_or("error").to_string();
    }

    Err(IndexFailure {
        index: index.to_string(),
        status: Some(status.as_u16()),
        reason,
    })
}

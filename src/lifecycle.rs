//! `start` / `stop` for the local Elasticsearch container.
//!
//! `start` walks the stages in order, awaiting each before the next:
//!
//! ```text
//! NotStarted ─▶ ImageReady ─▶ ContainerRunning ─▶ ServiceReady ─▶ IndexesReset
//! ```
//!
//! Nothing is rolled back. If a later stage fails the pulled image and the
//! running container stay where they are, and the next `start` picks the
//! container up again.

use std::sync::Arc;

use crate::config::{IndexSpec, StartOptions, validate_indexes};
use crate::endpoint::ServiceEndpoint;
use crate::error::{ElasticError, Result};
use crate::indexes::{IndexClient, ResetReport};
use crate::observer::{LifecycleEvent, LifecycleObserver, TracingObserver};
use crate::readiness::ReadinessProbe;
use crate::reconciler::Reconciler;
use crate::runtime::{ContainerRef, ContainerRuntime, ContainerSpec, DockerRuntime};

/// Progress of a single `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    NotStarted,
    ImageReady,
    ContainerRunning,
    ServiceReady,
    IndexesReset,
}

/// A running, reset Elasticsearch container.
///
/// Returned by [`ElasticLocal::start`]; hand it back to
/// [`ElasticLocal::stop`] to tear the container down. Dropping it leaves the
/// container running so a later `start` can reuse it.
pub struct ElasticLocal {
    reconciler: Reconciler,
    indexes: IndexClient,
    container: ContainerRef,
    endpoint: ServiceEndpoint,
    report: ResetReport,
}

impl std::fmt::Debug for ElasticLocal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticLocal")
            .field("container", &self.container)
            .field("endpoint", &self.endpoint)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl ElasticLocal {
    /// Start against the local Docker daemon, logging through `tracing`.
    pub async fn start(options: StartOptions) -> Result<Self> {
        let runtime = DockerRuntime::connect().await?;
        Self::start_with(Arc::new(runtime), Arc::new(TracingObserver), options).await
    }

    /// Start with an explicit runtime and observer.
    pub async fn start_with(
        runtime: Arc<dyn ContainerRuntime>,
        observer: Arc<dyn LifecycleObserver>,
        options: StartOptions,
    ) -> Result<Self> {
        options.validate()?;
        let endpoint = ServiceEndpoint::http(options.host.clone(), options.port);

        ensure_image(runtime.as_ref(), observer.as_ref(), &options).await?;
        observer.on_event(&LifecycleEvent::StageReached(Stage::ImageReady));

        let reconciler = Reconciler::new(runtime, observer.clone());
        let container = reconciler
            .ensure_running(&ContainerSpec::elasticsearch(&options))
            .await?;
        observer.on_event(&LifecycleEvent::StageReached(Stage::ContainerRunning));

        ReadinessProbe::from_options(&options, observer.clone())?
            .wait_until_up(&endpoint)
            .await?;
        observer.on_event(&LifecycleEvent::StageReached(Stage::ServiceReady));

        let indexes = IndexClient::new(observer.clone())?;
        let report = indexes.reset_indexes(&endpoint, &options.indexes).await;
        observer.on_event(&LifecycleEvent::StageReached(Stage::IndexesReset));

        if !report.is_clean() {
            tracing::warn!(
                "{} of {} index operations failed during reset",
                report.failures.len(),
                options.indexes.len() + 1
            );
            if options.strict_indexes {
                return Err(ElasticError::IndexReset {
                    container_id: container.id().to_string(),
                    failures: report.failures,
                });
            }
        }

        Ok(Self {
            reconciler,
            indexes,
            container,
            endpoint,
            report,
        })
    }

    /// Stop and remove the container.
    pub async fn stop(self) -> Result<()> {
        self.reconciler.stop_and_remove(self.container).await
    }

    /// The managed container.
    pub fn container(&self) -> &ContainerRef {
        &self.container
    }

    /// Where the service listens on the host.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Root URL of the service, e.g. `http://localhost:9200`.
    pub fn url(&self) -> String {
        self.endpoint.url()
    }

    /// Outcome of the most recent index reset.
    pub fn reset_report(&self) -> &ResetReport {
        &self.report
    }

    /// Wipe and recreate indexes again, e.g. between test cases.
    ///
    /// Invalid or duplicate names are rejected before anything is deleted.
    pub async fn reset_indexes(&mut self, specs: &[IndexSpec]) -> Result<&ResetReport> {
        validate_indexes(specs)?;
        self.report = self.indexes.reset_indexes(&self.endpoint, specs).await;
        Ok(&self.report)
    }
}

/// Make sure the image is present, pulling it if allowed.
async fn ensure_image(
    runtime: &dyn ContainerRuntime,
    observer: &dyn LifecycleObserver,
    options: &StartOptions,
) -> Result<()> {
    if runtime.image_exists(&options.image).await? {
        observer.on_event(&LifecycleEvent::ImagePresent {
            image: options.image.clone(),
        });
        return Ok(());
    }

    if !options.auto_pull {
        return Err(ElasticError::ImagePullFailed {
            image: options.image.clone(),
            reason: "image not present locally and auto_pull is disabled".to_string(),
        });
    }

    tracing::info!("Pulling image: {}", options.image);
    runtime.pull_image(&options.image).await?;
    observer.on_event(&LifecycleEvent::ImagePulled {
        image: options.image.clone(),
    });
    Ok(())
}

/// Start a container against the local Docker daemon.
pub async fn start(options: StartOptions) -> Result<ElasticLocal> {
    ElasticLocal::start(options).await
}

/// Stop and remove a container returned by [`start`].
pub async fn stop(handle: ElasticLocal) -> Result<()> {
    handle.stop().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, RecordingObserver, RuntimeCall};

    #[tokio::test]
    async fn test_invalid_options_touch_nothing() {
        let runtime = Arc::new(FakeRuntime::new());
        let observer = Arc::new(RecordingObserver::new());
        let options = StartOptions::default().with_index(IndexSpec::empty("Bad/Name"));

        let err = ElasticLocal::start_with(runtime.clone(), observer.clone(), options)
            .await
            .unwrap_err();

        assert!(matches!(err, ElasticError::InvalidOptions { .. }));
        assert!(runtime.calls().is_empty());
        assert!(observer.events().is_empty());
    }

    #[tokio::test]
    async fn test_pull_failure_aborts_before_container_work() {
        let runtime = Arc::new(FakeRuntime::new().fail_pull_with("manifest unknown"));
        let observer = Arc::new(RecordingObserver::new());

        let err =
            ElasticLocal::start_with(runtime.clone(), observer.clone(), StartOptions::default())
                .await
                .unwrap_err();

        assert!(matches!(err, ElasticError::ImagePullFailed { .. }));
        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::ImageExists("elasticsearch:7.13.2".to_string()),
                RuntimeCall::Pull("elasticsearch:7.13.2".to_string()),
            ]
        );
        assert!(observer.stages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_without_auto_pull() {
        let runtime = Arc::new(FakeRuntime::new());
        let observer = Arc::new(RecordingObserver::new());
        let options = StartOptions::default().with_auto_pull(false);

        let err = ElasticLocal::start_with(runtime.clone(), observer, options)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("auto_pull is disabled"));
        assert!(runtime.created().is_empty());
    }

    #[tokio::test]
    async fn test_present_image_is_not_pulled() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_image("elasticsearch:7.13.2")
                .with_bound_port(9200),
        );
        let observer = Arc::new(RecordingObserver::new());

        let err =
            ElasticLocal::start_with(runtime.clone(), observer.clone(), StartOptions::default())
                .await
                .unwrap_err();

        // container start fails on the taken port, after the image stage
        assert!(matches!(err, ElasticError::ContainerStartFailed { .. }));
        assert!(
            !runtime
                .calls()
                .iter()
                .any(|c| matches!(c, RuntimeCall::Pull(_)))
        );
        assert_eq!(observer.stages(), vec![Stage::ImageReady]);
        // no rollback: the created container is left behind
        assert_eq!(runtime.created().len(), 1);
    }
}

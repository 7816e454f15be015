//! Converges the managed container to "running".
//!
//! ```text
//!   list(name) ──▶ first candidate with exact name + image?
//!                    │ yes                         │ no
//!                    ▼                             ▼
//!           exited/created → start        remove stale same-named
//!           paused         → unpause      create + start
//!           running        → nothing
//!           other          → left as-is
//! ```

use std::sync::Arc;

use crate::error::Result;
use crate::observer::{LifecycleEvent, LifecycleObserver};
use crate::runtime::{ContainerRef, ContainerRuntime, ContainerSpec, ContainerState};

/// Finds, revives, creates and removes the well-known container.
pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    observer: Arc<dyn LifecycleObserver>,
}

impl Reconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, observer: Arc<dyn LifecycleObserver>) -> Self {
        Self { runtime, observer }
    }

    /// Return a running container matching `spec`, reusing one if possible.
    ///
    /// Only the first container whose name and image both match is
    /// considered. Create and start failures (a taken host port, for
    /// example) are returned unchanged.
    pub async fn ensure_running(&self, spec: &ContainerSpec) -> Result<ContainerRef> {
        let candidates = self.runtime.list_containers(&spec.name).await?;

        let mut stale = Vec::new();
        let mut found = None;
        for candidate in candidates {
            if !candidate.has_name(&spec.name) {
                continue;
            }
            if candidate.image != spec.image {
                self.observer.on_event(&LifecycleEvent::StaleContainerSkipped {
                    id: candidate.id.clone(),
                    image: candidate.image.clone(),
                });
                stale.push(candidate.id);
                continue;
            }
            found = Some(candidate);
            break;
        }

        let Some(existing) = found else {
            for id in stale {
                self.runtime.remove_container(&id, true).await?;
                self.observer
                    .on_event(&LifecycleEvent::StaleContainerRemoved { id });
            }
            return self.create_and_start(spec).await;
        };

        self.observer.on_event(&LifecycleEvent::ContainerFound {
            id: existing.id.clone(),
            state: existing.state.clone(),
        });

        let mut container = ContainerRef {
            id: existing.id,
            name: spec.name.clone(),
            image: existing.image,
            state: existing.state,
        };
        self.revive(&mut container).await?;
        Ok(container)
    }

    /// Bring a found container to `Running` where the state allows it.
    async fn revive(&self, container: &mut ContainerRef) -> Result<()> {
        match container.state {
            ContainerState::Running => {}
            ContainerState::Exited | ContainerState::Created => {
                self.runtime.start_container(&container.id).await?;
                container.state = ContainerState::Running;
                self.observer.on_event(&LifecycleEvent::ContainerStarted {
                    id: container.id.clone(),
                });
            }
            ContainerState::Paused => {
                self.runtime.unpause_container(&container.id).await?;
                container.state = ContainerState::Running;
                self.observer.on_event(&LifecycleEvent::ContainerUnpaused {
                    id: container.id.clone(),
                });
            }
            _ => {
                self.observer.on_event(&LifecycleEvent::ContainerLeftAsIs {
                    id: container.id.clone(),
                    state: container.state.clone(),
                });
            }
        }
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<ContainerRef> {
        tracing::info!("Creating new ES container");

        let id = self.runtime.create_container(spec).await?;
        self.observer.on_event(&LifecycleEvent::ContainerCreated {
            id: id.clone(),
            host_port: spec.host_port().unwrap_or_default(),
        });

        self.runtime.start_container(&id).await?;
        self.observer
            .on_event(&LifecycleEvent::ContainerStarted { id: id.clone() });

        Ok(ContainerRef {
            id,
            name: spec.name.clone(),
            image: spec.image.clone(),
            state: ContainerState::Running,
        })
    }

    /// Stop, then remove, the container. Consumes the handle.
    pub async fn stop_and_remove(&self, container: ContainerRef) -> Result<()> {
        self.runtime.stop_container(&container.id).await?;
        self.observer.on_event(&LifecycleEvent::ContainerStopped {
            id: container.id.clone(),
        });

        self.runtime.remove_container(&container.id, false).await?;
        self.observer
            .on_event(&LifecycleEvent::ContainerRemoved { id: container.id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::StartOptions;
    use crate::error::ElasticError;
    use crate::testing::{FakeRuntime, RecordingObserver, RuntimeCall};

    const IMAGE: &str = "elasticsearch:7.13.2";
    const NAME: &str = "elasticsearch-local-docker";

    fn spec(port: u16) -> ContainerSpec {
        ContainerSpec::elasticsearch(&StartOptions::default().with_port(port))
    }

    fn reconciler(runtime: &Arc<FakeRuntime>) -> (Reconciler, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        (Reconciler::new(runtime.clone(), observer.clone()), observer)
    }

    #[tokio::test]
    async fn test_reuses_matching_container_in_any_revivable_state() {
        for state in [
            ContainerState::Created,
            ContainerState::Exited,
            ContainerState::Paused,
            ContainerState::Running,
        ] {
            let runtime = Arc::new(FakeRuntime::new().with_container(
                "c1",
                NAME,
                IMAGE,
                state.clone(),
            ));
            let (reconciler, _) = reconciler(&runtime);

            let container = reconciler.ensure_running(&spec(9200)).await.unwrap();

            assert_eq!(container.id(), "c1", "from {state}");
            assert!(container.is_running(), "from {state}");
            assert_eq!(runtime.container_state("c1"), Some(ContainerState::Running));
            assert!(runtime.created().is_empty());
        }
    }

    #[tokio::test]
    async fn test_issues_minimal_operation_per_state() {
        let runtime = Arc::new(FakeRuntime::new().with_container(
            "c1",
            NAME,
            IMAGE,
            ContainerState::Paused,
        ));
        let (reconciler, _) = reconciler(&runtime);

        reconciler.ensure_running(&spec(9200)).await.unwrap();

        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::List(NAME.to_string()),
                RuntimeCall::Unpause("c1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_starts_container_left_in_created_state() {
        let runtime = Arc::new(FakeRuntime::new().with_container(
            "c1",
            NAME,
            IMAGE,
            ContainerState::Created,
        ));
        let (reconciler, _) = reconciler(&runtime);

        reconciler.ensure_running(&spec(9200)).await.unwrap();

        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::List(NAME.to_string()),
                RuntimeCall::Start("c1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_creates_fresh_container_when_image_mismatches() {
        let runtime = Arc::new(FakeRuntime::new().with_container(
            "old",
            NAME,
            "elasticsearch:6.8.0",
            ContainerState::Exited,
        ));
        let (reconciler, observer) = reconciler(&runtime);

        let container = reconciler.ensure_running(&spec(9200)).await.unwrap();

        assert_ne!(container.id(), "old");
        assert_eq!(container.image(), IMAGE);
        assert_eq!(runtime.created().len(), 1);
        assert_eq!(runtime.container_state("old"), None);
        assert!(observer.events().contains(&LifecycleEvent::StaleContainerRemoved {
            id: "old".to_string()
        }));
    }

    #[tokio::test]
    async fn test_ignores_containers_whose_name_only_contains_the_name() {
        let runtime = Arc::new(FakeRuntime::new().with_container(
            "other",
            "elasticsearch-local-docker-2",
            IMAGE,
            ContainerState::Running,
        ));
        let (reconciler, _) = reconciler(&runtime);

        let container = reconciler.ensure_running(&spec(9200)).await.unwrap();

        assert_ne!(container.id(), "other");
        assert_eq!(
            runtime.container_state("other"),
            Some(ContainerState::Running)
        );
    }

    #[tokio::test]
    async fn test_creates_and_starts_when_absent() {
        let runtime = Arc::new(FakeRuntime::new());
        let (reconciler, observer) = reconciler(&runtime);

        let container = reconciler.ensure_running(&spec(9201)).await.unwrap();

        assert!(container.is_running());
        assert_eq!(runtime.created(), vec![spec(9201)]);
        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::List(NAME.to_string()),
                RuntimeCall::Create(NAME.to_string()),
                RuntimeCall::Start(container.id().to_string()),
            ]
        );
        assert!(observer.events().contains(&LifecycleEvent::ContainerCreated {
            id: container.id().to_string(),
            host_port: 9201,
        }));
    }

    #[tokio::test]
    async fn test_ensure_running_is_idempotent() {
        let runtime = Arc::new(FakeRuntime::new());
        let (reconciler, _) = reconciler(&runtime);

        let first = reconciler.ensure_running(&spec(9200)).await.unwrap();
        let second = reconciler.ensure_running(&spec(9200)).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(runtime.created().len(), 1);
    }

    #[tokio::test]
    async fn test_port_conflict_propagates() {
        let runtime = Arc::new(FakeRuntime::new().with_bound_port(9200));
        let (reconciler, _) = reconciler(&runtime);

        let err = reconciler.ensure_running(&spec(9200)).await.unwrap_err();

        assert!(matches!(err, ElasticError::ContainerStartFailed { .. }));
        assert!(err.to_string().contains("port is already allocated"));
    }

    #[tokio::test]
    async fn test_unknown_state_left_as_is() {
        let runtime = Arc::new(FakeRuntime::new().with_container(
            "c1",
            NAME,
            IMAGE,
            ContainerState::Restarting,
        ));
        let (reconciler, observer) = reconciler(&runtime);

        let container = reconciler.ensure_running(&spec(9200)).await.unwrap();

        assert_eq!(container.state(), &ContainerState::Restarting);
        assert!(observer.events().contains(&LifecycleEvent::ContainerLeftAsIs {
            id: "c1".to_string(),
            state: ContainerState::Restarting,
        }));
    }

    #[tokio::test]
    async fn test_first_full_match_wins() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_container("stale", NAME, "elasticsearch:6.8.0", ContainerState::Running)
                .with_container("first", NAME, IMAGE, ContainerState::Exited)
                .with_container("second", NAME, IMAGE, ContainerState::Running),
        );
        let (reconciler, _) = reconciler(&runtime);

        let container = reconciler.ensure_running(&spec(9200)).await.unwrap();

        assert_eq!(container.id(), "first");
        // stale containers are only removed when nothing matched
        assert_eq!(
            runtime.container_state("stale"),
            Some(ContainerState::Running)
        );
    }

    #[tokio::test]
    async fn test_stop_and_remove() {
        let runtime = Arc::new(FakeRuntime::new());
        let (reconciler, observer) = reconciler(&runtime);
        let container = reconciler.ensure_running(&spec(9200)).await.unwrap();
        let id = container.id().to_string();

        reconciler.stop_and_remove(container).await.unwrap();

        assert_eq!(runtime.container_state(&id), None);
        let events = observer.events();
        assert_eq!(
            &events[events.len() - 2..],
            &[
                LifecycleEvent::ContainerStopped { id: id.clone() },
                LifecycleEvent::ContainerRemoved { id },
            ]
        );
    }
}

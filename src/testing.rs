//! Test doubles for the container runtime and the event sink.
//!
//! Provides:
//! - [`FakeRuntime`]: an in-memory [`ContainerRuntime`] that records calls
//!   and can be told to fail
//! - [`RecordingObserver`]: a [`LifecycleObserver`] that keeps every event
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use es_local_docker::runtime::ContainerState;
//! use es_local_docker::testing::{FakeRuntime, RecordingObserver};
//!
//! let runtime = Arc::new(FakeRuntime::new().with_container(
//!     "abc123",
//!     "elasticsearch-local-docker",
//!     "elasticsearch:7.13.2",
//!     ContainerState::Exited,
//! ));
//! let observer = Arc::new(RecordingObserver::new());
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{ElasticError, Result};
use crate::lifecycle::Stage;
use crate::observer::{LifecycleEvent, LifecycleObserver};
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ContainerSummary};

/// A call made against [`FakeRuntime`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    ImageExists(String),
    Pull(String),
    /// Listing by name filter.
    List(String),
    /// Creation by container name.
    Create(String),
    Start(String),
    Unpause(String),
    Stop(String),
    Remove(String),
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    image: String,
    state: ContainerState,
    host_port: Option<u16>,
}

#[derive(Default)]
struct FakeState {
    images: HashSet<String>,
    containers: Vec<FakeContainer>,
    created: Vec<ContainerSpec>,
    calls: Vec<RuntimeCall>,
    /// Host ports held by something outside the runtime.
    bound_ports: HashSet<u16>,
    pull_failure: Option<String>,
    next_id: u32,
}

/// In-memory container runtime.
///
/// Behaves like Docker where it matters to the reconciler: name filters are
/// substring matches, names are unique, starting a container whose host port
/// is taken fails, and removing a running container needs `force`.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an image as present locally.
    pub fn with_image(self, image: impl Into<String>) -> Self {
        self.lock().images.insert(image.into());
        self
    }

    /// Seed a pre-existing container.
    pub fn with_container(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        state: ContainerState,
    ) -> Self {
        self.lock().containers.push(FakeContainer {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            state,
            host_port: None,
        });
        self
    }

    /// Simulate an unrelated process listening on `port`.
    pub fn with_bound_port(self, port: u16) -> Self {
        self.lock().bound_ports.insert(port);
        self
    }

    /// Free a port taken with [`FakeRuntime::with_bound_port`].
    pub fn release_port(&self, port: u16) {
        self.lock().bound_ports.remove(&port);
    }

    /// Make every pull fail with `reason`.
    pub fn fail_pull_with(self, reason: impl Into<String>) -> Self {
        self.lock().pull_failure = Some(reason.into());
        self
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Specs of every container created so far.
    pub fn created(&self) -> Vec<ContainerSpec> {
        self.lock().created.clone()
    }

    /// Current state of a container, `None` once removed.
    pub fn container_state(&self, id: &str) -> Option<ContainerState> {
        self.lock()
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.state.clone())
    }

    /// Ids of all containers that currently exist.
    pub fn container_ids(&self) -> Vec<String> {
        self.lock().containers.iter().map(|c| c.id.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn no_such_container(operation: &'static str, id: &str) -> ElasticError {
    ElasticError::Runtime {
        operation,
        target: id.to_string(),
        reason: format!("No such container: {id}"),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::ImageExists(image.to_string()));
        Ok(state.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Pull(image.to_string()));
        if let Some(reason) = state.pull_failure.clone() {
            return Err(ElasticError::ImagePullFailed {
                image: image.to_string(),
                reason,
            });
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<ContainerSummary>> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::List(name.to_string()));
        Ok(state
            .containers
            .iter()
            .filter(|c| c.name.contains(name))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: c.image.clone(),
                state: c.state.clone(),
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Create(spec.name.clone()));

        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(ElasticError::ContainerCreationFailed {
                name: spec.name.clone(),
                reason: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    spec.name
                ),
            });
        }

        state.next_id += 1;
        let id = format!("fake-{:04}", state.next_id);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            state: ContainerState::Created,
            host_port: spec.host_port(),
        });
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Start(id.to_string()));

        let bound_ports = state.bound_ports.clone();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such_container("start", id))?;

        if let Some(port) = container.host_port
            && bound_ports.contains(&port)
        {
            return Err(ElasticError::ContainerStartFailed {
                name: id.to_string(),
                reason: format!("Bind for 0.0.0.0:{port} failed: port is already allocated"),
            });
        }
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Unpause(id.to_string()));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such_container("unpause", id))?;
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Stop(id.to_string()));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such_container("stop", id))?;
        container.state = ContainerState::Exited;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Remove(id.to_string()));
        let pos = state
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| no_such_container("remove", id))?;

        if !force && state.containers[pos].state == ContainerState::Running {
            return Err(ElasticError::Runtime {
                operation: "remove",
                target: id.to_string(),
                reason: "You cannot remove a running container".to_string(),
            });
        }
        state.containers.remove(pos);
        Ok(())
    }
}

/// Keeps every event it receives.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stages reached, in order.
    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::StageReached(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_runtime_rejects_duplicate_names() {
        let runtime = FakeRuntime::new();
        let spec = ContainerSpec::elasticsearch(&crate::config::StartOptions::default());

        runtime.create_container(&spec).await.unwrap();
        let err = runtime.create_container(&spec).await.unwrap_err();

        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn test_fake_runtime_pull_marks_image_present() {
        let runtime = FakeRuntime::new();

        assert!(!tokio_test::block_on(runtime.image_exists("elasticsearch:7.13.2")).unwrap());
        tokio_test::block_on(runtime.pull_image("elasticsearch:7.13.2")).unwrap();
        assert!(tokio_test::block_on(runtime.image_exists("elasticsearch:7.13.2")).unwrap());
    }

    #[tokio::test]
    async fn test_fake_runtime_requires_force_for_running() {
        let runtime = FakeRuntime::new().with_container("c1", "es", "img", ContainerState::Running);

        assert!(runtime.remove_container("c1", false).await.is_err());
        runtime.remove_container("c1", true).await.unwrap();
        assert!(runtime.container_ids().is_empty());
    }
}

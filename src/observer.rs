//! Lifecycle events and the sinks that receive them.
//!
//! Every decision the reconciler, the readiness probe and the index reset
//! make is reported as a [`LifecycleEvent`]. The default sink,
//! [`TracingObserver`], turns them into `tracing` records; tests plug in
//! [`crate::testing::RecordingObserver`] and assert on the sequence.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::lifecycle::Stage;
use crate::runtime::ContainerState;

/// Something that happened while converging the container.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A `start` stage completed.
    StageReached(Stage),
    ImagePresent {
        image: String,
    },
    ImagePulled {
        image: String,
    },
    /// A container with the well-known name and expected image was found.
    ContainerFound {
        id: String,
        state: ContainerState,
    },
    /// A same-named container built from another image was passed over.
    StaleContainerSkipped {
        id: String,
        image: String,
    },
    StaleContainerRemoved {
        id: String,
    },
    ContainerCreated {
        id: String,
        host_port: u16,
    },
    ContainerStarted {
        id: String,
    },
    ContainerUnpaused {
        id: String,
    },
    /// Found in a state the reconciler does not act on.
    ContainerLeftAsIs {
        id: String,
        state: ContainerState,
    },
    ContainerStopped {
        id: String,
    },
    ContainerRemoved {
        id: String,
    },
    /// The probe could not reach the service.
    ProbeFailed {
        attempt: u32,
        reason: String,
    },
    /// The service answered with something other than 200.
    ProbeNotReady {
        attempt: u32,
        status: u16,
    },
    ServiceReady {
        endpoint: String,
        attempts: u32,
        elapsed: Duration,
    },
    IndexesWiped,
    WipeFailed {
        reason: String,
    },
    IndexCreated {
        name: String,
    },
    IndexCreateFailed {
        name: String,
        reason: String,
    },
}

/// Receives lifecycle events. Must not block.
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        use LifecycleEvent::*;

        match event {
            StageReached(stage) => tracing::debug!("Reached stage {:?}", stage),
            ImagePresent { image } => tracing::debug!("Image '{}' exists locally", image),
            ImagePulled { image } => tracing::info!("Pulled image: {}", image),
            ContainerFound { id, state } => {
                tracing::info!("Found existing ES container {} ({})", id, state)
            }
            StaleContainerSkipped { id, image } => {
                tracing::debug!("Skipping container {} built from {}", id, image)
            }
            StaleContainerRemoved { id } => tracing::info!("Removed stale container {}", id),
            ContainerCreated { id, host_port } => {
                tracing::info!("Created ES container {} on port {}", id, host_port)
            }
            ContainerStarted { id } => tracing::info!("Started ES container {}", id),
            ContainerUnpaused { id } => tracing::info!("Unpaused ES container {}", id),
            ContainerLeftAsIs { id, state } => {
                tracing::warn!("ES container {} is {}, leaving it as-is", id, state)
            }
            ContainerStopped { id } => tracing::info!("Stopped ES container {}", id),
            ContainerRemoved { id } => tracing::info!("Removed ES container {}", id),
            ProbeFailed { attempt, reason } => {
                tracing::trace!("Probe {} failed: {}", attempt, reason)
            }
            ProbeNotReady { attempt, status } => {
                tracing::trace!("Probe {} returned HTTP {}", attempt, status)
            }
            ServiceReady {
                endpoint,
                attempts,
                elapsed,
            } => tracing::info!(
                "ES container is up and running at {} after {} probes ({:?})",
                endpoint,
                attempts,
                elapsed
            ),
            IndexesWiped => tracing::debug!("Wiped out all current indices"),
            WipeFailed { reason } => tracing::warn!("Failed to wipe indices: {}", reason),
            IndexCreated { name } => tracing::debug!("Created {} index", name),
            IndexCreateFailed { name, reason } => {
                tracing::warn!("Failed to create {} index: {}", name, reason)
            }
        }
    }
}

/// Install a fmt subscriber honoring `RUST_LOG`.
///
/// Defaults to `es_local_docker=info`. Safe to call more than once; only the
/// first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("es_local_docker=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

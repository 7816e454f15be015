//! Container runtime seam.
//!
//! The reconciler only talks to a [`ContainerRuntime`]. [`DockerRuntime`]
//! implements it over the Docker Engine API; tests use
//! [`crate::testing::FakeRuntime`].

mod docker;

use async_trait::async_trait;

pub use docker::{DockerRuntime, connect_docker};

use crate::config::{CONTAINER_PORT, StartOptions};
use crate::error::Result;

/// Lifecycle state of a runtime-managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// No such container.
    Absent,
    Created,
    Running,
    Paused,
    Exited,
    Restarting,
    Removing,
    Dead,
    /// Removed by `stop`.
    Removed,
    /// A state string this crate does not know.
    Unknown(String),
}

impl ContainerState {
    /// Parse the runtime's state string (`"running"`, `"exited"`, ...).
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "" => Self::Unknown(String::new()),
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "exited" => Self::Exited,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "dead" => Self::Dead,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Exited => write!(f, "exited"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Dead => write!(f, "dead"),
            Self::Removed => write!(f, "removed"),
            Self::Unknown(s) => write!(f, "unknown ({s})"),
        }
    }
}

/// A container as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Names as the runtime reports them (Docker prefixes them with `/`).
    pub names: Vec<String>,
    /// Image tag the container was created from.
    pub image: String,
    pub state: ContainerState,
}

impl ContainerSummary {
    /// Whether one of the names is exactly `name`.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.trim_start_matches('/') == name)
    }
}

/// Handle to the managed container, with its last-known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) image: String,
    pub(crate) state: ContainerState,
}

impl ContainerRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Last state observed or caused by this crate.
    pub fn state(&self) -> &ContainerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

/// A host port published to a container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Interface to bind on the host.
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

/// Everything needed to find or create the managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Well-known name.
    pub name: String,
    pub image: String,
    /// Environment: (name, value).
    pub env: Vec<(String, String)>,
    pub ports: Vec<PortMapping>,
}

impl ContainerSpec {
    /// Single-node Elasticsearch published on all host interfaces.
    pub fn elasticsearch(options: &StartOptions) -> Self {
        Self {
            name: options.container_name.clone(),
            image: options.image.clone(),
            env: options.container_env(),
            ports: vec![PortMapping {
                host_ip: "0.0.0.0".to_string(),
                host_port: options.port,
                container_port: CONTAINER_PORT,
            }],
        }
    }

    /// Host port of the first mapping.
    pub fn host_port(&self) -> Option<u16> {
        self.ports.first().map(|p| p.host_port)
    }

    /// `KEY=value` strings as the runtime expects them.
    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// Container operations the lifecycle needs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the image is present locally.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull the image by tag.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// All containers (running or not) whose name contains `name`.
    async fn list_containers(&self, name: &str) -> Result<Vec<ContainerSummary>>;

    /// Create a container, returning its id. Does not start it.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn unpause_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Remove a container; `force` kills it first if it is running.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;
}

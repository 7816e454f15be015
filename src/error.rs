//! Error types for the local Elasticsearch lifecycle.

use std::time::Duration;

use thiserror::Error;

use crate::indexes::IndexFailure;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, ElasticError>;

/// Errors that can occur while provisioning or tearing down the container.
#[derive(Debug, Error)]
pub enum ElasticError {
    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// Failed to pull the image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image tag.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start (or unpause) the container.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        /// Container name or id.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Any other container runtime call failed.
    #[error("Container runtime failed to {operation} '{target}': {reason}")]
    Runtime {
        /// What was being attempted (e.g. "stop", "remove", "list").
        operation: &'static str,
        /// Container id, name or image the operation targeted.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// The start options are unusable.
    #[error("Invalid start options: {reason}")]
    InvalidOptions {
        /// What is wrong with them.
        reason: String,
    },

    /// Configuration could not be resolved from the environment.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The service never answered the readiness probe with 200.
    #[error("Elasticsearch at {endpoint} not ready after {attempts} probes within {timeout:?}")]
    ReadinessTimeout {
        /// Probed URL.
        endpoint: String,
        /// Number of probes issued.
        attempts: u32,
        /// Configured deadline.
        timeout: Duration,
    },

    /// One or more index operations failed during the reset.
    ///
    /// The container is left running; `container_id` identifies it so the
    /// caller can still tear it down.
    #[error("Index reset failed on container {container_id}: {}", summarize(.failures))]
    IndexReset {
        /// Container that was left running.
        container_id: String,
        /// Every failed operation, in the order attempted.
        failures: Vec<IndexFailure>,
    },

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),
}

fn summarize(failures: &[IndexFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

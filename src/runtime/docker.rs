//! [`ContainerRuntime`] over the Docker Engine API.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use futures::StreamExt;

use crate::error::{ElasticError, Result};
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ContainerSummary};

/// Seconds Docker waits for Elasticsearch to exit before killing it.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Connect to the Docker daemon and check it responds.
///
/// Tries the platform defaults first (honoring `DOCKER_HOST`), then the
/// sockets Docker Desktop, Colima and rootless Podman use.
pub async fn connect_docker() -> Result<Docker> {
    let mut last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    #[cfg(unix)]
    for path in fallback_sockets() {
        if !std::path::Path::new(&path).exists() {
            continue;
        }
        match Docker::connect_with_socket(&path, 120, bollard::API_DEFAULT_VERSION) {
            Ok(docker) => match docker.ping().await {
                Ok(_) => {
                    tracing::debug!("Connected to Docker via {}", path);
                    return Ok(docker);
                }
                Err(e) => last_error = format!("{}: {}", path, e),
            },
            Err(e) => last_error = format!("{}: {}", path, e),
        }
    }

    Err(ElasticError::DockerNotAvailable { reason: last_error })
}

#[cfg(unix)]
fn fallback_sockets() -> Vec<String> {
    let mut paths = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        paths.push(format!("{home}/.docker/run/docker.sock"));
        paths.push(format!("{home}/.colima/default/docker.sock"));
    }
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        paths.push(format!("{runtime_dir}/podman/podman.sock"));
        paths.push(format!("{runtime_dir}/docker.sock"));
    }
    paths
}

/// 304 means the container was already in the requested state.
fn is_not_modified(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

/// Docker-backed container runtime.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect with [`connect_docker`].
    pub async fn connect() -> Result<Self> {
        Ok(Self::new(connect_docker().await?))
    }

    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ElasticError::Runtime {
                operation: "inspect image",
                target: image.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(ElasticError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ElasticError::Runtime {
                operation: "list containers named",
                target: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    names: c.names.unwrap_or_default(),
                    image: c.image.unwrap_or_default(),
                    state: c
                        .state
                        .as_deref()
                        .map(ContainerState::parse)
                        .unwrap_or_else(|| ContainerState::Unknown(String::new())),
                })
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let config = container_config(spec);
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ElasticError::ContainerCreationFailed {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        for warning in &response.warnings {
            tracing::warn!("Docker warning creating {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(ElasticError::ContainerStartFailed {
                name: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        self.docker
            .unpause_container(id)
            .await
            .map_err(|e| ElasticError::ContainerStartFailed {
                name: id.to_string(),
                reason: format!("unpause failed: {e}"),
            })
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        match self
            .docker
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(ElasticError::Runtime {
                operation: "stop",
                target: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ElasticError::Runtime {
                operation: "remove",
                target: id.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Docker create payload for `spec`: image, env and published ports.
fn container_config(spec: &ContainerSpec) -> Config<String> {
    let mut port_bindings = HashMap::new();
    for mapping in &spec.ports {
        port_bindings.insert(
            format!("{}/tcp", mapping.container_port),
            Some(vec![PortBinding {
                host_ip: Some(mapping.host_ip.clone()),
                host_port: Some(mapping.host_port.to_string()),
            }]),
        );
    }

    // bollard expects HashMap<String, HashMap<(), ()>>
    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .ports
        .iter()
        .map(|m| (format!("{}/tcp", m.container_port), HashMap::new()))
        .collect();

    let env = spec.env_strings();

    Config {
        image: Some(spec.image.clone()),
        env: if env.is_empty() { None } else { Some(env) },
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StartOptions;

    #[test]
    fn test_not_modified_detection() {
        let not_modified = DockerError::DockerResponseServerError {
            status_code: 304,
            message: String::new(),
        };
        let conflict = DockerError::DockerResponseServerError {
            status_code: 409,
            message: "Conflict".to_string(),
        };

        assert!(is_not_modified(&not_modified));
        assert!(!is_not_modified(&conflict));
    }

    #[test]
    fn test_container_config_publishes_port_on_all_interfaces() {
        let options = StartOptions::default()
            .with_port(9250)
            .with_env("cluster.name", "local");
        let config = container_config(&ContainerSpec::elasticsearch(&options));

        assert_eq!(config.image.as_deref(), Some("elasticsearch:7.13.2"));
        assert_eq!(
            config.env,
            Some(vec![
                "discovery.type=single-node".to_string(),
                "ES_JAVA_OPTS=-Xms750m -Xmx750m".to_string(),
                "cluster.name=local".to_string(),
            ])
        );
        assert!(
            config
                .exposed_ports
                .as_ref()
                .is_some_and(|p| p.contains_key("9200/tcp"))
        );

        let host_config = config.host_config.unwrap();
        let bindings = host_config.port_bindings.unwrap();
        let binding = &bindings["9200/tcp"].as_ref().unwrap()[0];
        assert_eq!(binding.host_ip.as_deref(), Some("0.0.0.0"));
        assert_eq!(binding.host_port.as_deref(), Some("9250"));
        assert_eq!(host_config.auto_remove, Some(false));
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_connect_docker_pings_daemon() {
        let runtime = DockerRuntime::connect().await.unwrap();
        assert!(runtime.image_exists("definitely-not-an-image:nope").await.is_ok());
    }
}

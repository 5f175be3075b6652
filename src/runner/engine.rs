//! Container engine driver for sandbox workers.
//!
//! [`ContainerEngine`] is the seam between the pool and the container
//! runtime: create/start a named sandbox with published port and resource
//! caps, force-remove it, and sweep strays left behind by a previous
//! process. [`DockerEngine`] is the production implementation over the
//! Docker API; tests substitute in-memory engines.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use tracing::{info, instrument, warn};

use super::error::RunnerError;

/// Name prefix shared by every sandbox container this grader creates.
///
/// The stray sweep removes *any* container carrying the prefix, so the
/// prefix must not collide with containers owned by other services on the
/// host.
pub const CONTAINER_NAME_PREFIX: &str = "runner-";

/// Returns the container name for a slot.
#[must_use]
pub fn container_name(slot: usize) -> String {
    format!("{CONTAINER_NAME_PREFIX}{slot}")
}

/// Parameters for starting one sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStartRequest {
    /// Slot index; determines the container name.
    pub slot: usize,
    /// Image to instantiate.
    pub image: String,
    /// Port the worker listens on inside the container.
    pub port_internal: u16,
    /// Host port the worker is published on.
    pub port_external: u16,
}

/// A container the engine created and started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedContainer {
    /// Engine-assigned container id.
    pub container_id: String,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Creates, destroys, and sweeps sandbox containers.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Creates and starts a sandbox container.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Engine`] if the container cannot be created
    /// or started.
    async fn start(&self, request: &ContainerStartRequest) -> Result<StartedContainer>;

    /// Force-removes a container, including its volumes.
    ///
    /// Teardown is best-effort: failures are logged, never propagated.
    async fn stop(&self, container_id: &str);

    /// Removes every container (running or stopped) whose name carries
    /// [`CONTAINER_NAME_PREFIX`]. Run once at startup to recover from a
    /// crashed predecessor.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Engine`] if containers cannot be listed.
    /// Individual removal failures are logged and skipped.
    async fn cleanup_stray(&self) -> Result<()>;
}

/// Docker-backed [`ContainerEngine`].
#[derive(Debug)]
pub struct DockerEngine {
    client: Docker,
    nano_cpus: i64,
    memory_bytes: i64,
}

impl DockerEngine {
    /// Connects to the local Docker daemon and fixes the resource caps
    /// applied to every sandbox.
    ///
    /// `cpu_limit_cores` is fractional (0.5 = half a core);
    /// `memory_limit_kib` is in KiB.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Engine`] if the daemon is unreachable.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(cpu_limit_cores: f64, memory_limit_kib: i64) -> Result<Self> {
        let client =
            Docker::connect_with_local_defaults().map_err(|e| RunnerError::engine("connect", e))?;

        Ok(Self {
            client,
            nano_cpus: (cpu_limit_cores * 1e9) as i64,
            memory_bytes: memory_limit_kib * 1024,
        })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    #[instrument(skip(self), fields(slot = request.slot, image = %request.image))]
    async fn start(&self, request: &ContainerStartRequest) -> Result<StartedContainer> {
        let name = container_name(request.slot);
        let port_key = format!("{}/tcp", request.port_internal);

        let exposed_ports = HashMap::from([(port_key.clone(), HashMap::new())]);
        let port_bindings = HashMap::from([(
            port_key,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(request.port_external.to_string()),
            }]),
        )]);

        let config = Config {
            hostname: Some(name.clone()),
            image: Some(request.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                privileged: Some(false),
                port_bindings: Some(port_bindings),
                memory: Some(self.memory_bytes),
                nano_cpus: Some(self.nano_cpus),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| RunnerError::engine("create", e))?;

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RunnerError::engine("start", e))?;

        Ok(StartedContainer {
            container_id: created.id,
        })
    }

    async fn stop(&self, container_id: &str) {
        let result = self
            .client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await;

        if let Err(error) = result {
            warn!(container_id, %error, "failed to remove container");
        }
    }

    #[instrument(skip(self))]
    async fn cleanup_stray(&self) -> Result<()> {
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| RunnerError::engine("list", e))?;

        for container in containers {
            // The engine reports names with a leading slash.
            let is_stray = container.names.as_ref().is_some_and(|names| {
                names
                    .first()
                    .is_some_and(|n| n.trim_start_matches('/').starts_with(CONTAINER_NAME_PREFIX))
            });
            let Some(id) = container.id else { continue };

            if is_stray {
                info!(container_id = %id, "removing stray sandbox container");
                self.stop(&id).await;
            }
        }

        Ok(())
    }
}

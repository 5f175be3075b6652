//! Sandbox container lifecycle: engine driver and slot-allocated pool.
//!
//! This module owns the sandbox side of the grader:
//! - [`ContainerEngine`] / [`DockerEngine`] - create, destroy, and sweep
//!   sandbox containers through the container runtime
//! - [`RunnerPool`] - slot allocator, RPC-client attachment, readiness
//!   polling, deferred-shutdown reaper
//! - [`SandboxLease`] - a handler's exclusive use of one instance for one
//!   grading run
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gradecore::rpc::GrpcConnector;
//! use gradecore::runner::{ContainerTemplate, DockerEngine, RunnerPool};
//!
//! let engine = Arc::new(DockerEngine::new(0.5, 262_144)?);
//! let pool = Arc::new(RunnerPool::new(engine, Arc::new(GrpcConnector::new())));
//! pool.cleanup_stray().await?;
//!
//! let lease = pool.create(&template).await?;
//! pool.wait_ready(&lease, Duration::from_secs(10)).await?;
//! // ... compile and test through lease.client() ...
//! drop(lease); // flags the sandbox for the reaper
//! ```

mod engine;
mod error;
mod pool;

pub use engine::{
    CONTAINER_NAME_PREFIX, ContainerEngine, ContainerStartRequest, DockerEngine, Result,
    StartedContainer, container_name,
};
pub use error::{EngineFailure, RunnerError};
pub use pool::{DEFAULT_BASE_PORT, RunnerPool, SandboxInstance, SandboxLease};

use serde::Deserialize;

/// Static per-language sandbox recipe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerTemplate {
    /// Container image to instantiate.
    pub image: String,
    /// Port the worker agent listens on inside the container.
    pub port_internal: u16,
}

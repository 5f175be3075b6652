//! Error types for the runner module.

use std::time::Duration;

use thiserror::Error;

use crate::rpc::RpcError;

/// Boxed error from a container engine implementation.
pub type EngineFailure = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while driving sandbox containers.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The pool was configured with an external base port of 0.
    #[error("invalid configuration, tried to use external base port 0")]
    InvalidBasePort,

    /// The container engine failed an operation.
    #[error("container engine failure during {operation}: {source}")]
    Engine {
        /// The operation that failed (`create`, `start`, `list`, ...).
        operation: &'static str,
        /// The underlying engine error.
        #[source]
        source: EngineFailure,
    },

    /// The RPC client could not be attached to a started sandbox.
    #[error("failed to attach sandbox rpc client: {0}")]
    Attach(#[from] RpcError),

    /// The sandbox worker did not answer `Ping` before the deadline.
    #[error("sandbox worker not ready within {timeout:?}")]
    NotReady {
        /// How long readiness was polled for.
        timeout: Duration,
    },
}

impl RunnerError {
    /// Creates an engine failure with operation context.
    pub fn engine(operation: &'static str, source: impl Into<EngineFailure>) -> Self {
        Self::Engine {
            operation,
            source: source.into(),
        }
    }
}

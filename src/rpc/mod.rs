//! Sandbox worker RPC client.
//!
//! Each sandbox container runs a worker agent exposing the `sandbox.Sandbox`
//! gRPC service (see `proto/sandbox.proto`) on a plaintext TCP port
//! published to the host. This module wraps the generated client behind the
//! [`SandboxClient`] trait so the pool and the grading pipeline depend on
//! the four calls, not on the transport; tests substitute scripted clients.
//!
//! [`SandboxConnector`] produces clients from a host port. The production
//! connector dials lazily: the channel is established on first use, which
//! is what lets [`crate::runner::RunnerPool::wait_ready`] poll `Ping` while
//! the worker is still booting.

mod generated;

pub use generated::{CompileResult, Empty, Source, TestContext, TestResult};

use async_trait::async_trait;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};

use generated::sandbox_client::SandboxClient as GeneratedClient;

/// Errors returned by sandbox RPC calls.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The worker endpoint address could not be parsed.
    #[error("invalid sandbox endpoint {uri}: {source}")]
    Endpoint {
        /// The rejected endpoint URI.
        uri: String,
        /// The underlying transport error.
        #[source]
        source: tonic::transport::Error,
    },

    /// The call failed with a gRPC status.
    #[error("sandbox rpc failed: {0}")]
    Status(#[from] tonic::Status),
}

impl RpcError {
    /// Whether the failure was a deadline expiry observed by the RPC layer.
    #[must_use]
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::Status(status) if status.code() == tonic::Code::DeadlineExceeded)
    }
}

/// Result type for sandbox RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Outcome of a `Compile` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReply {
    /// Captured compile stdout+stderr, possibly empty.
    pub output: Vec<u8>,
    /// Whether the compile command exited successfully.
    pub success: bool,
}

/// Outcome of a `Test` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReply {
    /// SHA-256 of the scrubbed captured output.
    pub hash: Vec<u8>,
    /// Full scrubbed output when requested.
    pub output: Option<Vec<u8>>,
}

/// The four calls every sandbox worker answers.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Readiness probe.
    async fn ping(&self) -> Result<()>;

    /// Compiles the submitted source, returning captured output and the
    /// command outcome.
    async fn compile(&self, source: &[u8]) -> Result<CompileReply>;

    /// Runs one test case with the given stdin payload.
    async fn test(&self, input: &[u8], hash_only: bool) -> Result<TestReply>;

    /// Asks the worker to terminate itself shortly after replying.
    async fn shutdown(&self) -> Result<()>;
}

/// Produces a [`SandboxClient`] for a sandbox published on a host port.
#[async_trait]
pub trait SandboxConnector: Send + Sync {
    /// Attaches a client to `127.0.0.1:<port>`.
    async fn connect(&self, port: u16) -> Result<Box<dyn SandboxClient>>;
}

/// gRPC-backed [`SandboxClient`] over a lazily-connected channel.
#[derive(Debug, Clone)]
pub struct GrpcSandboxClient {
    inner: GeneratedClient<Channel>,
}

impl GrpcSandboxClient {
    /// Wraps an established (or lazy) channel.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: GeneratedClient::new(channel),
        }
    }
}

#[async_trait]
impl SandboxClient for GrpcSandboxClient {
    async fn ping(&self) -> Result<()> {
        let mut client = self.inner.clone();
        client.ping(Empty {}).await?;
        Ok(())
    }

    async fn compile(&self, source: &[u8]) -> Result<CompileReply> {
        let mut client = self.inner.clone();
        let reply = client
            .compile(Source {
                source: source.to_vec(),
            })
            .await?
            .into_inner();
        Ok(CompileReply {
            output: reply.data,
            success: reply.success,
        })
    }

    async fn test(&self, input: &[u8], hash_only: bool) -> Result<TestReply> {
        let mut client = self.inner.clone();
        let reply = client
            .test(TestContext {
                source: input.to_vec(),
                opt_hash_only: Some(hash_only),
            })
            .await?
            .into_inner();
        Ok(TestReply {
            hash: reply.hash,
            output: reply.result,
        })
    }

    async fn shutdown(&self) -> Result<()> {
        let mut client = self.inner.clone();
        client.shutdown(Empty {}).await?;
        Ok(())
    }
}

/// Production connector: lazy plaintext channel to the loopback interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcConnector;

impl GrpcConnector {
    /// Creates the connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SandboxConnector for GrpcConnector {
    async fn connect(&self, port: u16) -> Result<Box<dyn SandboxClient>> {
        let uri = format!("http://127.0.0.1:{port}");
        let endpoint = Endpoint::from_shared(uri.clone()).map_err(|e| RpcError::Endpoint {
            uri,
            source: e,
        })?;
        // connect_lazy defers the TCP handshake to the first call, so a
        // still-booting worker does not fail attachment; readiness is
        // observed through ping polling instead.
        Ok(Box::new(GrpcSandboxClient::new(endpoint.connect_lazy())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_deadline_detection() {
        let err = RpcError::Status(tonic::Status::deadline_exceeded("case timed out"));
        assert!(err.is_deadline());

        let err = RpcError::Status(tonic::Status::unavailable("worker gone"));
        assert!(!err.is_deadline());
    }

    #[tokio::test]
    async fn test_grpc_connector_attaches_lazily() {
        // Nothing listens on this port; attachment must still succeed
        // because the channel is lazy.
        let connector = GrpcConnector::new();
        let client = connector.connect(1).await.unwrap();

        // The first actual call observes the connection failure.
        let err = client.ping().await.unwrap_err();
        assert!(!err.is_deadline());
    }
}

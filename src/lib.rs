//! Grading Core Library
//!
//! This library implements an automated code-grading core: it consumes
//! grading jobs (a submitted program plus input/expected-output test cases
//! tagged with a target language), runs the submission inside a fresh,
//! resource-capped, per-language sandbox container, scores each test case,
//! and publishes a structured verdict.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - JSON configuration loading and validation
//! - [`fetcher`] - Resolution of `base64://` and `http(s)://` job URIs
//! - [`scrubber`] - Output canonicalization before hashing
//! - [`rpc`] - Sandbox worker RPC client (gRPC over plaintext TCP)
//! - [`runner`] - Container engine driver and slot-allocated sandbox pool
//! - [`grading`] - Per-job pipeline: acquire, fetch, compile, test, verdict
//! - [`gateway`] - Queue gateway: bounded polling, dispatch, ack/nack
//!
//! Two long-lived loops drive the system: the gateway tick loop (poll the
//! queue, spawn handler tasks) and the pool tick loop (reap sandboxes
//! flagged for shutdown). Per-job handlers run concurrently up to the
//! configured cap.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod fetcher;
pub mod gateway;
pub mod grading;
pub mod rpc;
pub mod runner;
pub mod scrubber;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use fetcher::{FetchError, Fetcher};
pub use gateway::{AmqpTransport, Gateway, GatewayError, Transport};
pub use grading::{
    CaseResult, GradingError, GradingService, Request, Response, Settings, StatusCode, TestCase,
};
pub use rpc::{CompileReply, GrpcConnector, RpcError, SandboxClient, SandboxConnector, TestReply};
pub use runner::{
    ContainerEngine, ContainerStartRequest, ContainerTemplate, DockerEngine, RunnerError,
    RunnerPool, SandboxLease,
};
pub use scrubber::scrub;

//! Verdict status taxonomy and the grading error wrapper.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enumerated outcome of one grading job.
///
/// The taxonomy partitions verdicts into success, submission faults (the
/// grader did its job; the submission failed), and system faults (the
/// infrastructure failed; the job should be retried elsewhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// All test cases executed; pass flags carry the per-case outcome.
    Completed,

    /// The compile command reported failure or errored.
    FailCompilation,
    /// Compilation did not finish before the system deadline.
    FailCompilationTimeout,
    /// At least one case exceeded its soft time limit.
    FailTimeout,
    /// A case exceeded its hard time limit; the job was aborted.
    FailTimeoutHard,
    /// Reserved: per-case memory verdicts are produced by the worker agent.
    FailMemory,

    /// Unclassified infrastructure failure.
    SystemFail,
    /// No sandbox template is registered for the requested language.
    SystemFailMissingImage,
    /// A source or test-file URI could not be fetched.
    SystemFailFetchFile,
    /// The sandbox container could not be started.
    SystemFailContainer,
    /// The sandbox worker never became ready.
    SystemFailContainerPing,
    /// Reserved: redelivery budget exhausted.
    SystemFailRetryExceed,

    /// Initial value before grading assigns a verdict.
    Unknown,
}

impl StatusCode {
    /// Wire representation, e.g. `FAIL_TIMEOUT_HARD`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::FailCompilation => "FAIL_COMPILATION",
            Self::FailCompilationTimeout => "FAIL_COMPILATION_TIMEOUT",
            Self::FailTimeout => "FAIL_TIMEOUT",
            Self::FailTimeoutHard => "FAIL_TIMEOUT_HARD",
            Self::FailMemory => "FAIL_MEMORY",
            Self::SystemFail => "SYSTEM_FAIL",
            Self::SystemFailMissingImage => "SYSTEM_FAIL_MISSING_IMAGE",
            Self::SystemFailFetchFile => "SYSTEM_FAIL_FETCH_FILE",
            Self::SystemFailContainer => "SYSTEM_FAIL_CONTAINER",
            Self::SystemFailContainerPing => "SYSTEM_FAIL_CONTAINER_PING",
            Self::SystemFailRetryExceed => "SYSTEM_FAIL_RETRY_EXCEED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether this code reports an infrastructure fault rather than a
    /// property of the submission.
    #[must_use]
    pub fn is_system_fault(self) -> bool {
        matches!(
            self,
            Self::SystemFail
                | Self::SystemFailMissingImage
                | Self::SystemFailFetchFile
                | Self::SystemFailContainer
                | Self::SystemFailContainerPing
                | Self::SystemFailRetryExceed
        )
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grading failure carrying its verdict code and underlying cause.
#[derive(Debug, Error)]
#[error("{status}: {source}")]
pub struct GradingError {
    /// The verdict this failure maps to.
    status: StatusCode,
    /// The underlying cause.
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl GradingError {
    /// Wraps a cause with its verdict code.
    pub fn new(
        status: StatusCode,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            status,
            source: source.into(),
        }
    }

    /// The verdict this failure maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

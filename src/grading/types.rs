//! Wire types for grading jobs and verdicts.
//!
//! Requests arrive from and responses return to the message queue as JSON
//! with camelCase field names. `metadata` is an opaque JSON object echoed
//! verbatim so callers can correlate responses without the grader knowing
//! its shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::StatusCode;

/// One input/expected-output pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// URI of the bytes piped to the submission.
    pub input_url: String,
    /// URI of the expected output.
    pub expected_output_url: String,
}

/// Optional per-job limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Soft per-case time limit in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    /// Requested memory limit in KiB. Carried for the worker agent; the
    /// enforced container cap comes from global configuration.
    #[serde(
        default,
        rename = "memoryLimitKiB",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_limit_kib: Option<u64>,
}

/// A grading job pulled from the request queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Language identifier selecting the sandbox template (lowercased
    /// before lookup).
    pub language: String,
    /// URI of the submitted source program.
    pub source_url: String,
    /// Ordered test cases.
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    /// Optional per-job limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    /// Opaque correlation data echoed into the response.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Outcome of one test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    /// Whether the case passed: hashes matched and the soft limit held.
    pub pass: bool,
    /// Base64 of the SHA-256 the worker computed over scrubbed output.
    pub hash_base64: String,
    /// Wall-clock duration of the test call in milliseconds.
    pub time_ms: u64,
    /// Reserved; per-case memory accounting lives in the worker agent.
    #[serde(rename = "memoryKiB")]
    pub memory_kib: u64,
}

/// The verdict published to the response queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Captured compile stdout+stderr; may be empty.
    pub compile_output: String,
    /// Job verdict.
    pub status: StatusCode,
    /// Per-case outcomes, aligned 1:1 with the request's test cases.
    /// Entries past a short-circuit point are zero-valued.
    pub results: Vec<CaseResult>,
    /// Echoed from the request.
    pub metadata: Map<String, Value>,
}

impl Response {
    /// A response skeleton for a request: unknown status, zero-valued
    /// results aligned with the test cases, metadata echoed.
    #[must_use]
    pub fn skeleton(request: &Request) -> Self {
        Self {
            compile_output: String::new(),
            status: StatusCode::Unknown,
            results: vec![CaseResult::default(); request.test_cases.len()],
            metadata: request.metadata.clone(),
        }
    }
}

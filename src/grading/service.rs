//! The per-job grading pipeline.
//!
//! One grading run is a strictly sequential state machine: acquire a
//! sandbox from the pool, wait for the worker to answer ping, fetch the
//! submitted source, compile it, then run every test case in order,
//! hashing expected outputs and comparing them against the hash the worker
//! computed over the scrubbed program output. Teardown is owned by the
//! sandbox lease: dropping it flags the instance for the pool reaper on
//! every exit path.
//!
//! # Timeouts
//!
//! Three layers, outside-in, all on the tokio clock:
//! - a **system deadline** covering acquisition, readiness, source fetch,
//!   and compilation; every setup stage polls against the same deadline so
//!   a slow container boot eats into the compile budget, not past it
//! - a **per-case hard timeout** (`min(soft + 1s, cap)`) cancelling the
//!   test RPC; expiry aborts the job with `FAIL_TIMEOUT_HARD`
//! - a **per-case soft limit** checked against wall time after the RPC
//!   returns; exceeding it fails the case and the job verdict becomes
//!   `FAIL_TIMEOUT`, but remaining cases still run

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, instrument, warn};

use crate::fetcher::Fetcher;
use crate::runner::{ContainerTemplate, RunnerPool, SandboxLease};
use crate::scrubber::scrub;

use super::status::{GradingError, StatusCode};
use super::types::{CaseResult, Request, Response};

/// Soft per-case time limit applied when the request carries none.
pub const DEFAULT_TIME_LIMIT_MS: u64 = 1000;

/// Margin added to the soft limit to form the per-case hard timeout.
pub const HARD_LIMIT_MARGIN_MS: u64 = 1000;

/// Upper bound on the per-case hard timeout.
pub const HARD_LIMIT_CAP_MS: u64 = 10_000;

/// Outer deadline covering sandbox acquisition, readiness, source fetch,
/// and compilation.
pub const SYSTEM_DEADLINE_MS: u64 = 10_000;

/// Language identifier → sandbox template.
pub type TemplateMap = HashMap<String, ContainerTemplate>;

#[derive(Debug, Error)]
#[error("deadline elapsed")]
struct DeadlineElapsed;

/// Grades jobs against the sandbox pool.
pub struct GradingService {
    pool: Arc<RunnerPool>,
    fetcher: Fetcher,
    templates: TemplateMap,
}

impl GradingService {
    /// Creates a grading service over a pool, a fetcher, and the
    /// configured language templates.
    #[must_use]
    pub fn new(pool: Arc<RunnerPool>, fetcher: Fetcher, templates: TemplateMap) -> Self {
        Self {
            pool,
            fetcher,
            templates,
        }
    }

    /// Grades one job.
    ///
    /// The response is always fully populated: verdict status, one result
    /// entry per requested test case (zero-valued past a short-circuit
    /// point), captured compile output, and echoed metadata. The error is
    /// returned only for system faults, signalling the caller to requeue
    /// the job; submission faults are verdicts, not errors.
    #[instrument(skip(self, request), fields(language = %request.language, cases = request.test_cases.len()))]
    pub async fn grade(&self, request: &Request) -> (Response, Option<GradingError>) {
        let mut response = Response::skeleton(request);

        match self.run(request, &mut response).await {
            Ok(status) => {
                response.status = status;
                info!(status = %status, "graded");
                (response, None)
            }
            Err(error) => {
                let status = error.status();
                response.status = status;
                if status.is_system_fault() {
                    warn!(%error, "grading failed");
                    (response, Some(error))
                } else {
                    info!(status = %status, cause = %error, "graded");
                    (response, None)
                }
            }
        }
    }

    async fn run(
        &self,
        request: &Request,
        response: &mut Response,
    ) -> Result<StatusCode, GradingError> {
        let language = request.language.to_lowercase();
        let template = self.templates.get(&language).ok_or_else(|| {
            GradingError::new(
                StatusCode::SystemFailMissingImage,
                format!("no sandbox template for language {language}"),
            )
        })?;

        let deadline = Instant::now() + Duration::from_millis(SYSTEM_DEADLINE_MS);

        let lease = match timeout_at(deadline, self.pool.create(template)).await {
            Ok(Ok(lease)) => lease,
            Ok(Err(error)) => {
                return Err(GradingError::new(StatusCode::SystemFailContainer, error));
            }
            Err(_) => {
                return Err(GradingError::new(
                    StatusCode::SystemFailContainer,
                    DeadlineElapsed,
                ));
            }
        };

        // From here teardown is guaranteed: dropping the lease flags the
        // sandbox for the pool reaper.
        self.run_in_sandbox(request, response, &lease, deadline)
            .await
    }

    async fn run_in_sandbox(
        &self,
        request: &Request,
        response: &mut Response,
        lease: &SandboxLease,
        deadline: Instant,
    ) -> Result<StatusCode, GradingError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.pool
            .wait_ready(lease, remaining)
            .await
            .map_err(|error| GradingError::new(StatusCode::SystemFailContainerPing, error))?;

        let source = match timeout_at(deadline, self.fetcher.get(&request.source_url)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(error)) => {
                return Err(GradingError::new(StatusCode::SystemFailFetchFile, error));
            }
            Err(_) => {
                return Err(GradingError::new(
                    StatusCode::SystemFailFetchFile,
                    DeadlineElapsed,
                ));
            }
        };

        match timeout_at(deadline, lease.client().compile(&source)).await {
            Ok(Ok(reply)) => {
                response.compile_output = String::from_utf8_lossy(&reply.output).into_owned();
                if !reply.success {
                    return Err(GradingError::new(
                        StatusCode::FailCompilation,
                        "compile command reported failure",
                    ));
                }
            }
            Ok(Err(error)) if error.is_deadline() => {
                return Err(GradingError::new(StatusCode::FailCompilationTimeout, error));
            }
            Ok(Err(error)) => {
                return Err(GradingError::new(StatusCode::FailCompilation, error));
            }
            Err(_) => {
                return Err(GradingError::new(
                    StatusCode::FailCompilationTimeout,
                    DeadlineElapsed,
                ));
            }
        }

        let soft_limit_ms = request
            .settings
            .as_ref()
            .and_then(|settings| settings.time_limit_ms)
            .unwrap_or(DEFAULT_TIME_LIMIT_MS);
        let soft_limit = Duration::from_millis(soft_limit_ms);
        let hard_limit = Duration::from_millis(
            soft_limit_ms
                .saturating_add(HARD_LIMIT_MARGIN_MS)
                .min(HARD_LIMIT_CAP_MS),
        );

        let mut any_soft_exceeded = false;

        for (index, case) in request.test_cases.iter().enumerate() {
            let input = self.fetch(&case.input_url).await?;
            let expected = self.fetch(&case.expected_output_url).await?;
            let expected_hash = Sha256::digest(scrub(&expected));

            let case_started = Instant::now();
            let reply = match timeout(hard_limit, lease.client().test(&input, true)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(error)) if error.is_deadline() => {
                    return Err(GradingError::new(StatusCode::FailTimeoutHard, error));
                }
                Ok(Err(error)) => {
                    return Err(GradingError::new(StatusCode::SystemFail, error));
                }
                Err(_) => {
                    return Err(GradingError::new(StatusCode::FailTimeoutHard, DeadlineElapsed));
                }
            };

            let elapsed = case_started.elapsed();
            let soft_exceeded = elapsed > soft_limit;
            any_soft_exceeded |= soft_exceeded;

            let pass = !soft_exceeded && reply.hash.as_slice() == expected_hash.as_slice();
            response.results[index] = CaseResult {
                pass,
                hash_base64: BASE64.encode(&reply.hash),
                time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                memory_kib: 0,
            };

            debug!(
                case = index,
                pass,
                elapsed_ms = elapsed.as_millis(),
                soft_exceeded,
                "case finished"
            );
        }

        Ok(if any_soft_exceeded {
            StatusCode::FailTimeout
        } else {
            StatusCode::Completed
        })
    }

    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, GradingError> {
        self.fetcher
            .get(uri)
            .await
            .map_err(|error| GradingError::new(StatusCode::SystemFailFetchFile, error))
    }
}

impl std::fmt::Debug for GradingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingService")
            .field("languages", &self.templates.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

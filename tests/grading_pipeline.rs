//! Integration tests for the grading pipeline over the sandbox pool.
//!
//! These tests drive `GradingService` end to end against an in-memory
//! container engine and scripted sandbox clients, covering the verdict
//! taxonomy: happy path, missing template, compile failure, soft and hard
//! timeouts, infrastructure faults, and teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use gradecore::rpc::{CompileReply, RpcError, SandboxClient, SandboxConnector, TestReply};
use gradecore::runner::{
    ContainerEngine, ContainerStartRequest, ContainerTemplate, RunnerError, RunnerPool,
    StartedContainer, container_name,
};
use gradecore::{Fetcher, GradingService, Request, Settings, StatusCode, TestCase};
use sha2::{Digest, Sha256};

// ==================== Harness ====================

/// Engine that tracks started and stopped containers in memory.
#[derive(Default)]
struct FakeEngine {
    started: Mutex<Vec<ContainerStartRequest>>,
    stopped: Mutex<Vec<String>>,
    fail_start: bool,
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn start(
        &self,
        request: &ContainerStartRequest,
    ) -> Result<StartedContainer, RunnerError> {
        if self.fail_start {
            return Err(RunnerError::engine("create", "engine offline"));
        }
        self.started.lock().unwrap().push(request.clone());
        Ok(StartedContainer {
            container_id: format!("cid-{}", container_name(request.slot)),
        })
    }

    async fn stop(&self, container_id: &str) {
        self.stopped.lock().unwrap().push(container_id.to_string());
    }

    async fn cleanup_stray(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}

/// What the scripted sandbox worker does on each call.
#[derive(Clone)]
struct Script {
    ping_ok: bool,
    compile: CompileScript,
    test: TestScript,
}

#[derive(Clone)]
enum CompileScript {
    Succeed(&'static str),
    Fail(&'static str),
    Hang,
}

#[derive(Clone)]
enum TestScript {
    Reply { hash: Vec<u8>, delay: Duration },
    Hang,
    Broken,
}

impl Script {
    fn ok_with_hash(hash: Vec<u8>) -> Self {
        Self {
            ping_ok: true,
            compile: CompileScript::Succeed(""),
            test: TestScript::Reply {
                hash,
                delay: Duration::ZERO,
            },
        }
    }
}

struct ScriptedClient {
    script: Script,
    test_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SandboxClient for ScriptedClient {
    async fn ping(&self) -> gradecore::rpc::Result<()> {
        if self.script.ping_ok {
            Ok(())
        } else {
            Err(RpcError::Status(tonic::Status::unavailable("booting")))
        }
    }

    async fn compile(&self, _source: &[u8]) -> gradecore::rpc::Result<CompileReply> {
        match &self.script.compile {
            CompileScript::Succeed(output) => Ok(CompileReply {
                output: output.as_bytes().to_vec(),
                success: true,
            }),
            CompileScript::Fail(output) => Ok(CompileReply {
                output: output.as_bytes().to_vec(),
                success: false,
            }),
            CompileScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RpcError::Status(tonic::Status::deadline_exceeded("hung")))
            }
        }
    }

    async fn test(&self, _input: &[u8], _hash_only: bool) -> gradecore::rpc::Result<TestReply> {
        self.test_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script.test {
            TestScript::Reply { hash, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(TestReply {
                    hash: hash.clone(),
                    output: None,
                })
            }
            TestScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RpcError::Status(tonic::Status::deadline_exceeded("hung")))
            }
            TestScript::Broken => Err(RpcError::Status(tonic::Status::unavailable("worker gone"))),
        }
    }

    async fn shutdown(&self) -> gradecore::rpc::Result<()> {
        Ok(())
    }
}

struct ScriptedConnector {
    script: Script,
    test_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SandboxConnector for ScriptedConnector {
    async fn connect(&self, _port: u16) -> gradecore::rpc::Result<Box<dyn SandboxClient>> {
        Ok(Box::new(ScriptedClient {
            script: self.script.clone(),
            test_calls: Arc::clone(&self.test_calls),
        }))
    }
}

struct Harness {
    engine: Arc<FakeEngine>,
    pool: Arc<RunnerPool>,
    service: GradingService,
    test_calls: Arc<AtomicUsize>,
}

fn harness(script: Script) -> Harness {
    harness_with_engine(Arc::new(FakeEngine::default()), script)
}

fn harness_with_engine(engine: Arc<FakeEngine>, script: Script) -> Harness {
    let test_calls = Arc::new(AtomicUsize::new(0));
    let connector = Arc::new(ScriptedConnector {
        script,
        test_calls: Arc::clone(&test_calls),
    });
    let pool = Arc::new(RunnerPool::new(
        Arc::clone(&engine) as Arc<dyn ContainerEngine>,
        connector,
    ));

    let templates = HashMap::from([(
        "go".to_string(),
        ContainerTemplate {
            image: "rin_go".to_string(),
            port_internal: 8888,
        },
    )]);

    Harness {
        engine,
        pool: Arc::clone(&pool),
        service: GradingService::new(pool, Fetcher::new(), templates),
        test_calls,
    }
}

fn base64_uri(payload: &[u8]) -> String {
    format!("base64://{}", BASE64.encode(payload))
}

fn hello_request() -> Request {
    Request {
        language: "go".to_string(),
        source_url: base64_uri(b"package main\n\nfunc main() { println(\"Hello!\") }\n"),
        test_cases: vec![TestCase {
            input_url: "base64://IA==".to_string(),
            expected_output_url: "base64://SGVsbG8h".to_string(),
        }],
        settings: None,
        metadata: serde_json::Map::new(),
    }
}

fn hello_hash() -> Vec<u8> {
    // The worker hashes scrubbed output, so "Hello!" hashes as "Hello!\n".
    Sha256::digest(b"Hello!\n").to_vec()
}

// ==================== Verdicts ====================

#[tokio::test]
async fn test_happy_path_completes_with_matching_hash() {
    let harness = harness(Script::ok_with_hash(hello_hash()));

    let (response, error) = harness.service.grade(&hello_request()).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert_eq!(response.status, StatusCode::Completed);
    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].pass);
    assert_eq!(response.results[0].hash_base64, BASE64.encode(hello_hash()));
    assert_eq!(response.results[0].memory_kib, 0);
}

#[tokio::test]
async fn test_wrong_output_fails_case_but_completes() {
    let harness = harness(Script::ok_with_hash(
        Sha256::digest(b"Goodbye!\n").to_vec(),
    ));

    let (response, error) = harness.service.grade(&hello_request()).await;

    assert!(error.is_none());
    assert_eq!(response.status, StatusCode::Completed);
    assert!(!response.results[0].pass, "hash mismatch must fail the case");
}

#[tokio::test]
async fn test_missing_language_template_is_a_system_fault() {
    let harness = harness(Script::ok_with_hash(hello_hash()));
    let request = Request {
        language: "rust".to_string(),
        ..hello_request()
    };

    let (response, error) = harness.service.grade(&request).await;

    assert_eq!(response.status, StatusCode::SystemFailMissingImage);
    let error = error.expect("system faults must carry an error");
    assert_eq!(error.status(), StatusCode::SystemFailMissingImage);
    // Results stay aligned and zero-valued.
    assert_eq!(response.results.len(), 1);
    assert!(!response.results[0].pass);
    assert_eq!(response.results[0].time_ms, 0);
    // No sandbox may have been started.
    assert!(harness.engine.started.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_language_lookup_is_case_insensitive() {
    let harness = harness(Script::ok_with_hash(hello_hash()));
    let request = Request {
        language: "GO".to_string(),
        ..hello_request()
    };

    let (response, error) = harness.service.grade(&request).await;

    assert!(error.is_none());
    assert_eq!(response.status, StatusCode::Completed);
}

#[tokio::test]
async fn test_compile_failure_captures_output() {
    let harness = harness(Script {
        compile: CompileScript::Fail("main.go:3: syntax error near token"),
        ..Script::ok_with_hash(hello_hash())
    });

    let (response, error) = harness.service.grade(&hello_request()).await;

    assert!(error.is_none(), "a compile failure is a verdict, not an error");
    assert_eq!(response.status, StatusCode::FailCompilation);
    assert!(
        response.compile_output.contains("syntax error"),
        "compile output must be captured: {:?}",
        response.compile_output
    );
    assert_eq!(harness.test_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_compile_hang_times_out_as_compilation_timeout() {
    let harness = harness(Script {
        compile: CompileScript::Hang,
        ..Script::ok_with_hash(hello_hash())
    });

    let (response, error) = harness.service.grade(&hello_request()).await;

    assert!(error.is_none());
    assert_eq!(response.status, StatusCode::FailCompilationTimeout);
}

#[tokio::test(start_paused = true)]
async fn test_soft_timeout_fails_case_without_aborting() {
    let harness = harness(Script {
        test: TestScript::Reply {
            hash: hello_hash(),
            delay: Duration::from_millis(250),
        },
        ..Script::ok_with_hash(hello_hash())
    });
    let mut request = hello_request();
    request.settings = Some(Settings {
        time_limit_ms: Some(100),
        memory_limit_kib: None,
    });
    // Two cases: both must still execute.
    request.test_cases.push(request.test_cases[0].clone());

    let (response, error) = harness.service.grade(&request).await;

    assert!(error.is_none());
    assert_eq!(response.status, StatusCode::FailTimeout);
    assert_eq!(harness.test_calls.load(Ordering::SeqCst), 2);
    for result in &response.results {
        assert!(!result.pass, "soft-exceeded cases must fail");
        assert_eq!(result.time_ms, 250);
        assert_eq!(result.hash_base64, BASE64.encode(hello_hash()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_hard_timeout_aborts_remaining_cases() {
    let harness = harness(Script {
        test: TestScript::Hang,
        ..Script::ok_with_hash(hello_hash())
    });
    let mut request = hello_request();
    request.settings = Some(Settings {
        time_limit_ms: Some(100),
        memory_limit_kib: None,
    });
    request.test_cases.push(request.test_cases[0].clone());

    let (response, error) = harness.service.grade(&request).await;

    assert!(error.is_none(), "a hard timeout is a verdict, not an error");
    assert_eq!(response.status, StatusCode::FailTimeoutHard);
    assert_eq!(
        harness.test_calls.load(Ordering::SeqCst),
        1,
        "the pipeline must abort after the first hard timeout"
    );
    // The aborted case keeps its zero-valued entry.
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[1].time_ms, 0);
    assert!(response.results[1].hash_base64.is_empty());
}

#[tokio::test]
async fn test_broken_worker_is_a_system_fault() {
    let harness = harness(Script {
        test: TestScript::Broken,
        ..Script::ok_with_hash(hello_hash())
    });

    let (response, error) = harness.service.grade(&hello_request()).await;

    assert_eq!(response.status, StatusCode::SystemFail);
    assert!(error.is_some());
}

#[tokio::test]
async fn test_unfetchable_test_file_is_a_fetch_fault() {
    let harness = harness(Script::ok_with_hash(hello_hash()));
    let mut request = hello_request();
    request.test_cases[0].expected_output_url = "base64://not base64!!".to_string();

    let (response, error) = harness.service.grade(&request).await;

    assert_eq!(response.status, StatusCode::SystemFailFetchFile);
    assert!(error.is_some());
}

#[tokio::test]
async fn test_container_start_failure_is_a_container_fault() {
    let engine = Arc::new(FakeEngine {
        fail_start: true,
        ..FakeEngine::default()
    });
    let harness = harness_with_engine(engine, Script::ok_with_hash(hello_hash()));

    let (response, error) = harness.service.grade(&hello_request()).await;

    assert_eq!(response.status, StatusCode::SystemFailContainer);
    assert!(error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_silent_worker_is_a_ping_fault() {
    let harness = harness(Script {
        ping_ok: false,
        ..Script::ok_with_hash(hello_hash())
    });

    let (response, error) = harness.service.grade(&hello_request()).await;

    assert_eq!(response.status, StatusCode::SystemFailContainerPing);
    assert!(error.is_some());
}

// ==================== Response shape ====================

#[tokio::test]
async fn test_metadata_round_trips_verbatim() {
    let harness = harness(Script::ok_with_hash(hello_hash()));
    let mut request = hello_request();
    request.metadata = serde_json::from_str(
        r#"{ "submissionId": 9007199254740993, "tags": ["exam", "final"], "weight": 2.5 }"#,
    )
    .unwrap();

    let (response, _) = harness.service.grade(&request).await;

    assert_eq!(response.metadata, request.metadata);
}

#[tokio::test]
async fn test_results_align_with_test_cases() {
    let harness = harness(Script::ok_with_hash(hello_hash()));
    let mut request = hello_request();
    request.test_cases = vec![request.test_cases[0].clone(); 4];

    let (response, _) = harness.service.grade(&request).await;

    assert_eq!(response.status, StatusCode::Completed);
    assert_eq!(response.results.len(), 4);
    assert!(response.results.iter().all(|r| r.pass));
}

// ==================== Teardown ====================

#[tokio::test]
async fn test_sandbox_is_destroyed_after_grading() {
    let harness = harness(Script::ok_with_hash(hello_hash()));

    let (_, error) = harness.service.grade(&hello_request()).await;
    assert!(error.is_none());

    // The lease is dropped; the next reaper tick destroys the sandbox.
    harness.pool.tick().await;
    assert_eq!(harness.pool.count_running(), 0);
    assert_eq!(harness.engine.stopped.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sandbox_is_destroyed_after_a_system_fault() {
    let harness = harness(Script {
        test: TestScript::Broken,
        ..Script::ok_with_hash(hello_hash())
    });

    let (_, error) = harness.service.grade(&hello_request()).await;
    assert!(error.is_some());

    harness.pool.tick().await;
    assert_eq!(harness.pool.count_running(), 0);
    assert_eq!(harness.engine.stopped.lock().unwrap().len(), 1);
}

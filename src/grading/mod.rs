//! Grading pipeline: job and verdict types, status taxonomy, and the
//! per-job state machine.
//!
//! # Overview
//!
//! - [`Request`] / [`Response`] - queue wire types (JSON, camelCase)
//! - [`StatusCode`] - enumerated verdicts: success, submission faults,
//!   system faults
//! - [`GradingError`] - a failure carrying its verdict code and cause
//! - [`GradingService`] - acquire → fetch → compile → loop(test) → verdict

mod service;
mod status;
mod types;

pub use service::{
    DEFAULT_TIME_LIMIT_MS, GradingService, HARD_LIMIT_CAP_MS, HARD_LIMIT_MARGIN_MS,
    SYSTEM_DEADLINE_MS, TemplateMap,
};
pub use status::{GradingError, StatusCode};
pub use types::{CaseResult, Request, Response, Settings, TestCase};

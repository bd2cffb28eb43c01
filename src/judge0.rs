//! The Judge0-compatible wire shapes returned to clients.

use std::time::Duration;

use serde::Serialize;

use crate::KOTLIN_LANGUAGE_ID;
use crate::broker::{NormalizedResult, Status};
use crate::config::LocalConfig;

pub const STATUS_ACCEPTED: u8 = 3;
pub const STATUS_RUNTIME_ERROR: u8 = 5;
pub const STATUS_COMPILATION_ERROR: u8 = 6;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SubmissionStatus {
    pub id: u8,
    pub description: &'static str,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SubmissionResponse {
    pub token: String,
    pub status: SubmissionStatus,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    pub time: f64,
    pub memory: Option<u64>,
    pub created_at: String,
    pub finished_at: String,
}

/// Judge0 status id for a result
pub fn status_id(result: &NormalizedResult) -> u8 {
    if result.success {
        STATUS_ACCEPTED
    } else if result.status == Status::CompilationError {
        STATUS_COMPILATION_ERROR
    } else {
        STATUS_RUNTIME_ERROR
    }
}

impl SubmissionResponse {
    /// Maps `result` into the external contract
    ///
    /// `wall_time` stands in for `time` when the provider did not measure it.
    pub fn from_result(
        result: NormalizedResult,
        token: String,
        wall_time: Duration,
        created_at: String,
        finished_at: String,
    ) -> Self {
        Self {
            token,
            status: SubmissionStatus {
                id: status_id(&result),
                description: result.status.description(),
            },
            time: result
                .elapsed_seconds
                .unwrap_or_else(|| wall_time.as_secs_f64()),
            memory: result.memory,
            stdout: result.output,
            stderr: result.error.clone(),
            compile_output: result.error,
            created_at,
            finished_at,
        }
    }
}

/// Entry of `GET /languages`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LanguageDescriptor {
    pub id: u32,
    pub name: &'static str,
    pub is_archived: bool,
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_cmd: Option<String>,
}

impl LanguageDescriptor {
    /// Describes Kotlin, with the toolchain commands when running locally
    pub fn kotlin(local: Option<&LocalConfig>) -> Self {
        Self {
            id: KOTLIN_LANGUAGE_ID,
            name: "Kotlin",
            is_archived: false,
            source_file: local.map_or_else(|| "Main.kt".to_string(), |l| l.source_file.clone()),
            compile_cmd: local.map(|l| l.compile_command.join(" ")),
            run_cmd: local.map(|l| l.run_command.join(" ")),
        }
    }
}

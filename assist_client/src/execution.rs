//! Code execution over a Judge0-style submission API.

use serde::Deserialize;
use serde::Serialize;

use crate::AsAssistRequest;
use crate::Endpoint;
use crate::Json;

/// Payload of `POST /submissions?wait=true`
///
/// `wait=true` makes the provider block until the sandbox run finishes, which
/// matches the synchronous behaviour the editor expects.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub language_id: i32,
    pub source_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionResponse {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub status: ExecutionStatus,
    pub time: Option<String>,
    pub memory: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStatus {
    pub id: i32,
    pub description: String,
}

impl AsAssistRequest<Json<ExecutionResponse>> for ExecutionRequest {
    const URL_PATH: &'static str = "submissions?wait=true";
    const ENDPOINT: Endpoint = Endpoint::Execution;
}

//! AI-assisted editing helpers.
//!
//! Completion and explanation template a prompt, forward it to the inference
//! provider and fall back to a local heuristic when the provider fails. Code
//! execution is proxied to the execution provider and has no local fallback.

use axum::Extension;
use axum::extract::Json;
use axum::extract::State;
use serde::Deserialize;
use serde::Serialize;
use std::sync::LazyLock;
use thiserror::Error;
use utoipa::ToSchema;

use assist_client::AsAssistRequest as _;
use assist_client::completion::CompletionRequest;
use assist_client::execution::ExecutionRequest;
use atelier_derive::AtelierError;
use regex::Regex;

use super::AppState;
use super::AuthenticationExt;
use super::AuthorizationError;
use crate::error::Result;
use crate::models::Role;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "assist")]
pub enum AssistError {
    #[error("Unsupported language '{language}'")]
    #[atelier_error(status = 400)]
    UnsupportedLanguage { language: String },
}

/// Where an assist answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub(in crate::views) enum AnswerSource {
    /// The configured inference API answered
    Provider,
    /// The provider failed, a local heuristic answered instead
    Fallback,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct CompletionForm {
    #[schema(max_length = 64)]
    pub language: String,
    pub source: String,
    /// Byte offset of the cursor, defaults to the end of the source
    pub cursor: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct CompletionAnswer {
    pub completion: String,
    pub source: AnswerSource,
}

/// Suggest a completion at the cursor
#[utoipa::path(
    post, path = "/assist/complete",
    tag = "assist",
    request_body = CompletionForm,
    responses(
        (status = 200, body = CompletionAnswer, description = "A completion suggestion"),
    )
)]
pub(in crate::views) async fn complete(
    State(app_state): State<AppState>,
    Extension(auth): AuthenticationExt,
    Json(form): Json<CompletionForm>,
) -> Result<Json<CompletionAnswer>> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }

    let mut cursor = form.cursor.unwrap_or(form.source.len()).min(form.source.len());
    // the frontend counts bytes, make sure we slice on a char boundary
    while !form.source.is_char_boundary(cursor) {
        cursor -= 1;
    }
    let prefix = &form.source[..cursor];
    let request = CompletionRequest {
        model: app_state.config.provider.inference_model.clone(),
        prompt: completion_prompt(&form.language, prefix),
        max_tokens: 256,
        temperature: 0.2,
        stop: vec!["```".to_owned()],
    };
    let answer = match request.fetch(&app_state.assist_client).await {
        Ok(response) => CompletionAnswer {
            completion: response.first_text().unwrap_or_default().to_owned(),
            source: AnswerSource::Provider,
        },
        Err(e) => {
            tracing::warn!(error = %e, "completion provider failed, answering locally");
            CompletionAnswer {
                completion: fallback_completion(prefix),
                source: AnswerSource::Fallback,
            }
        }
    };
    Ok(Json(answer))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct ExplanationForm {
    #[schema(max_length = 64)]
    pub language: String,
    pub source: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct ExplanationAnswer {
    pub explanation: String,
    pub source: AnswerSource,
}

/// Explain a piece of code
#[utoipa::path(
    post, path = "/assist/explain",
    tag = "assist",
    request_body = ExplanationForm,
    responses(
        (status = 200, body = ExplanationAnswer, description = "A prose explanation"),
    )
)]
pub(in crate::views) async fn explain(
    State(app_state): State<AppState>,
    Extension(auth): AuthenticationExt,
    Json(form): Json<ExplanationForm>,
) -> Result<Json<ExplanationAnswer>> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }

    let request = CompletionRequest {
        model: app_state.config.provider.inference_model.clone(),
        prompt: explanation_prompt(&form.language, &form.source),
        max_tokens: 512,
        temperature: 0.4,
        stop: vec![],
    };
    let answer = match request.fetch(&app_state.assist_client).await {
        Ok(response) => ExplanationAnswer {
            explanation: response.first_text().unwrap_or_default().trim().to_owned(),
            source: AnswerSource::Provider,
        },
        Err(e) => {
            tracing::warn!(error = %e, "explanation provider failed, answering locally");
            ExplanationAnswer {
                explanation: fallback_explanation(&form.language, &form.source),
                source: AnswerSource::Fallback,
            }
        }
    };
    Ok(Json(answer))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct ExecutionForm {
    #[schema(max_length = 64)]
    pub language: String,
    pub source: String,
    pub stdin: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct ExecutionOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub status: String,
    pub time: Option<String>,
    pub memory: Option<i64>,
}

/// Run a piece of code in the execution sandbox
///
/// Unlike the other helpers there is no local fallback: a provider failure
/// surfaces as 502.
#[utoipa::path(
    post, path = "/assist/execute",
    tag = "assist",
    request_body = ExecutionForm,
    responses(
        (status = 200, body = ExecutionOutput, description = "The sandbox run outcome"),
        (status = 400, description = "Unsupported language"),
        (status = 502, description = "The execution provider failed"),
    )
)]
pub(in crate::views) async fn execute(
    State(app_state): State<AppState>,
    Extension(auth): AuthenticationExt,
    Json(form): Json<ExecutionForm>,
) -> Result<Json<ExecutionOutput>> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }

    let request = ExecutionRequest {
        language_id: execution_language_id(&form.language)?,
        source_code: form.source,
        stdin: form.stdin,
    };
    let response = request.fetch(&app_state.assist_client).await?;
    Ok(Json(ExecutionOutput {
        stdout: response.stdout,
        stderr: response.stderr,
        compile_output: response.compile_output,
        status: response.status.description,
        time: response.time,
        memory: response.memory,
    }))
}

/// Judge0 language ids for the languages the editor ships highlighters for
fn execution_language_id(language: &str) -> Result<i32, AssistError> {
    let id = match language.to_ascii_lowercase().as_str() {
        "c" => 50,
        "c++" | "cpp" => 54,
        "go" => 60,
        "java" => 62,
        "javascript" | "js" => 63,
        "python" | "python3" => 71,
        "rust" => 73,
        "typescript" | "ts" => 74,
        _ => {
            return Err(AssistError::UnsupportedLanguage {
                language: language.to_owned(),
            });
        }
    };
    Ok(id)
}

fn completion_prompt(language: &str, prefix: &str) -> String {
    format!(
        "You are a code completion engine. \
         Continue the following {language} code. \
         Answer with code only, no prose, no markdown fence.\n\n{prefix}"
    )
}

fn explanation_prompt(language: &str, source: &str) -> String {
    format!(
        "Explain what the following {language} code does, \
         in a short paragraph aimed at a fellow developer.\n\n```{language}\n{source}\n```"
    )
}

/// Closes whatever brackets are still open before the cursor
///
/// The poor man's completion: scan the prefix, keep a stack of unclosed
/// delimiters, emit the closing sequence. Empty when everything is balanced.
fn fallback_completion(prefix: &str) -> String {
    let mut stack = Vec::new();
    for c in prefix.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack
        .into_iter()
        .rev()
        .map(|c| match c {
            '(' => ')',
            '[' => ']',
            _ => '}',
        })
        .collect()
}

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub\s+)?(?:async\s+)?(?:fn|def|function)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap()
});
static LOOP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(for|while|loop)\b").unwrap());
static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(use|import|from|#include|require)\b").unwrap());
static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(if|match|switch|case)\b").unwrap());

/// Canned explanation assembled from regex feature detection
fn fallback_explanation(language: &str, source: &str) -> String {
    let mut sentences = Vec::new();

    let functions = FUNCTION_RE
        .captures_iter(source)
        .map(|captures| format!("`{}`", &captures[1]))
        .collect::<Vec<_>>();
    match functions.len() {
        0 => sentences.push(format!("This {language} snippet runs top-level code")),
        1 => sentences.push(format!(
            "This {language} snippet defines the function {}",
            functions[0]
        )),
        _ => sentences.push(format!(
            "This {language} snippet defines the functions {}",
            functions.join(", ")
        )),
    }
    if IMPORT_RE.is_match(source) {
        sentences.push("it pulls in external modules".to_owned());
    }
    if LOOP_RE.is_match(source) {
        sentences.push("it iterates with loops".to_owned());
    }
    if BRANCH_RE.is_match(source) {
        sentences.push("it branches on conditions".to_owned());
    }
    format!("{}.", sentences.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use assist_client::mocking::MockingClient;
    use crate::views::test_app::TestAppBuilder;
    use crate::views::test_app::TestRequestExt;
    use crate::views::test_app::test_app;

    #[test]
    fn bracket_fallback() {
        assert_eq!(fallback_completion("fn main() {"), "}");
        assert_eq!(fallback_completion("a[b.get(c"), ")]");
        assert_eq!(fallback_completion("balanced()"), "");
    }

    #[test]
    fn explanation_fallback_mentions_functions() {
        let explanation = fallback_explanation(
            "rust",
            "use std::fmt;\nfn render() {\n  for x in 0..3 {}\n}\n",
        );
        assert!(explanation.contains("`render`"));
        assert!(explanation.contains("external modules"));
        assert!(explanation.contains("loops"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn completion_uses_the_provider_when_it_answers() {
        let mut provider = MockingClient::new();
        provider
            .stub("v1/completions")
            .response(StatusCode::OK)
            .json(json!({ "choices": [{ "text": "    println!(\"hi\");\n}" }] }))
            .finish();
        let app = test_app!().assist_client(provider.into()).build();
        let alice = app.user("alice").create().await;

        let request = app.post("/assist/complete").by_user(&alice).json(&json!({
            "language": "rust",
            "source": "fn main() {\n",
        }));
        let answer: CompletionAnswer = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(answer.source, AnswerSource::Provider);
        assert!(answer.completion.contains("println!"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn completion_falls_back_when_the_provider_fails() {
        let mut provider = MockingClient::new();
        provider
            .stub("v1/completions")
            .response(StatusCode::INTERNAL_SERVER_ERROR)
            .body(r#"{"error":{"message":"quota exceeded"}}"#)
            .finish();
        let app = test_app!().assist_client(provider.into()).build();
        let alice = app.user("alice").create().await;

        let request = app.post("/assist/complete").by_user(&alice).json(&json!({
            "language": "rust",
            "source": "fn main() {",
        }));
        let answer: CompletionAnswer = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(answer.source, AnswerSource::Fallback);
        assert_eq!(answer.completion, "}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn execution_proxies_the_sandbox_result() {
        let mut provider = MockingClient::new();
        provider
            .stub("submissions?wait=true")
            .response(StatusCode::OK)
            .json(json!({
                "stdout": "hi\n",
                "stderr": null,
                "compile_output": null,
                "status": { "id": 3, "description": "Accepted" },
                "time": "0.002",
                "memory": 1024,
            }))
            .finish();
        let app = test_app!().assist_client(provider.into()).build();
        let alice = app.user("alice").create().await;

        let request = app.post("/assist/execute").by_user(&alice).json(&json!({
            "language": "python",
            "source": "print('hi')",
        }));
        let output: ExecutionOutput = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(output.stdout.as_deref(), Some("hi\n"));
        assert_eq!(output.status, "Accepted");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn execution_provider_failures_are_a_502() {
        let mut provider = MockingClient::new();
        provider
            .stub("submissions?wait=true")
            .response(StatusCode::SERVICE_UNAVAILABLE)
            .body(r#"{"error":"queue full"}"#)
            .finish();
        let app = test_app!().assist_client(provider.into()).build();
        let alice = app.user("alice").create().await;

        let request = app.post("/assist/execute").by_user(&alice).json(&json!({
            "language": "python",
            "source": "print('hi')",
        }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn unknown_execution_language_is_a_400() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;

        let request = app.post("/assist/execute").by_user(&alice).json(&json!({
            "language": "cobol",
            "source": "DISPLAY 'HI'",
        }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

//! Text completion over an OpenAI-compatible inference API.

use serde::Deserialize;
use serde::Serialize;

use crate::AsAssistRequest;
use crate::Endpoint;
use crate::Json;

/// Payload of `POST /v1/completions`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
}

impl CompletionResponse {
    /// The text of the first choice, if the provider returned any
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.text.as_str())
    }
}

impl AsAssistRequest<Json<CompletionResponse>> for CompletionRequest {
    const URL_PATH: &'static str = "v1/completions";
    const ENDPOINT: Endpoint = Endpoint::Inference;
}

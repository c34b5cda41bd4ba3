//! HTTP client for the third-party helpers of the editor: code completion and
//! explanation are forwarded to an inference API, code execution to a
//! Judge0-style submission API.
//!
//! The client performs a single attempt per call: there is deliberately no
//! retry policy and no circuit breaker. Callers decide what a failed call
//! means (local fallback for completions, an error for executions).

pub mod completion;
pub mod execution;

#[cfg(feature = "mocking_client")]
pub mod mocking;

use std::marker::PhantomData;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::trace;
use url::Url;

/// Which of the two configured provider endpoints a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Inference,
    Execution,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub inference_url: Url,
    pub inference_api_key: Option<String>,
    pub execution_url: Url,
    pub execution_api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum AssistClient {
    Http(HttpClient),
    #[cfg(feature = "mocking_client")]
    Mocked(mocking::MockingClient),
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    options: Options,
}

impl AssistClient {
    pub fn new_http(options: Options) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(Error::Unreachable)?;
        Ok(Self::Http(HttpClient { client, options }))
    }

    /// Checks that the inference endpoint answers HTTP at all
    ///
    /// Any response, including an error status, counts as reachable.
    #[tracing::instrument(name = "ping_assist_provider", skip_all)]
    pub async fn ping(&self) -> Result<bool, Error> {
        match self {
            AssistClient::Http(HttpClient { client, options }) => {
                client
                    .get(options.inference_url.clone())
                    .send()
                    .await
                    .map_err(Error::Unreachable)?;
                Ok(true)
            }
            #[cfg(feature = "mocking_client")]
            AssistClient::Mocked(_) => Ok(true),
        }
    }

    #[tracing::instrument(
        target = "atelier::assist_client",
        name = "assist:fetch",
        skip(self, body),
        err
    )]
    async fn fetch<B: Serialize, R: AssistResponse>(
        &self,
        path: &str,
        endpoint: Endpoint,
        body: Option<&B>,
    ) -> Result<R::Response, Error> {
        trace!(
            target: "atelier::assist_client",
            body = body.and_then(|b| serde_json::to_string_pretty(b).ok()).unwrap_or_default(),
            "Request content");
        match self {
            AssistClient::Http(client) => client.fetch::<B, R>(path, endpoint, body).await,
            #[cfg(feature = "mocking_client")]
            AssistClient::Mocked(client) => match client.fetch_mocked::<_, B, R>(path, body) {
                Ok(Some(response)) => Ok(response),
                Ok(None) => Err(Error::NoResponseContent),
                Err(mocking::MockingError { bytes, url }) => Err(Error::parse(&bytes, url)),
            },
        }
    }
}

impl HttpClient {
    async fn fetch<B: Serialize, R: AssistResponse>(
        &self,
        path: &str,
        endpoint: Endpoint,
        body: Option<&B>,
    ) -> Result<R::Response, Error> {
        let (base, api_key) = match endpoint {
            Endpoint::Inference => (
                &self.options.inference_url,
                self.options.inference_api_key.as_deref(),
            ),
            Endpoint::Execution => (
                &self.options.execution_url,
                self.options.execution_api_key.as_deref(),
            ),
        };
        let url = base.join(path).map_err(|e| Error::ResponseFormatError {
            msg: format!("invalid provider url: {e}"),
        })?;

        let mut request = self.client.post(url);
        if let Some(api_key) = api_key {
            request = request.bearer_auth(api_key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(Error::Unreachable)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(Error::Unreachable)?;
        if status.is_success() {
            R::from_bytes(&bytes)
        } else {
            Err(Error::parse(&bytes, path.to_string()))
        }
    }
}

/// A struct implementing this trait represents a provider request payload
///
/// The payload serializes to the provider's wire format and declares which
/// endpoint and path it is POSTed to.
pub trait AsAssistRequest<R>
where
    Self: Serialize + Sized + Sync,
    R: AssistResponse,
{
    const URL_PATH: &'static str;
    const ENDPOINT: Endpoint;

    /// Returns the URL path for this request, by default [Self::URL_PATH]
    fn url(&self) -> &str {
        Self::URL_PATH
    }

    /// Sends this request using the given [AssistClient] and returns the
    /// response content on success
    async fn fetch(&self, assist: &AssistClient) -> Result<R::Response, Error> {
        assist
            .fetch::<Self, R>(self.url(), Self::ENDPOINT, Some(self))
            .await
    }
}

/// A trait meant to encapsulate the behaviour of response deserializing
pub trait AssistResponse {
    /// The type of the deserialized response
    type Response;

    /// Reads the content of `bytes` and produces the response object
    fn from_bytes(bytes: &[u8]) -> Result<Self::Response, Error>;
}

/// Indicates that the response that deserializes to `T` is expected to have a Json body
pub struct Json<T>(PhantomData<T>);

impl<T: DeserializeOwned> AssistResponse for Json<T> {
    type Response = T;

    fn from_bytes(bytes: &[u8]) -> Result<Self::Response, Error> {
        serde_json::from_slice(bytes).map_err(|err| Error::ResponseFormatError {
            msg: err.to_string(),
        })
    }
}

impl AssistResponse for () {
    type Response = ();

    fn from_bytes(_: &[u8]) -> Result<Self::Response, Error> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot parse provider response: {msg}")]
    ResponseFormatError { msg: String },

    #[error("provider rejected the request at '{url}': {message}")]
    ProviderError { url: String, message: String },

    #[error("provider unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[cfg(feature = "mocking_client")]
    #[error(
        "The mocked response had no body configured - check out StubResponseBuilder::body if this is unexpected"
    )]
    NoResponseContent,
}

impl Error {
    /// Extracts a human-readable message from a provider error body
    ///
    /// Providers disagree on the error shape: OpenAI-compatible APIs nest it
    /// under `error.message`, Judge0 flavors use a flat `error` or `message`
    /// field. Anything else is forwarded raw.
    fn parse(bytes: &[u8], url: String) -> Error {
        let message = serde_json::from_slice::<serde_json::Value>(bytes)
            .ok()
            .and_then(|value| {
                value
                    .pointer("/error/message")
                    .or_else(|| value.get("error"))
                    .or_else(|| value.get("message"))
                    .and_then(|v| v.as_str().map(ToOwned::to_owned))
            })
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned());
        Error::ProviderError { url, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_shaped_errors_are_unwrapped() {
        let error = Error::parse(
            br#"{"error":{"message":"quota exceeded","type":"billing"}}"#,
            "v1/completions".to_owned(),
        );
        let Error::ProviderError { message, url } = error else {
            panic!("expected a provider error");
        };
        assert_eq!(message, "quota exceeded");
        assert_eq!(url, "v1/completions");
    }

    #[test]
    fn flat_errors_are_unwrapped() {
        let error = Error::parse(br#"{"error":"queue full"}"#, "submissions".to_owned());
        let Error::ProviderError { message, .. } = error else {
            panic!("expected a provider error");
        };
        assert_eq!(message, "queue full");
    }

    #[test]
    fn unrecognized_bodies_are_forwarded_raw() {
        let error = Error::parse(b"upstream exploded", "submissions".to_owned());
        let Error::ProviderError { message, .. } = error else {
            panic!("expected a provider error");
        };
        assert_eq!(message, "upstream exploded");
    }
}

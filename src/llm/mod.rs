//! Completion client for an Ollama-style `/api/generate` endpoint.
//!
//! One request per compile: the description is wrapped in the prompt
//! template, posted with streaming disabled, and the `response` field of the
//! reply is run through the extractor.

pub mod extract;
pub mod prompt;
#[cfg(test)]
pub(crate) mod testing;

use crate::config::Configuration;
use crate::error::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Low temperature keeps the output close to deterministic.
const TEMPERATURE: f64 = 0.1;

/// Client for the configured inference endpoint.
pub struct CompletionClient {
    model: String,
    endpoint: String,
    api_key: Option<String>,
    max_output: Option<usize>,
    client: Client,
}

impl CompletionClient {
    /// Create a client from configuration. No request timeout is set.
    pub fn new(config: &Configuration) -> Result<Self> {
        let builder = Client::builder();
        // Tests talk to an in-process listener and must not go through a proxy.
        #[cfg(test)]
        let builder = builder.no_proxy();
        let client = builder.build().map_err(Error::HttpClient)?;

        Ok(Self {
            model: config.model().to_string(),
            endpoint: config.endpoint().to_string(),
            api_key: config.api_key().map(str::to_string),
            max_output: None,
            client,
        })
    }

    /// Cap extracted output at `max_bytes`. `None` leaves it unbounded.
    pub fn with_max_output(mut self, max_bytes: Option<usize>) -> Self {
        self.max_output = max_bytes;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Translate `description` into code in `target_language`.
    pub async fn compile(&self, description: &str, target_language: &str) -> Result<String> {
        if description.is_empty() {
            return Err(Error::InvalidInput("description must not be empty".to_string()));
        }
        if target_language.is_empty() {
            return Err(Error::InvalidInput("target language must not be empty".to_string()));
        }

        debug!("Using model: {}", self.model);
        debug!("Using endpoint: {}", self.endpoint);

        let request = CompletionRequest {
            model: &self.model,
            prompt: prompt::build_prompt(target_language, description),
            temperature: TEMPERATURE,
            stream: false,
        };
        if let Ok(payload) = serde_json::to_string(&request) {
            debug!("Request payload: {}", payload);
        }

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.network(e))?;
        let status = response.status();
        let raw = response.text().await.map_err(|e| self.network(e))?;
        debug!("Received response ({}): {}", status, raw);

        let content = parse_envelope(&raw)?;
        let extraction = extract::classify(&content);
        debug!("Extracted code using {:?} strategy", extraction.strategy);
        let code = &content[extraction.range];
        let code = match self.max_output {
            Some(limit) => extract::truncate(code, limit),
            None => code,
        };
        debug!("Successfully parsed response");
        Ok(code.to_string())
    }

    fn network(&self, source: reqwest::Error) -> Error {
        Error::Network {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    temperature: f64,
    stream: bool,
}

/// Unwrap the generate envelope: `response` wins, then `error`.
///
/// The HTTP status is not consulted: Ollama puts its error
/// message in the body of 4xx replies.
fn parse_envelope(raw: &str) -> Result<String> {
    let value: Value = serde_json::from_str(raw).map_err(Error::MalformedResponse)?;

    if let Some(response) = value.get("response") {
        // Only text can be code; `null` or a number is not a usable answer.
        return match response {
            Value::String(s) => Ok(s.clone()),
            _ => Err(Error::UnexpectedFormat),
        };
    }
    if let Some(error) = value.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(Error::Remote(message));
    }
    Err(Error::UnexpectedFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{config_for, request_json, serve_once};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_envelope_response() {
        let content = parse_envelope(r#"{"model":"llama3","response":"x = 1","done":true}"#).unwrap();
        assert_eq!(content, "x = 1");
    }

    #[test]
    fn test_parse_envelope_prefers_response_over_error() {
        let content = parse_envelope(r#"{"error":"ignored","response":"ok"}"#).unwrap();
        assert_eq!(content, "ok");
    }

    #[test]
    fn test_parse_envelope_error() {
        let err = parse_envelope(r#"{"error": "model not found"}"#).unwrap_err();
        assert!(matches!(&err, Error::Remote(m) if m == "model not found"));
        assert!(err.is_model_not_found());
    }

    #[test]
    fn test_parse_envelope_malformed() {
        let err = parse_envelope("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_envelope_unexpected() {
        assert!(matches!(parse_envelope(r#"{"done":true}"#), Err(Error::UnexpectedFormat)));
        assert!(matches!(parse_envelope("[1, 2]"), Err(Error::UnexpectedFormat)));
    }

    #[test]
    fn test_parse_envelope_non_string_response() {
        assert!(matches!(parse_envelope(r#"{"response":null}"#), Err(Error::UnexpectedFormat)));
        assert!(matches!(parse_envelope(r#"{"response":42}"#), Err(Error::UnexpectedFormat)));
    }

    #[test]
    fn test_parse_envelope_non_string_error() {
        let err = parse_envelope(r#"{"error":{"code":500}}"#).unwrap_err();
        assert!(matches!(&err, Error::Remote(m) if m == r#"{"code":500}"#));
    }

    #[tokio::test]
    async fn test_compile_success_extracts_code() {
        let (endpoint, request) = serve_once(
            "200 OK",
            r#"{"model":"codellama","response":"```python\nprint(1)\n```","done":true}"#,
        )
        .await;
        let client = CompletionClient::new(&config_for(&endpoint)).unwrap();

        let code = client.compile("print the number one", "python").await.unwrap();
        assert_eq!(code, "print(1)\n");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/generate "));
        assert!(request.to_lowercase().contains("content-type: application/json"));
        assert!(!request.to_lowercase().contains("authorization:"));

        let json = request_json(&request);
        assert_eq!(json["model"], "codellama");
        assert_eq!(json["temperature"], 0.1);
        assert_eq!(json["stream"], false);
        let prompt = json["prompt"].as_str().unwrap();
        assert!(prompt.contains("print the number one"));
        assert!(prompt.contains("python code"));
    }

    #[tokio::test]
    async fn test_compile_sends_bearer_when_key_set() {
        let (endpoint, request) = serve_once("200 OK", r#"{"response":"1"}"#).await;
        let config = Configuration::parse(&format!("api_key=secret\nendpoint={}\n", endpoint));
        let client = CompletionClient::new(&config).unwrap();

        client.compile("one", "python").await.unwrap();
        let request = request.await.unwrap();
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_compile_remote_error_on_404() {
        let (endpoint, _request) = serve_once(
            "404 Not Found",
            r#"{"error":"model \"codellama\" not found, try pulling it first"}"#,
        )
        .await;
        let client = CompletionClient::new(&config_for(&endpoint)).unwrap();

        let err = client.compile("anything", "c").await.unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert!(err.is_model_not_found());
    }

    #[tokio::test]
    async fn test_compile_malformed_body() {
        let (endpoint, _request) = serve_once("200 OK", "not json").await;
        let client = CompletionClient::new(&config_for(&endpoint)).unwrap();

        let err = client.compile("anything", "c").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_compile_truncates_when_capped() {
        let (endpoint, _request) = serve_once("200 OK", r#"{"response":"abcdefgh"}"#).await;
        let client = CompletionClient::new(&config_for(&endpoint))
            .unwrap()
            .with_max_output(Some(3));

        assert_eq!(client.compile("letters", "text").await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_compile_network_error() {
        // Bind then drop to get a port nobody is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = format!("http://{}/api/generate", addr);
        let client = CompletionClient::new(&config_for(&endpoint)).unwrap();

        let err = client.compile("anything", "c").await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert!(err.to_string().contains(&endpoint));
    }

    #[tokio::test]
    async fn test_compile_rejects_empty_input() {
        let client = CompletionClient::new(&Configuration::default()).unwrap();

        let err = client.compile("", "python").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = client.compile("do something", "").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_compile_passes_whitespace_description_through() {
        let (endpoint, request) = serve_once("200 OK", r#"{"response":"pass"}"#).await;
        let client = CompletionClient::new(&config_for(&endpoint)).unwrap();

        assert_eq!(client.compile("  \n", "python").await.unwrap(), "pass");
        let json = request_json(&request.await.unwrap());
        assert!(json["prompt"].as_str().unwrap().contains("\n\n  \n\n"));
    }

    #[test]
    fn test_client_exposes_model_and_endpoint() {
        let client = CompletionClient::new(&config_for("http://gpu-box:11434/api/generate")).unwrap();
        assert_eq!(client.model(), "codellama");
        assert_eq!(client.endpoint(), "http://gpu-box:11434/api/generate");
    }
}

//! Error taxonomy for configuration and code generation.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required argument was missing or empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The config directory or file could not be created or written.
    #[error("config error at {}: {message}", .path.display())]
    ConfigIo {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The HTTP client could not be constructed; no request was attempted.
    #[error("could not build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    /// The HTTP transport failed before a body was received.
    #[error("request to {endpoint} failed")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with something that is not JSON.
    #[error("could not parse JSON response")]
    MalformedResponse(#[source] serde_json::Error),

    /// The endpoint reported an error in its JSON envelope.
    #[error("error from endpoint: {0}")]
    Remote(String),

    /// Valid JSON carrying neither `response` nor `error`.
    #[error("unexpected response format from endpoint")]
    UnexpectedFormat,
}

impl Error {
    pub(crate) fn config_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ConfigIo {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn config_io_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::ConfigIo {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// True when the endpoint rejected the request because the model is not
    /// installed. Matches both `model not found` and Ollama's
    /// `model "llama9" not found, try pulling it first`.
    pub fn is_model_not_found(&self) -> bool {
        let Error::Remote(message) = self else {
            return false;
        };
        let message = message.to_lowercase();
        message.contains("model not found") || names_missing_model(&message)
    }
}

/// Looks for `model "<name>" not found` or `model '<name>' not found`.
fn names_missing_model(message: &str) -> bool {
    ['"', '\''].into_iter().any(|quote| {
        let opener = format!("model {}", quote);
        message.match_indices(opener.as_str()).any(|(at, _)| {
            let name_start = at + opener.len();
            message[name_start..].find(quote).is_some_and(|len| {
                message[name_start + len + quote.len_utf8()..].starts_with(" not found")
            })
        })
    })
}

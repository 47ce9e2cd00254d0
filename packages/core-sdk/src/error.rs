use std::path::PathBuf;

use thiserror::Error;

/**
 * \brief Errors raised by the configuration store, the chat client and the server state.
 */
#[derive(Debug, Error)]
pub enum RelayError {
    /** \brief Config or key file could not be read or written. */
    #[error("failed to access {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /** \brief Malformed JSON, either from a file or from an upstream response. */
    #[error("failed to decode {context}: {source}{}", body_suffix(.body))]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
        body: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("provider {0} has no available models")]
    NoModels(String),

    /** \brief Transport failure talking to the upstream endpoint. */
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /** \brief Upstream answered with a non-success status. */
    #[error("API returned status code {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("no choices returned in response")]
    EmptyResponse,
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(text) => format!("\nResponse body: {}", text),
        None => String::new(),
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;

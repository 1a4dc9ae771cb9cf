//! Error types for cluster operations.

use elasticsearch::http::transport::BuildError;
use thiserror::Error;

/// Errors returned by the connection holder, the backends and the query façade.
#[derive(Debug, Error)]
pub enum EsError {
    /// The seed host could not be resolved.
    #[error("Failed to resolve host {host}: {source}")]
    HostResolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cluster URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The node answered the handshake but belongs to another cluster.
    #[error("Connected to cluster '{actual}' but expected '{expected}'")]
    ClusterMismatch { expected: String, actual: String },

    #[error("Failed to build transport: {0}")]
    TransportBuild(#[from] BuildError),

    /// Error raised by the engine client itself, passed through unmodified.
    #[error("Transport error: {0}")]
    Transport(#[from] elasticsearch::Error),

    /// The engine answered with a non-success status.
    #[error("Engine returned status {status}: {body}")]
    Engine { status: u16, body: String },

    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Document {id} not found in index {index}")]
    DocumentNotFound { index: String, id: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Request shape the in-memory backend does not evaluate.
    #[error("Unsupported by this backend: {0}")]
    Unsupported(String),
}

impl EsError {
    /// Create an engine error from a status code and response body.
    pub fn engine(status: u16, body: impl Into<String>) -> Self {
        Self::Engine {
            status,
            body: body.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// HTTP-style status carried by the error, if the engine produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Engine { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EsError>;

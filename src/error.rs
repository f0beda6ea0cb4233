use thiserror::Error;

/// Failure to retrieve a URL. Never fatal: the caller records it and moves on.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl NetworkError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout { url: url.to_string() }
        } else if let Some(status) = err.status() {
            NetworkError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            NetworkError::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// A document that cannot be used. The caller skips the item.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed markup at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("document has no root element")]
    Empty,

    #[error("element <{0}> is never closed")]
    Unclosed(String),

    #[error("no known transcript layout in document")]
    UnrecognizedLayout,

    #[error("invalid JSON page: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reading or writing the output store failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize document for {0}: {1}")]
    Serialize(String, serde_json::Error),

    #[error("stored document {path} is unreadable: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("offloaded task for {0} did not complete")]
    Worker(String),
}

/// Everything that can go wrong inside a single meeting's pipeline.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Network(_) => "network",
            JobError::Parse(_) => "parse",
            JobError::Persistence(_) => "persistence",
            JobError::Panicked(_) => "panic",
        }
    }
}

/// Settings could not be loaded or are out of range.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

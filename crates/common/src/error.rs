//! Error taxonomy shared by the extractor and the scorers.

use thiserror::Error;

/// Fatal errors raised before any wallet is processed.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// The wallet list has no column with the configured name.
    #[error("input file {path} has no '{column}' column")]
    MissingColumn { path: String, column: String },

    /// The subgraph API key was not supplied.
    #[error("missing subgraph API key (set {env_var} or add it to .env)")]
    MissingCredential { env_var: String },

    /// Input files must be delimited text or a spreadsheet.
    #[error(
        "unsupported input file extension '{extension}' for {path} (expected csv, tsv, txt, xlsx or xls)"
    )]
    UnsupportedExtension { path: String, extension: String },

    /// A config value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The model artifact could not be read or parsed.
    #[error("invalid model artifact {path}: {reason}")]
    InvalidModel { path: String, reason: String },

    /// The model was trained on a different feature layout.
    #[error("model feature columns {found:?} do not match extracted columns {expected:?}")]
    ModelColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Per-wallet failure while querying the subgraph. Never fatal to a batch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("subgraph returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed subgraph response: {0}")]
    Malformed(String),

    /// The subgraph answered with an `errors` payload.
    #[error("subgraph error: {0}")]
    Upstream(String),
}

impl FetchError {
    /// Short label used for metric labels and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "http_status",
            Self::Malformed(_) => "malformed",
            Self::Upstream(_) => "upstream",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// The feature table does not have the shape scoring expects.
#[derive(Error, Debug)]
pub enum DataIntegrityError {
    #[error("feature table {source_name} is missing the '{column}' column")]
    MissingColumn { source_name: String, column: String },

    #[error("feature table {source_name} row {row}: {reason}")]
    BadRow {
        source_name: String,
        row: usize,
        reason: String,
    },
}

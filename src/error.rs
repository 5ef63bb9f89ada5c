use std::path::PathBuf;

/// Errors produced while ingesting, summarising, or charting a dataset.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("the file is empty")]
    EmptyFile,

    #[error("unsupported file extension: {0}")]
    UnsupportedFormat(String),

    #[error("file has no extension")]
    MissingExtension,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("column not found: {0}")]
    UnknownColumn(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid suggestion: {0}")]
    InvalidSuggestion(String),

    #[error("dashboard has no chart at index {0}")]
    NoSuchChart(usize),

    #[error("render error: {0}")]
    Render(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<bincode::Error> for AnalysisError {
    fn from(err: bincode::Error) -> Self {
        AnalysisError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::Serialization(err.to_string())
    }
}

//! Error types for the notice pipeline.

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Page load timed out after {timeout_ms}ms: {url}")]
    PageLoadTimeout { url: String, timeout_ms: u64 },

    #[error("Page load failed: {0}")]
    PageLoad(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

impl From<quick_xml::Error> for FeedError {
    fn from(e: quick_xml::Error) -> Self {
        FeedError::Xml(e.to_string())
    }
}

/// Why a single table row did not become a feed item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowProcessingError {
    #[error("row has {found} column(s), need at least 2")]
    MissingColumns { found: usize },

    #[error("row has neither date text nor body text")]
    EmptyRow,

    #[error("date not recognized: {0}")]
    DateParseFailed(#[from] DateParseError),
}

/// Date text that could not be turned into a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateParseError {
    #[error("unrecognized date text {0:?}")]
    Unrecognized(String),

    #[error("no such calendar date: {year}-{month}-{day}")]
    InvalidDate { year: i32, month: u32, day: u32 },
}

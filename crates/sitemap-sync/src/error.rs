use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("server-sent events unavailable: {0}")]
    EventsUnsupported(String),
    #[error("event stream failed: {0}")]
    EventStream(String),
    #[error("sync engine is no longer running")]
    EngineClosed,
}

impl SyncError {
    /// Connection refused, timeouts, non-success statuses and cancellations.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            SyncError::Http(_)
                | SyncError::UnexpectedStatus { .. }
                | SyncError::Timeout
                | SyncError::Cancelled
        )
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, SyncError::Parse(_))
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("unexpected document shape: {0}")]
    Shape(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the crawler, index writer and search engine can fail with.
///
/// The first six variants are the operator-facing taxonomy; their messages are
/// shown verbatim by the REST facade. The rest are infrastructure failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("indexing is already running")]
    AlreadyRunning,

    #[error("indexing is not running")]
    NotRunning,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("page {0} is outside the sites listed in the configuration file")]
    OutOfScope(String),

    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("empty search query")]
    EmptyQuery,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("crawl task failed: {0}")]
    Crawl(String),
}

impl Error {
    /// Input and control-state errors, as opposed to infrastructure failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyRunning
                | Error::NotRunning
                | Error::InvalidUrl(_)
                | Error::OutOfScope(_)
                | Error::FetchFailed { .. }
                | Error::EmptyQuery
        )
    }
}

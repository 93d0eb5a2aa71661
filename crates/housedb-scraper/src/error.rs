use housedb_core::MergeError;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::stream::{DecodeError, ResolveError, StreamError};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("stream decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("reference resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("cancelled")]
    Cancelled,

    #[error("no properties found at {url}")]
    NoData { url: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl From<FetchError> for ScrapeError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => Self::Cancelled,
            other => Self::Fetch(other),
        }
    }
}

impl From<StreamError> for ScrapeError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Decode(e) => Self::Decode(e),
            StreamError::Resolve(e) => Self::Resolve(e),
        }
    }
}

impl ScrapeError {
    /// Whether the whole batch has to stop, as opposed to one page or
    /// postcode being reported as failed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Merge(MergeError::StoreUnavailable(_))
        )
    }
}

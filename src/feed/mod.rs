use thiserror::Error;

pub mod client;
pub mod normalize;

pub use client::{EndpointClass, FeedClient};
pub use normalize::{
    normalize, CanonicalEvent, EventStatus, MarketResult, Winner, MARKET_HANDICAP,
    MARKET_MATCH_RESULT, MARKET_TOTAL,
};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no fixture payload for {sport}/{window}")]
    MissingFixture { sport: String, window: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Whether the scheduler may retry this fetch within the current cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FeedError::HttpStatus { status, .. } => status.is_server_error(),
            FeedError::Json(_) => false,
            FeedError::MissingFixture { .. } => false,
            FeedError::Config(_) => false,
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

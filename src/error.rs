//! Error types shared across the gateway.

use thiserror::Error;

/// Errors surfaced by upstream retrieval and decoding.
///
/// All of these are non-fatal for the gateway process: fetchers absorb them
/// into their retry schedule and request handlers convert them into plain
/// HTTP error responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure (connect, DNS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP status {0}")]
    UpstreamStatus(u16),

    /// A document could not be decoded at all. Per-record problems are
    /// reported through [`crate::codec::ParseLog`] instead and do not abort
    /// the overall operation.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The legacy network information kept redirecting via "moved to" URLs
    /// past the hop limit. Indicates a persistent upstream misconfiguration.
    #[error("too many moved-to redirects to follow")]
    TooManyRedirects,
}

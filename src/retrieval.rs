//! Upstream HTTP retrieval.
//!
//! All outbound requests go through the [`HttpClient`] trait so fetchers and
//! proxy handlers can be exercised against scripted responses in tests. The
//! production implementation wraps `reqwest`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;

pub const USER_AGENT: &str = concat!("WhazzupGateway/", env!("CARGO_PKG_VERSION"));
pub const EXTERNAL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A successfully retrieved upstream response.
#[derive(Debug, Clone)]
pub struct RetrievedData {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Performs a GET request. Non-2xx statuses are reported as
    /// [`GatewayError::UpstreamStatus`].
    async fn get(&self, url: &str) -> Result<RetrievedData, GatewayError>;
}

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(EXTERNAL_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<RetrievedData, GatewayError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .to_vec();

        Ok(RetrievedData {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Character sets the gateway needs to handle: the legacy text formats are
/// ISO-8859-1, the modern JSON documents are UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCharset {
    Utf8,
    Latin1,
}

/// Decodes a response body as text, honoring a `charset` parameter on the
/// Content-Type header and falling back to the given default when the header
/// is absent or names an unknown character set.
pub fn decode_text(data: &RetrievedData, fallback: TextCharset) -> String {
    let charset = data
        .content_type
        .as_deref()
        .and_then(charset_parameter)
        .unwrap_or(fallback);

    match charset {
        TextCharset::Utf8 => String::from_utf8_lossy(&data.body).into_owned(),
        TextCharset::Latin1 => latin1_to_string(&data.body),
    }
}

fn charset_parameter(content_type: &str) -> Option<TextCharset> {
    let charset = content_type
        .split(';')
        .skip(1)
        .map(str::trim)
        .find_map(|param| param.strip_prefix("charset="))?
        .trim_matches('"');

    if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") {
        Some(TextCharset::Utf8)
    } else if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        Some(TextCharset::Latin1)
    } else {
        None
    }
}

/// ISO-8859-1 maps bytes 1:1 onto the first 256 Unicode code points.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encodes as ISO-8859-1, substituting `?` for characters outside the
/// supported range.
pub fn string_to_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect()
}

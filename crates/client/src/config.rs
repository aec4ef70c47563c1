//! Client endpoints and reconnect policy

use std::time::Duration;

use stackboard_protocol::Codec;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// How the sync client retries a dropped connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Persistence service root, e.g. `http://127.0.0.1:5000`
    pub base_url: String,
    /// Sync channel endpoint, e.g. `ws://127.0.0.1:5001`
    pub ws_url: String,
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Frame encoding used on the sync channel
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            ws_url: "ws://127.0.0.1:5001".to_string(),
            request_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            codec: Codec::Json,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    /// Check both endpoints parse and use the expected schemes
    pub fn validate(&self) -> ClientResult<()> {
        check_scheme(&self.base_url, &["http", "https"])?;
        check_scheme(&self.ws_url, &["ws", "wss"])
    }

    /// Full URL of a REST resource under `/api`
    ///
    /// Each segment is percent-encoded on its own, so ids may contain `/`.
    pub fn api_url(&self, segments: &[&str]) -> ClientResult<Url> {
        let invalid =
            |reason: String| ClientError::Validation(format!("{}: {reason}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot hold a path".to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }
}

fn check_scheme(raw: &str, schemes: &[&str]) -> ClientResult<()> {
    let url = Url::parse(raw).map_err(|e| ClientError::Validation(format!("{raw}: {e}")))?;
    if schemes.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "{raw}: expected one of {schemes:?}"
        )))
    }
}

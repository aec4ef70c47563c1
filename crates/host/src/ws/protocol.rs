//! Handshake checks for sync connections
//!
//! Origin validation against the configured allow list.

use url::Url;

/// Origins allowed to open a sync connection
///
/// Only scheme and host are compared; ports are ignored.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<Url>,
}

impl OriginPolicy {
    /// Build from configured origins; unparsable entries are dropped with a warning
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = origins
            .into_iter()
            .filter_map(|origin| match Url::parse(origin.as_ref()) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(origin = origin.as_ref(), error = %e, "Ignoring invalid allowed origin");
                    None
                }
            })
            .collect();
        Self { allowed }
    }

    /// Validate an origin header using strict URL parsing
    ///
    /// Exact scheme and host comparison rejects look-alikes such as
    /// `http://localhost.evil.com`.
    pub fn allows(&self, origin: &str) -> bool {
        let Ok(origin_url) = Url::parse(origin) else {
            return false;
        };
        let origin_host = origin_url.host_str().unwrap_or("");

        self.allowed.iter().any(|allowed| {
            allowed.scheme() == origin_url.scheme()
                && allowed.host_str().unwrap_or("") == origin_host
        })
    }

    /// Decide on an optional `Origin` header; no header means same-origin
    pub fn check(&self, origin: Option<&str>) -> bool {
        origin.map_or(true, |origin| self.allows(origin))
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new(crate::config::SyncConfig::default().allowed_origins)
    }
}

//! URLs of the primary (agent) service
//!
//! All agent-side routes hang off `http://{host}:{port}`; the feed uses the
//! same authority over `ws://`.

use crate::{Error, Result};
use url::Url;

/// Route constants
pub mod routes {
    pub const CLIENT: &str = "/api/v1/client";
    pub const REGISTER: &str = "/api/v1/register";
    pub const FEED: &str = "/api/v1/client/feed";
    pub const ACTION: [&str; 4] = ["api", "v1", "client", "action"];
}

/// Resolved endpoints for one agent service instance
#[derive(Debug, Clone)]
pub struct AgentEndpoints {
    base: Url,
    feed: Url,
}

impl AgentEndpoints {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let base = Url::parse(&format!("http://{}:{}", host, port))
            .map_err(|e| Error::Config(format!("Invalid agent host {}: {}", host, e)))?;
        let feed = Url::parse(&format!("ws://{}:{}{}", host, port, routes::FEED))
            .map_err(|e| Error::Config(format!("Invalid feed url for {}: {}", host, e)))?;
        Ok(Self { base, feed })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve an absolute path such as `/api/v1/client`
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid path {}: {}", path, e)))
    }

    pub fn feed(&self) -> &Url {
        &self.feed
    }

    /// `/api/v1/client/action/{id}` with the id as a single encoded segment
    pub fn action(&self, action_id: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be a base url", self.base)))?
            .clear()
            .extend(routes::ACTION)
            .push(action_id);
        Ok(url)
    }
}

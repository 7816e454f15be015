//! Address of the Elasticsearch HTTP API on the host.

/// `scheme://host:port` of the published service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// URL scheme (always `http` for the local container).
    pub scheme: String,
    /// Host address (usually `localhost`).
    pub host: String,
    /// Port on the host.
    pub port: u16,
}

impl ServiceEndpoint {
    /// Plain-HTTP endpoint on `host:port`.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port,
        }
    }

    /// Root URL, without a trailing slash.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// URL of `path` under the root.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url(), path.trim_start_matches('/'))
    }
}

impl std::fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url())
    }
}

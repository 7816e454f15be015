//! Start options for the local Elasticsearch container.
//!
//! Options are built in code (`StartOptions::default().with_port(9201)`) or
//! resolved from `ES_LOCAL_*` environment variables with
//! [`StartOptions::from_env`]. Environment values override the defaults only;
//! builder calls made afterwards still win.

pub(crate) mod helpers;

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::helpers::{Lookup, optional_env, parse_bool, parse_optional};
use crate::error::{ConfigError, ElasticError, Result};

/// Image used when none is configured.
pub const DEFAULT_IMAGE: &str = "elasticsearch:7.13.2";
/// Well-known name of the managed container.
pub const DEFAULT_CONTAINER_NAME: &str = "elasticsearch-local-docker";
/// Host port Elasticsearch is published on by default.
pub const DEFAULT_PORT: u16 = 9200;
/// Port Elasticsearch listens on inside the container.
pub const CONTAINER_PORT: u16 = 9200;

/// An index to (re)create after the wipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, used as the request path.
    pub name: String,
    /// Creation payload (settings, mappings, aliases).
    #[serde(default = "empty_body")]
    pub body: serde_json::Value,
}

fn empty_body() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Index with no settings or mappings.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, empty_body())
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("index name must not be empty".to_string());
        }
        if self.name.starts_with(['_', '-', '+']) || self.name == "." || self.name == ".." {
            return Err(format!("index name '{}' is reserved", self.name));
        }
        if let Some(c) = self
            .name
            .chars()
            .find(|c| c.is_whitespace() || c.is_uppercase() || "/\\*?\"<>|,#:".contains(*c))
        {
            return Err(format!(
                "index name '{}' contains invalid character {:?}",
                self.name, c
            ));
        }
        Ok(())
    }
}

/// Reject empty, reserved, malformed or repeated index names.
pub(crate) fn validate_indexes(indexes: &[IndexSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for index in indexes {
        index
            .validate()
            .map_err(|reason| ElasticError::InvalidOptions { reason })?;
        if !seen.insert(index.name.as_str()) {
            return Err(ElasticError::InvalidOptions {
                reason: format!("index '{}' is listed more than once", index.name),
            });
        }
    }
    Ok(())
}

/// Options for [`crate::ElasticLocal::start`].
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Host port to publish Elasticsearch on.
    pub port: u16,
    /// Indexes to create after wiping, in creation order.
    pub indexes: Vec<IndexSpec>,
    /// Image tag; an existing container is only reused if it matches exactly.
    pub image: String,
    /// Well-known container name.
    pub container_name: String,
    /// Host used to reach the published port.
    pub host: String,
    /// JVM heap size passed as both `-Xms` and `-Xmx`.
    pub heap: String,
    /// Delay between readiness probes.
    pub poll_interval: Duration,
    /// Deadline for the service to become ready. `None` waits forever.
    pub startup_timeout: Option<Duration>,
    /// Pull the image when it is not present locally.
    pub auto_pull: bool,
    /// Fail `start` when any index operation fails.
    pub strict_indexes: bool,
    /// Extra container environment: (name, value).
    pub extra_env: Vec<(String, String)>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            indexes: Vec::new(),
            image: DEFAULT_IMAGE.to_string(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            host: "localhost".to_string(),
            heap: "750m".to_string(),
            poll_interval: Duration::from_millis(500),
            startup_timeout: Some(Duration::from_secs(120)),
            auto_pull: true,
            strict_indexes: false,
            extra_env: Vec::new(),
        }
    }
}

impl StartOptions {
    /// Defaults overlaid with `ES_LOCAL_*` environment variables.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::resolve(&optional_env)
    }

    pub(crate) fn resolve(lookup: Lookup<'_>) -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();

        let startup_timeout = match lookup("ES_LOCAL_STARTUP_TIMEOUT_SECS")? {
            None => defaults.startup_timeout,
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: "ES_LOCAL_STARTUP_TIMEOUT_SECS".to_string(),
                    message: format!("must be a whole number of seconds: {e}"),
                })?;
                // 0 disables the deadline
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        let port = parse_optional(lookup, "ES_LOCAL_PORT", defaults.port)?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ES_LOCAL_PORT".to_string(),
                message: "must be between 1 and 65535".to_string(),
            });
        }

        Ok(Self {
            port,
            image: lookup("ES_LOCAL_IMAGE")?.unwrap_or(defaults.image),
            container_name: lookup("ES_LOCAL_CONTAINER_NAME")?.unwrap_or(defaults.container_name),
            host: lookup("ES_LOCAL_HOST")?.unwrap_or(defaults.host),
            heap: lookup("ES_LOCAL_HEAP")?.unwrap_or(defaults.heap),
            poll_interval: Duration::from_millis(parse_optional(
                lookup,
                "ES_LOCAL_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            startup_timeout,
            auto_pull: parse_bool(lookup, "ES_LOCAL_AUTO_PULL", defaults.auto_pull)?,
            strict_indexes: parse_bool(lookup, "ES_LOCAL_STRICT_INDEXES", defaults.strict_indexes)?,
            ..defaults
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_indexes(mut self, indexes: impl IntoIterator<Item = IndexSpec>) -> Self {
        self.indexes.extend(indexes);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_auto_pull(mut self, auto_pull: bool) -> Self {
        self.auto_pull = auto_pull;
        self
    }

    pub fn with_strict_indexes(mut self, strict: bool) -> Self {
        self.strict_indexes = strict;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Reject options that could only fail later, after the container is up.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(ElasticError::InvalidOptions { reason });

        if self.port == 0 {
            return invalid("port must be between 1 and 65535".to_string());
        }
        if self.image.trim().is_empty() {
            return invalid("image must not be empty".to_string());
        }
        if self.container_name.trim().is_empty() {
            return invalid("container name must not be empty".to_string());
        }
        if self.poll_interval.is_zero() {
            return invalid("poll interval must be greater than zero".to_string());
        }

        validate_indexes(&self.indexes)
    }

    /// Container environment: single-node discovery, fixed heap, then extras.
    pub fn container_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("discovery.type".to_string(), "single-node".to_string()),
            (
                "ES_JAVA_OPTS".to_string(),
                format!("-Xms{heap} -Xmx{heap}", heap = self.heap),
            ),
        ];
        env.extend(self.extra_env.iter().cloned());
        env
    }
}

//! Connection and query configuration.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{EsError, Result};

pub const DEFAULT_PORT: u16 = 9200;
pub const DEFAULT_MAX_HITS: usize = 10_000;
pub const DEFAULT_SCROLL_TTL_SECS: u64 = 60;
pub const DEFAULT_SCROLL_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct EsConfig {
    pub cluster_name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Upper bound on hits returned by a single non-scroll search.
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
    #[serde(default)]
    pub scroll: ScrollConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ScrollConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SCROLL_TTL_SECS,
            page_size: DEFAULT_SCROLL_PAGE_SIZE,
        }
    }
}

impl ScrollConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// A zero page size opens the scroll with an empty first page; a zero TTL
    /// expires the context before the next page.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(EsError::Config(
                "scroll.page_size must be greater than 0".into(),
            ));
        }
        if self.ttl_secs == 0 {
            return Err(EsError::Config(
                "scroll.ttl_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// The hit cap must allow at least one hit.
pub fn validate_max_hits(max_hits: usize) -> Result<()> {
    if max_hits == 0 {
        return Err(EsError::Config("max_hits must be greater than 0".into()));
    }
    Ok(())
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_max_hits() -> usize {
    DEFAULT_MAX_HITS
}

fn default_ttl_secs() -> u64 {
    DEFAULT_SCROLL_TTL_SECS
}

fn default_page_size() -> usize {
    DEFAULT_SCROLL_PAGE_SIZE
}

impl EsConfig {
    pub fn new(cluster_name: &str, host: &str, port: u16) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            host: host.to_string(),
            port,
            scheme: default_scheme(),
            max_hits: DEFAULT_MAX_HITS,
            scroll: ScrollConfig::default(),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EsConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make searches or scrolling meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(EsError::Config("cluster_name must not be empty".into()));
        }
        if self.host.is_empty() {
            return Err(EsError::Config("host must not be empty".into()));
        }
        validate_max_hits(self.max_hits)?;
        self.scroll.validate()
    }

    /// Seed node URL, e.g. `http://localhost:9200`.
    pub fn url(&self) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}://{}:{}",
            self.scheme, self.host, self.port
        ))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cluster_name = \"logs\"\nhost = \"localhost\"").unwrap();

        let config = EsConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cluster_name, "logs");
        assert_eq!(config.port, 9200);
        assert_eq!(config.scheme, "http");
        assert_eq!(config.max_hits, 10_000);
        assert_eq!(config.scroll, ScrollConfig::default());
        assert_eq!(config.scroll.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
cluster_name = "search"
host = "es.internal"
port = 9300
max_hits = 25000

[scroll]
ttl_secs = 30
page_size = 500
"#
        )
        .unwrap();

        let config = EsConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.port, 9300);
        assert_eq!(config.max_hits, 25_000);
        assert_eq!(config.scroll.page_size, 500);
        assert_eq!(config.scroll.ttl_secs, 30);
        assert_eq!(config.url().unwrap().as_str(), "http://es.internal:9300/");
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = EsConfig::new("c", "localhost", 9200);
        config.scroll.page_size = 0;
        assert!(matches!(config.validate(), Err(EsError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = EsConfig::load_from_file("/nonexistent/esquery.toml");
        assert!(matches!(result, Err(EsError::Io(_))));
    }
}

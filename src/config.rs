//! Session configuration.
//!
//! One YAML document is read at startup into an immutable [`Config`] and
//! passed by reference to whatever needs it. Nothing re-reads settings
//! mid-run.
//!
//! ```yaml
//! scraping:
//!   call_limit: 5
//!   period_seconds: 10
//!   attempts: 3
//! proxy:
//!   count: 4
//!   source: proxies.txt
//!   check_url: https://httpbin.org/ip
//! sites:
//!   sauto:
//!     base_url: "https://www.sauto.cz/inzerce/osobni?strana="
//!     user_agents: ["Mozilla/5.0 (X11; Linux x86_64)"]
//! catalog:
//!   path: data/catalog.json
//! logging:
//!   dir: logs
//! ```

use crate::error::ConfigError;
use crate::models::HeaderSet;
use crate::proxy::ProxySource;
use crate::proxy::health::DEFAULT_PROBE_TIMEOUT;
use crate::scrapers::Site;
use crate::throttle::FetchBudget;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scraping: ScrapingConfig,
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub sites: BTreeMap<Site, SiteConfig>,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapingConfig {
    pub call_limit: u32,
    pub period_seconds: u64,
    /// Requests already spent against the budget when the session starts.
    #[serde(default)]
    pub calls_made: u32,
    pub attempts: u32,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub count: usize,
    pub source: Option<String>,
    pub check_url: Option<String>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteConfig {
    pub base_url: Option<String>,
    pub proxy_source: Option<String>,
    pub check_url: Option<String>,
    pub user_agents: Option<Vec<String>>,
    /// Sent with every request, alongside the rotating `User-Agent`.
    #[serde(default)]
    pub headers: HeaderSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the per-concern log files; console only when unset.
    pub dir: Option<PathBuf>,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_probe_concurrency() -> usize {
    1
}

/// Snapshot of the session knobs, read once at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub call_limit: u32,
    pub period: Duration,
    pub calls_made: u32,
    pub attempts: u32,
    pub proxy_count: usize,
}

impl Settings {
    /// A fresh budget for one fetcher.
    pub fn budget(&self) -> FetchBudget {
        FetchBudget::new(self.call_limit, self.period, self.calls_made)
    }
}

/// Everything needed to scrape one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub site: Site,
    /// The page number is appended to this.
    pub base_url: String,
    pub proxy_source: ProxySource,
    pub check_url: String,
    /// One header set per configured user agent.
    pub header_sets: Vec<HeaderSet>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scraping.call_limit == 0 {
            return Err(invalid("scraping.call_limit", "must be greater than zero"));
        }
        if self.scraping.attempts == 0 {
            return Err(invalid("scraping.attempts", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            call_limit: self.scraping.call_limit,
            period: Duration::from_secs(self.scraping.period_seconds),
            calls_made: self.scraping.calls_made,
            attempts: self.scraping.attempts,
            proxy_count: self.proxy.count,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.scraping.fetch_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy.probe_timeout_secs)
    }

    /// The proxy source and check URL for `site`, or the global ones.
    ///
    /// A site may override either; nothing else about the site is resolved,
    /// so a site section without `base_url` or `user_agents` is fine here.
    pub fn proxy_endpoints(&self, site: Option<Site>) -> Result<(ProxySource, String), ConfigError> {
        let section = site.and_then(|site| self.sites.get(&site));
        let missing = |site_key: &str, global_key: &str| {
            ConfigError::MissingKey(match site {
                Some(site) => format!("sites.{site}.{site_key}"),
                None => format!("proxy.{global_key}"),
            })
        };

        let source = section
            .and_then(|s| s.proxy_source.as_deref())
            .or(self.proxy.source.as_deref())
            .map(ProxySource::parse)
            .ok_or_else(|| missing("proxy_source", "source"))?;
        let check_url = section
            .and_then(|s| s.check_url.clone())
            .or_else(|| self.proxy.check_url.clone())
            .ok_or_else(|| missing("check_url", "check_url"))?;
        Ok((source, check_url))
    }

    /// Resolve the profile for `site`.
    ///
    /// A site may override the global proxy source and check URL; without
    /// either, the key is reported missing under the site's section.
    pub fn site(&self, site: Site) -> Result<SiteProfile, ConfigError> {
        let section = self
            .sites
            .get(&site)
            .ok_or_else(|| ConfigError::MissingKey(format!("sites.{site}")))?;
        let key = |name: &str| format!("sites.{site}.{name}");

        let base_url = section
            .base_url
            .clone()
            .ok_or_else(|| ConfigError::MissingKey(key("base_url")))?;
        Url::parse(&base_url).map_err(|e| invalid(&key("base_url"), &e.to_string()))?;

        let (proxy_source, check_url) = self.proxy_endpoints(Some(site))?;

        let user_agents = section
            .user_agents
            .as_ref()
            .ok_or_else(|| ConfigError::MissingKey(key("user_agents")))?;
        let header_sets = user_agents
            .iter()
            .map(|agent| {
                let mut headers = section.headers.clone();
                headers.insert("User-Agent".to_string(), agent.clone());
                headers
            })
            .collect::<Vec<_>>();

        debug!(%site, %base_url, header_sets = header_sets.len(), "Resolved site profile");
        Ok(SiteProfile {
            site,
            base_url,
            proxy_source,
            check_url,
            header_sets,
        })
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

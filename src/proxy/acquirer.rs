//! Candidate proxy loading and sampling.
//!
//! # Source formats
//!
//! | Source | Format |
//! |--------|--------|
//! | Local path | One `host:port` per line; blank lines and `#` comments skipped; CSV rows use the first column |
//! | `http(s)://` URL | Same line format, or ProxyScrape JSON `{"proxies":[{"ip":..,"port":..}]}` |

use crate::error::{AcquireError, ProxySourceError};
use crate::http::{HttpRequest, HttpTransport};
use crate::models::ProxyCandidate;
use itertools::Itertools;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument};

/// Where candidate proxies come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxySource {
    File(PathBuf),
    Remote(String),
}

impl ProxySource {
    /// `http://` and `https://` locations are remote, anything else is a path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ProxySource::Remote(location.to_string())
        } else {
            ProxySource::File(PathBuf::from(location))
        }
    }
}

impl fmt::Display for ProxySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxySource::File(path) => write!(f, "{}", path.display()),
            ProxySource::Remote(url) => f.write_str(url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyScrapeList {
    proxies: Vec<ProxyScrapeEntry>,
}

#[derive(Debug, Deserialize)]
struct ProxyScrapeEntry {
    ip: String,
    port: u16,
}

/// Parse a candidate list body, deduplicating while preserving first-seen order.
pub fn parse_candidates(body: &str) -> Vec<ProxyCandidate> {
    if let Ok(list) = serde_json::from_str::<ProxyScrapeList>(body) {
        return list
            .proxies
            .into_iter()
            .map(|p| ProxyCandidate::new(format!("{}:{}", p.ip, p.port)))
            .unique()
            .collect();
    }
    body.lines()
        .filter_map(ProxyCandidate::from_line)
        .unique()
        .collect()
}

/// Loads candidates and samples the session's proxies.
#[derive(Debug)]
pub struct ProxyAcquirer<'a, T> {
    source: ProxySource,
    default_count: usize,
    transport: &'a T,
}

impl<'a, T: HttpTransport> ProxyAcquirer<'a, T> {
    /// `default_count` comes from the session settings and is used when
    /// [`acquire`](Self::acquire) is not given an explicit count.
    pub fn new(source: ProxySource, default_count: usize, transport: &'a T) -> Self {
        Self {
            source,
            default_count,
            transport,
        }
    }

    /// Draw `desired` distinct candidates uniformly at random.
    ///
    /// # Errors
    ///
    /// - [`ProxySourceError::NotFound`] / [`ProxySourceError::Empty`] for an unusable source
    /// - [`AcquireError::InsufficientCandidates`] if fewer than `desired` candidates exist
    #[instrument(level = "info", skip_all, fields(source = %self.source))]
    pub async fn acquire(&self, desired: Option<usize>) -> Result<Vec<ProxyCandidate>, AcquireError> {
        let desired = desired.unwrap_or(self.default_count);
        let candidates = self.load_candidates().await.inspect_err(|e| {
            error!(error = %e, "Failed to load proxy candidates");
        })?;
        let sample = sample(&candidates, desired, &mut rand::rng())?;
        info!(available = candidates.len(), sampled = sample.len(), "Acquired proxy candidates");
        Ok(sample)
    }

    /// Read every candidate from the source.
    pub async fn load_candidates(&self) -> Result<Vec<ProxyCandidate>, ProxySourceError> {
        let body = match &self.source {
            ProxySource::File(path) => read_file(path).await?,
            ProxySource::Remote(url) => self.read_remote(url).await?,
        };
        let candidates = parse_candidates(&body);
        debug!(count = candidates.len(), "Parsed proxy candidates");
        if candidates.is_empty() {
            return Err(ProxySourceError::Empty(self.source.to_string()));
        }
        Ok(candidates)
    }

    async fn read_remote(&self, url: &str) -> Result<String, ProxySourceError> {
        let response = self
            .transport
            .get(&HttpRequest::get(url))
            .await
            .map_err(|e| ProxySourceError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.is_success() {
            return Err(ProxySourceError::Fetch {
                url: url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        Ok(response.body)
    }
}

async fn read_file(path: &Path) -> Result<String, ProxySourceError> {
    match fs::read_to_string(path).await {
        Ok(body) => Ok(body),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ProxySourceError::NotFound(path.display().to_string()))
        }
        Err(source) => Err(ProxySourceError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Sample without replacement; never silently truncates.
fn sample<R: Rng + ?Sized>(
    candidates: &[ProxyCandidate],
    desired: usize,
    rng: &mut R,
) -> Result<Vec<ProxyCandidate>, AcquireError> {
    if desired > candidates.len() {
        return Err(AcquireError::InsufficientCandidates {
            requested: desired,
            available: candidates.len(),
        });
    }
    Ok(candidates.choose_multiple(rng, desired).cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ok, status, ScriptedTransport};
    use std::collections::HashSet;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn acquirer<'a>(file: &NamedTempFile, transport: &'a ScriptedTransport) -> ProxyAcquirer<'a, ScriptedTransport> {
        ProxyAcquirer::new(ProxySource::File(file.path().to_path_buf()), 2, transport)
    }

    #[tokio::test]
    async fn test_more_requested_than_available() {
        let file = source_file("1.1.1.1:80\n2.2.2.2:80\n3.3.3.3:80\n");
        let transport = ScriptedTransport::default();
        let err = acquirer(&file, &transport).acquire(Some(5)).await.unwrap_err();
        assert!(matches!(
            err,
            AcquireError::InsufficientCandidates { requested: 5, available: 3 }
        ));
    }

    #[tokio::test]
    async fn test_samples_exact_distinct_count() {
        let file = source_file("1.1.1.1:80\n2.2.2.2:80\n3.3.3.3:80\n");
        let transport = ScriptedTransport::default();
        let sample = acquirer(&file, &transport).acquire(Some(2)).await.unwrap();
        assert_eq!(sample.len(), 2);
        let distinct: HashSet<_> = sample.iter().collect();
        assert_eq!(distinct.len(), 2);
    }

    #[tokio::test]
    async fn test_default_count_from_settings() {
        let file = source_file("1.1.1.1:80\n2.2.2.2:80\n3.3.3.3:80\n");
        let transport = ScriptedTransport::default();
        assert_eq!(acquirer(&file, &transport).acquire(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let file = source_file("\n# nothing here\n\n");
        let transport = ScriptedTransport::default();
        let err = acquirer(&file, &transport).acquire(Some(1)).await.unwrap_err();
        assert!(matches!(err, AcquireError::Source(ProxySourceError::Empty(_))));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let transport = ScriptedTransport::default();
        let acquirer = ProxyAcquirer::new(
            ProxySource::File(PathBuf::from("/definitely/not/here/proxies.txt")),
            1,
            &transport,
        );
        let err = acquirer.acquire(None).await.unwrap_err();
        assert!(matches!(err, AcquireError::Source(ProxySourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remote_proxyscrape_json() {
        let url = "https://api.example.com/proxies";
        let transport = ScriptedTransport::per_url(vec![(
            url,
            ok(r#"{"proxies":[{"ip":"9.9.9.9","port":3128},{"ip":"8.8.8.8","port":80}]}"#),
        )]);
        let acquirer = ProxyAcquirer::new(ProxySource::parse(url), 2, &transport);
        let mut all = acquirer.load_candidates().await.unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![ProxyCandidate::new("8.8.8.8:80"), ProxyCandidate::new("9.9.9.9:3128")]
        );
        assert!(transport.requests()[0].proxy.is_none());
    }

    #[tokio::test]
    async fn test_remote_error_status() {
        let url = "https://api.example.com/proxies";
        let transport = ScriptedTransport::per_url(vec![(url, status(502))]);
        let acquirer = ProxyAcquirer::new(ProxySource::parse(url), 1, &transport);
        assert!(matches!(
            acquirer.acquire(None).await,
            Err(AcquireError::Source(ProxySourceError::Fetch { .. }))
        ));
    }

    #[test]
    fn test_parse_candidates_dedups_and_reads_csv() {
        let parsed = parse_candidates("ip,port\n1.1.1.1:80,CZ\n1.1.1.1:80\n2.2.2.2:8080\n");
        assert_eq!(
            parsed,
            vec![
                ProxyCandidate::new("1.1.1.1:80"),
                ProxyCandidate::new("2.2.2.2:8080"),
            ]
        );
    }

    #[test]
    fn test_source_parse() {
        assert!(matches!(ProxySource::parse("https://x/y"), ProxySource::Remote(_)));
        assert!(matches!(ProxySource::parse("./proxies.txt"), ProxySource::File(_)));
    }
}

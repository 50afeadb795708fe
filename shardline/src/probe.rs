//! Preflight size discovery.
//!
//! Before committing to a download, each physical file is probed with a
//! single-byte range request (`Range: bytes=0-0`). The authoritative size is
//! read from the `Content-Range` total, falling back to `Content-Length` when
//! the host ignores range requests.
//!
//! Probing is best-effort: any failure yields `0` ("unknown") for that file
//! and never fails the batch. There are no retries at this layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::Client;

use crate::error::DownloadResult;
use crate::source::UrlResolver;
use crate::BoxFuture;

/// Default timeout for a single probe request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Discovers expected file sizes before a group is enqueued.
pub trait SizeProber: Send + Sync {
    /// Probe every file in parallel.
    ///
    /// The returned map holds an entry for every requested filename; `0`
    /// means the size could not be determined.
    fn probe_sizes<'a>(
        &'a self,
        source_root: &'a str,
        filenames: &'a [String],
    ) -> BoxFuture<'a, HashMap<String, u64>>;
}

/// Range-request prober over HTTP.
#[derive(Clone)]
pub struct HttpSizeProber {
    client: Client,
    resolver: Arc<dyn UrlResolver>,
    timeout: Duration,
}

impl HttpSizeProber {
    /// Create a prober resolving URLs with `resolver`.
    pub fn new(resolver: Arc<dyn UrlResolver>, timeout: Duration) -> DownloadResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            resolver,
            timeout,
        })
    }

    /// Create a prober that shares an existing HTTP client.
    pub fn with_client(client: Client, resolver: Arc<dyn UrlResolver>, timeout: Duration) -> Self {
        Self {
            client,
            resolver,
            timeout,
        }
    }

    /// Probe one URL, returning `0` on any failure.
    pub async fn probe_url(&self, url: &str) -> u64 {
        match self.try_probe(url).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(url, error = %e, "Size probe failed");
                0
            }
        }
    }

    async fn try_probe(&self, url: &str) -> Result<u64, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url, %status, "Size probe rejected");
            return Ok(0);
        }

        Ok(size_from_headers(response.headers()))
    }
}

impl SizeProber for HttpSizeProber {
    fn probe_sizes<'a>(
        &'a self,
        source_root: &'a str,
        filenames: &'a [String],
    ) -> BoxFuture<'a, HashMap<String, u64>> {
        Box::pin(async move {
            let probes = filenames.iter().map(|filename| async move {
                let url = self.resolver.resolve(source_root, filename);
                (filename.clone(), self.probe_url(&url).await)
            });
            join_all(probes).await.into_iter().collect()
        })
    }
}

/// Extract the full resource size from probe response headers.
///
/// Prefers the total of a `Content-Range` header and falls back to
/// `Content-Length`; returns `0` when neither is usable.
pub fn size_from_headers(headers: &HeaderMap) -> u64 {
    if let Some(total) = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
    {
        return total;
    }

    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Parse the total from a `Content-Range` value such as `bytes 0-0/12345`.
///
/// Returns `None` for an unknown total (`bytes 0-0/*`) or a malformed value.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let slash = value.rfind('/')?;
    let total = value[slash + 1..].trim();
    if total == "*" {
        None
    } else {
        total.parse::<u64>().ok()
    }
}

/// Prober that returns fixed sizes, for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticSizeProber {
    sizes: HashMap<String, u64>,
}

impl StaticSizeProber {
    /// Create a prober that knows no sizes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the size reported for `filename`.
    pub fn with_size(mut self, filename: impl Into<String>, size: u64) -> Self {
        self.sizes.insert(filename.into(), size);
        self
    }
}

impl SizeProber for StaticSizeProber {
    fn probe_sizes<'a>(
        &'a self,
        _source_root: &'a str,
        filenames: &'a [String],
    ) -> BoxFuture<'a, HashMap<String, u64>> {
        Box::pin(async move {
            filenames
                .iter()
                .map(|f| (f.clone(), self.sizes.get(f).copied().unwrap_or(0)))
                .collect()
        })
    }
}

use crate::cache::TtlCache;
use crate::chart::index::RepoIndex;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Total cost budget shared by the index and byte caches.
const MAX_CACHE_COST: u64 = 100_000_000;

/// Cost assigned to a parsed index structure. Large so indexes are always
/// admitted ahead of raw byte payloads.
const INDEX_STRUCT_COST: u64 = 100_000;

type IndexOutcome = std::result::Result<Arc<RepoIndex>, Arc<ProxyError>>;
type BytesOutcome = std::result::Result<Bytes, Arc<ProxyError>>;

/// Downloads `index.yaml` and chart tarballs from upstream repositories.
///
/// Index results, raw index bytes, and index *failures* all go through the
/// TTL caches: errors are remembered briefly so client retry storms do not
/// hammer the upstream. Concurrent requests for the same missing key may each
/// trigger a fetch; the set of upstream repositories is small enough that no
/// coalescing layer is needed.
pub struct UpstreamFetcher {
    client: reqwest::Client,
    scheme: &'static str,
    index_cache: TtlCache<IndexOutcome>,
    bytes_cache: TtlCache<BytesOutcome>,
    index_ttl: Duration,
    error_ttl: Duration,
}

impl UpstreamFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_scheme(config, "https")
    }

    /// Scheme override for driving the fetcher against plain-HTTP upstreams
    /// in tests.
    pub fn with_scheme(config: &Config, scheme: &'static str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(UpstreamFetcher {
            client,
            scheme,
            index_cache: TtlCache::new(MAX_CACHE_COST),
            bytes_cache: TtlCache::new(MAX_CACHE_COST),
            index_ttl: config.index_cache_ttl(),
            error_ttl: config.index_error_cache_ttl(),
        })
    }

    /// Fetch and parse the repository index for an upstream path such as
    /// `charts.jetstack.io` or `charts.bitnami.com/bitnami`.
    pub async fn get_index(&self, repo_path: &str) -> IndexOutcome {
        if let Some(cached) = self.index_cache.get(repo_path) {
            return cached;
        }
        let outcome = self
            .download_index(repo_path)
            .await
            .map(Arc::new)
            .map_err(Arc::new);
        let ttl = if outcome.is_err() {
            self.error_ttl
        } else {
            self.index_ttl
        };
        self.index_cache
            .insert(repo_path.to_string(), outcome.clone(), INDEX_STRUCT_COST, ttl);
        outcome
    }

    async fn download_index(&self, repo_path: &str) -> Result<RepoIndex> {
        let url = format!("{}://{}/index.yaml", self.scheme, repo_path);
        tracing::debug!(url = %url, "downloading index");
        let data = self.index_bytes(&url).await?;
        RepoIndex::parse(&data)
    }

    /// Raw index bytes, cached by URL with the byte length as cost.
    async fn index_bytes(&self, url: &str) -> Result<Bytes> {
        if let Some(cached) = self.bytes_cache.get(url) {
            return cached.map_err(ProxyError::from);
        }
        let outcome = self.fetch_bytes(url).await.map_err(Arc::new);
        let (cost, ttl) = match &outcome {
            Ok(data) => ((data.len() as u64).max(1), self.index_ttl),
            Err(_) => (1, self.error_ttl),
        };
        self.bytes_cache
            .insert(url.to_string(), outcome.clone(), cost, ttl);
        outcome.map_err(ProxyError::from)
    }

    /// Download a chart tarball. Not cached: the packed result lives in the
    /// manifest and blob stores instead.
    pub async fn download_chart(&self, url: &str) -> Result<Bytes> {
        tracing::debug!(url = %url, "downloading chart");
        self.fetch_bytes(url).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProxyError::Upstream(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }
}

//! Manifest store, manifest pull handlers, chart preparation, and the
//! eviction loop.

use crate::blobs::BlobHandler;
use crate::chart::fetch::UpstreamFetcher;
use crate::chart::index::chart_download_url;
use crate::chart::pack::{is_manifest_media_type, pack_chart};
use crate::chart::rewrite::{rewrite_chart_dependencies, RewriteOptions};
use crate::chart::{deterministic_created, extract_chart_metadata};
use crate::config::Config;
use crate::digest::Digest;
use crate::registry::RegError;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

type RepoMap = HashMap<String, HashMap<String, ManifestRecord>>;

/// One stored manifest. The digest of the record is the sha256 of `bytes`;
/// `refs` lists the blobs the eviction loop must drop with it.
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    pub content_type: String,
    pub bytes: Bytes,
    pub refs: Vec<Digest>,
    pub created_at: DateTime<Utc>,
}

/// Two-level mapping repository → (tag or digest) → record, guarded by one
/// mutex. The manifest handlers hold the mutex across `prepare`, which
/// serialises concurrent pulls but guarantees that a visible manifest always
/// has its referenced blobs resident.
pub struct ManifestStore {
    pub(crate) entries: Mutex<RepoMap>,
    pub(crate) blobs: Arc<dyn BlobHandler>,
    pub(crate) fetcher: UpstreamFetcher,
    pub(crate) config: Arc<Config>,
}

impl ManifestStore {
    pub fn new(blobs: Arc<dyn BlobHandler>, fetcher: UpstreamFetcher, config: Arc<Config>) -> Self {
        ManifestStore {
            entries: Mutex::new(HashMap::new()),
            blobs,
            fetcher,
            config,
        }
    }

    pub async fn get_record(&self, repo: &str, name: &str) -> Option<ManifestRecord> {
        self.entries
            .lock()
            .await
            .get(repo)
            .and_then(|m| m.get(name))
            .cloned()
    }

    pub async fn insert_record(&self, repo: &str, name: &str, record: ManifestRecord) {
        self.entries
            .lock()
            .await
            .entry(repo.to_string())
            .or_default()
            .insert(name.to_string(), record);
    }

    pub async fn repositories(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Resolve the requested chart version upstream, pack it, and populate
    /// the stores. Runs with the store lock already held by the caller.
    pub(crate) async fn prepare_chart(
        &self,
        entries: &mut RepoMap,
        repo: &str,
        reference: &str,
        rewrite: &RewriteOptions,
    ) -> Result<(), RegError> {
        let elem: Vec<&str> = repo.split('/').collect();
        if elem.len() < 2 {
            return Err(RegError::internal(format!(
                "invalid repository path: {repo}"
            )));
        }
        let path = elem[..elem.len() - 1].join("/");
        let chart = elem[elem.len() - 1];

        let index = self.fetcher.get_index(&path).await.map_err(|err| {
            RegError::new(
                StatusCode::NOT_FOUND,
                "NAME_UNKNOWN",
                format!("index file fetch error: {path}: {err}"),
            )
        })?;

        tracing::debug!(chart = %chart, reference = %reference, path = %path, "searching index");
        let entry = index.resolve(chart, reference).ok_or_else(|| {
            RegError::not_found(format!("Chart: {chart} version: {reference} not found"))
        })?;

        let raw_url = entry
            .urls
            .first()
            .ok_or_else(|| RegError::not_found("Chart has no URLs"))?;
        let download_url = chart_download_url(&path, raw_url);
        let tag = entry
            .metadata
            .version
            .strip_prefix('v')
            .unwrap_or(&entry.metadata.version)
            .to_string();

        let mut tarball = self
            .fetcher
            .download_chart(&download_url)
            .await
            .map_err(RegError::internal)?;

        if rewrite.enabled && !rewrite.proxy_host.is_empty() {
            match rewrite_chart_dependencies(&tarball, &rewrite.proxy_host) {
                Ok((data, outcome)) if outcome.modified => {
                    tracing::debug!(
                        chart = %chart,
                        rewritten = outcome.dependencies.len(),
                        "rewrote chart dependencies"
                    );
                    tarball = data;
                }
                Ok(_) => {}
                Err(err) => {
                    // fall open: serve the chart as-is
                    tracing::warn!(chart = %chart, error = %err, "failed to rewrite dependencies");
                }
            }
        }

        let metadata = match extract_chart_metadata(&tarball) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(chart = %chart, error = %err, "failed to extract chart metadata, using empty config");
                None
            }
        };

        let created = deterministic_created(
            &entry.metadata.name,
            &entry.metadata.version,
            entry.created,
        );
        let packed = pack_chart(metadata.as_ref(), &tarball, &download_url, created)
            .map_err(RegError::internal)?;
        debug_assert!(is_manifest_media_type(packed.content_type));

        // blobs must be resident before the manifest becomes visible
        let put = self
            .blobs
            .put_handler()
            .ok_or_else(|| RegError::internal("blob store is read-only"))?;
        put.put(repo, &packed.config_digest, packed.config.clone())
            .await
            .map_err(RegError::internal)?;
        put.put(repo, &packed.layer_digest, tarball.clone())
            .await
            .map_err(RegError::internal)?;

        let record = ManifestRecord {
            content_type: packed.content_type.to_string(),
            bytes: packed.manifest.clone(),
            refs: vec![packed.config_digest.clone(), packed.layer_digest.clone()],
            created_at: created,
        };

        tracing::info!(
            repo = %repo,
            tag = %tag,
            digest = %packed.digest,
            layer_size = tarball.len(),
            "prepared chart manifest"
        );

        let repo_map = entries.entry(repo.to_string()).or_default();
        repo_map.insert(packed.digest.to_string(), record.clone());
        repo_map.insert(tag, record);
        Ok(())
    }

    /// Drop every record older than the manifest TTL and delete its
    /// referenced blobs where the backend supports deletion.
    pub async fn evict_expired(&self) {
        let ttl = chrono::Duration::from_std(self.config.manifest_cache_ttl())
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let cutoff = Utc::now() - ttl;

        let mut entries = self.entries.lock().await;
        let delete = self.blobs.delete_handler();
        for (repo, records) in entries.iter_mut() {
            let expired: Vec<String> = records
                .iter()
                .filter(|(_, record)| record.created_at < cutoff)
                .map(|(name, _)| name.clone())
                .collect();
            for name in expired {
                let Some(record) = records.remove(&name) else {
                    continue;
                };
                tracing::debug!(repo = %repo, name = %name, "evicting expired manifest");
                if let Some(delete) = delete {
                    for digest in &record.refs {
                        if let Err(err) = delete.delete(repo, digest).await {
                            tracing::warn!(digest = %digest, error = %err, "failed to delete blob");
                        }
                    }
                }
            }
        }
    }
}

/// Background eviction task, one per store. Fires every minute until the
/// token is cancelled.
pub fn spawn_eviction_loop(
    store: Arc<ManifestStore>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(60);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("manifest cleanup cycle");
                    store.evict_expired().await;
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("eviction loop stopped");
                    return;
                }
            }
        }
    })
}

/// GET `/v2/<repo>/manifests/<ref>`
pub async fn get_manifest(
    store: &ManifestStore,
    repo: &str,
    reference: &str,
    rewrite: &RewriteOptions,
) -> Result<Response, RegError> {
    let target = normalize_reference(reference);
    let mut entries = store.entries.lock().await;

    let mut prepared = false;
    if !entries.contains_key(repo) {
        store
            .prepare_chart(&mut entries, repo, &target, rewrite)
            .await?;
        prepared = true;
    }
    if record_of(&entries, repo, &target).is_none() && !prepared {
        store
            .prepare_chart(&mut entries, repo, &target, rewrite)
            .await?;
    }
    let record = record_of(&entries, repo, &target).ok_or_else(|| {
        RegError::not_found(format!("Chart prepare's result not found: {repo}, {target}"))
    })?;

    manifest_response(record, true)
}

/// HEAD `/v2/<repo>/manifests/<ref>`
///
/// Same as GET without the body; additionally retries with the `_` → `+`
/// remap before giving up, for clients that cannot put `+` in a tag.
pub async fn head_manifest(
    store: &ManifestStore,
    repo: &str,
    reference: &str,
    rewrite: &RewriteOptions,
) -> Result<Response, RegError> {
    let mut target = normalize_reference(reference);
    let mut entries = store.entries.lock().await;

    if !entries.contains_key(repo) {
        store
            .prepare_chart(&mut entries, repo, &target, rewrite)
            .await?;
    }
    if record_of(&entries, repo, &target).is_none() {
        store
            .prepare_chart(&mut entries, repo, &target, rewrite)
            .await?;
        if record_of(&entries, repo, &target).is_none() && target.contains('_') {
            target = target.replace('_', "+");
        }
    }
    let record = record_of(&entries, repo, &target)
        .ok_or_else(|| RegError::not_found("Chart prepare error"))?;

    manifest_response(record, false)
}

fn record_of<'a>(entries: &'a RepoMap, repo: &str, name: &str) -> Option<&'a ManifestRecord> {
    entries.get(repo).and_then(|m| m.get(name))
}

fn manifest_response(record: &ManifestRecord, include_body: bool) -> Result<Response, RegError> {
    let digest = Digest::of_bytes(&record.bytes);
    let body = if include_body {
        Body::from(record.bytes.clone())
    } else {
        Body::empty()
    };
    Response::builder()
        .status(StatusCode::OK)
        .header("Docker-Content-Digest", digest.as_str())
        .header(header::CONTENT_TYPE, record.content_type.as_str())
        .header(header::CONTENT_LENGTH, record.bytes.len())
        .body(body)
        .map_err(RegError::internal)
}

/// OCI clients address the chart by its tag without the `v` prefix; the
/// upstream version frequently carries one. Records are keyed without it.
fn normalize_reference(reference: &str) -> String {
    reference.strip_prefix('v').unwrap_or(reference).to_string()
}

//! Manifest store eviction tests.

use bytes::Bytes;
use chart_proxy::blobs::{BlobError, BlobHandler, MemBlobHandler};
use chart_proxy::chart::fetch::UpstreamFetcher;
use chart_proxy::registry::manifest::{ManifestRecord, ManifestStore};
use chart_proxy::{Config, Digest};
use chrono::Utc;
use std::sync::Arc;

const REPO: &str = "charts.example.com/app";

fn new_store() -> (Arc<MemBlobHandler>, ManifestStore) {
    let config = Arc::new(Config::default());
    let blobs = Arc::new(MemBlobHandler::new());
    let dyn_blobs: Arc<dyn BlobHandler> = blobs.clone();
    let fetcher = UpstreamFetcher::new(&config).unwrap();
    (blobs, ManifestStore::new(dyn_blobs, fetcher, config))
}

fn record(refs: Vec<Digest>, age_secs: i64) -> ManifestRecord {
    ManifestRecord {
        content_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
        bytes: Bytes::from_static(b"{\"schemaVersion\":2}"),
        refs,
        created_at: Utc::now() - chrono::Duration::seconds(age_secs),
    }
}

async fn put_blob(blobs: &MemBlobHandler, data: &'static [u8]) -> Digest {
    let digest = Digest::of_bytes(data);
    blobs
        .put_handler()
        .unwrap()
        .put(REPO, &digest, Bytes::from_static(data))
        .await
        .unwrap();
    digest
}

#[tokio::test]
async fn eviction_removes_expired_records_and_their_blobs() {
    let (blobs, store) = new_store();
    let config_digest = put_blob(&blobs, b"{}").await;
    let layer_digest = put_blob(&blobs, b"layer-bytes").await;

    // default TTL is 60s, so an hour-old record is long expired
    store
        .insert_record(REPO, "1.0.0", record(vec![config_digest.clone(), layer_digest.clone()], 3600))
        .await;

    store.evict_expired().await;

    assert!(store.get_record(REPO, "1.0.0").await.is_none());
    assert!(matches!(
        blobs.get(REPO, &config_digest).await,
        Err(BlobError::NotFound)
    ));
    assert!(matches!(
        blobs.get(REPO, &layer_digest).await,
        Err(BlobError::NotFound)
    ));
}

#[tokio::test]
async fn fresh_records_survive_eviction() {
    let (blobs, store) = new_store();
    let layer_digest = put_blob(&blobs, b"fresh-layer").await;

    store
        .insert_record(REPO, "2.0.0", record(vec![layer_digest.clone()], 0))
        .await;

    store.evict_expired().await;

    let kept = store.get_record(REPO, "2.0.0").await.expect("record kept");
    for digest in &kept.refs {
        assert!(blobs.get(REPO, digest).await.is_ok(), "referenced blob resident");
    }
}

#[tokio::test]
async fn tag_and_digest_aliases_are_both_evicted() {
    let (blobs, store) = new_store();
    let layer_digest = put_blob(&blobs, b"aliased-layer").await;

    let rec = record(vec![layer_digest.clone()], 3600);
    let manifest_digest = Digest::of_bytes(&rec.bytes);
    store.insert_record(REPO, "3.0.0", rec.clone()).await;
    store
        .insert_record(REPO, manifest_digest.as_str(), rec)
        .await;

    store.evict_expired().await;

    assert!(store.get_record(REPO, "3.0.0").await.is_none());
    assert!(store
        .get_record(REPO, manifest_digest.as_str())
        .await
        .is_none());
    // the second delete of the shared ref is a tolerated no-op
    assert!(matches!(
        blobs.get(REPO, &layer_digest).await,
        Err(BlobError::NotFound)
    ));
}

#[tokio::test]
async fn missing_blobs_do_not_abort_eviction() {
    let (blobs, store) = new_store();
    let never_written = Digest::of_bytes(b"never-written");
    let present = put_blob(&blobs, b"present").await;

    store
        .insert_record(REPO, "4.0.0", record(vec![never_written, present.clone()], 3600))
        .await;

    store.evict_expired().await;

    assert!(store.get_record(REPO, "4.0.0").await.is_none());
    assert!(matches!(
        blobs.get(REPO, &present).await,
        Err(BlobError::NotFound)
    ));
}

//! Packing a chart tarball into an OCI image manifest.
//!
//! The manifest JSON is the identity of the artifact: it must come out
//! byte-identical for identical inputs, so the structs below serialise with a
//! fixed field order and annotation maps are `BTreeMap`s (sorted keys).

use crate::chart::index::ChartMetadata;
use crate::digest::Digest;
use crate::error::Result;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.cncf.helm.config.v1+json";
pub const CHART_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
pub const IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

pub const ANNOTATION_CREATED: &str = "org.opencontainers.image.created";
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";
pub const ANNOTATION_VERSION: &str = "org.opencontainers.image.version";
pub const ANNOTATION_DESCRIPTION: &str = "org.opencontainers.image.description";
pub const ANNOTATION_URL: &str = "org.opencontainers.image.url";
pub const ANNOTATION_SOURCE: &str = "org.opencontainers.image.source";
pub const ANNOTATION_AUTHORS: &str = "org.opencontainers.image.authors";

/// Media types this registry recognises as manifests rather than blobs.
pub const MANIFEST_MEDIA_TYPES: [&str; 5] = [
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
    IMAGE_MANIFEST_MEDIA_TYPE,
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.oci.artifact.manifest.v1+json",
];

pub fn is_manifest_media_type(media_type: &str) -> bool {
    MANIFEST_MEDIA_TYPES.contains(&media_type)
}

#[derive(Debug, Clone, Serialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Everything `prepare` needs to populate the stores for one chart version.
#[derive(Debug)]
pub struct PackedChart {
    pub manifest: Bytes,
    pub digest: Digest,
    pub content_type: &'static str,
    pub config: Bytes,
    pub config_digest: Digest,
    pub layer_digest: Digest,
}

/// Build the OCI artifact for a chart tarball.
///
/// The config blob is the JSON chart metadata (`{}` when extraction failed
/// upstream); the single layer is the tarball itself, titled with the file
/// name of the download URL.
pub fn pack_chart(
    metadata: Option<&ChartMetadata>,
    tarball: &[u8],
    download_url: &str,
    created: DateTime<Utc>,
) -> Result<PackedChart> {
    let config_data = match metadata {
        Some(meta) => serde_json::to_vec(meta)?,
        None => b"{}".to_vec(),
    };
    let config_digest = Digest::of_bytes(&config_data);
    let config = Descriptor {
        media_type: CONFIG_MEDIA_TYPE.to_string(),
        digest: config_digest.clone(),
        size: config_data.len() as u64,
        annotations: BTreeMap::new(),
    };

    let layer_digest = Digest::of_bytes(tarball);
    let mut layer_annotations = BTreeMap::new();
    layer_annotations.insert(ANNOTATION_TITLE.to_string(), file_name(download_url));
    let layer = Descriptor {
        media_type: CHART_LAYER_MEDIA_TYPE.to_string(),
        digest: layer_digest.clone(),
        size: tarball.len() as u64,
        annotations: layer_annotations,
    };

    let annotations = match metadata {
        Some(meta) => oci_annotations(meta, created),
        None => {
            let mut map = BTreeMap::new();
            map.insert(ANNOTATION_CREATED.to_string(), format_created(created));
            map
        }
    };

    let manifest = ImageManifest {
        schema_version: 2,
        media_type: IMAGE_MANIFEST_MEDIA_TYPE.to_string(),
        config,
        layers: vec![layer],
        annotations,
    };
    let manifest_bytes = serde_json::to_vec(&manifest)?;
    let digest = Digest::of_bytes(&manifest_bytes);

    Ok(PackedChart {
        manifest: Bytes::from(manifest_bytes),
        digest,
        content_type: IMAGE_MANIFEST_MEDIA_TYPE,
        config: Bytes::from(config_data),
        config_digest,
        layer_digest,
    })
}

/// Manifest-level annotations derived from the chart metadata. Custom chart
/// annotations are carried over except title and version, which always come
/// from the metadata proper.
pub fn oci_annotations(meta: &ChartMetadata, created: DateTime<Utc>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert(ANNOTATION_CREATED.to_string(), format_created(created));
    if !meta.name.is_empty() {
        out.insert(ANNOTATION_TITLE.to_string(), meta.name.clone());
    }
    if !meta.version.is_empty() {
        out.insert(ANNOTATION_VERSION.to_string(), meta.version.clone());
    }
    if !meta.description.is_empty() {
        out.insert(ANNOTATION_DESCRIPTION.to_string(), meta.description.clone());
    }
    if !meta.home.is_empty() {
        out.insert(ANNOTATION_URL.to_string(), meta.home.clone());
    }
    if let Some(source) = meta.sources.first() {
        out.insert(ANNOTATION_SOURCE.to_string(), source.clone());
    }
    if !meta.maintainers.is_empty() {
        let authors = meta
            .maintainers
            .iter()
            .map(|m| {
                if m.email.is_empty() {
                    m.name.clone()
                } else {
                    format!("{} ({})", m.name, m.email)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        out.insert(ANNOTATION_AUTHORS.to_string(), authors);
    }
    for (key, value) in &meta.annotations {
        if key != ANNOTATION_TITLE && key != ANNOTATION_VERSION {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

fn format_created(created: DateTime<Utc>) -> String {
    created.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn file_name(download_url: &str) -> String {
    download_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(download_url)
        .to_string()
}

//! Reproducibility and annotation tests for the OCI packer.

mod common;

use chart_proxy::chart::pack::{
    oci_annotations, pack_chart, ANNOTATION_TITLE, ANNOTATION_VERSION,
};
use chart_proxy::chart::{deterministic_created, extract_chart_metadata, ChartMetadata};
use chart_proxy::Digest;
use chrono::{TimeZone, Utc};

const CHART_YAML: &str = r#"apiVersion: v2
name: mychart
version: 1.2.3
description: A test chart
home: https://example.com
sources:
  - https://github.com/example/mychart
maintainers:
  - name: Jane
    email: jane@example.com
  - name: Joe
annotations:
  artifacthub.io/license: Apache-2.0
  org.opencontainers.image.title: should-not-win
"#;

const DOWNLOAD_URL: &str = "https://charts.example.com/charts/mychart-1.2.3.tgz";

fn test_chart() -> (Vec<u8>, ChartMetadata) {
    let tgz = common::build_chart_tgz(CHART_YAML, "mychart", &[("values.yaml", "a: 1\n")]);
    let meta = extract_chart_metadata(&tgz).unwrap();
    (tgz, meta)
}

#[test]
fn identical_inputs_produce_identical_manifests() {
    let (tgz, meta) = test_chart();
    let created = deterministic_created(&meta.name, &meta.version, None);

    let first = pack_chart(Some(&meta), &tgz, DOWNLOAD_URL, created).unwrap();
    let second = pack_chart(Some(&meta), &tgz, DOWNLOAD_URL, created).unwrap();

    assert_eq!(first.manifest, second.manifest);
    assert_eq!(first.digest, second.digest);
    assert_eq!(first.digest, Digest::of_bytes(&first.manifest));
}

#[test]
fn manifest_structure_references_config_and_layer() {
    let (tgz, meta) = test_chart();
    let created = Utc.with_ymd_and_hms(2023, 12, 11, 14, 37, 55).unwrap();
    let packed = pack_chart(Some(&meta), &tgz, DOWNLOAD_URL, created).unwrap();

    let manifest: serde_json::Value = serde_json::from_slice(&packed.manifest).unwrap();
    assert_eq!(manifest["schemaVersion"], 2);
    assert_eq!(
        manifest["mediaType"],
        "application/vnd.oci.image.manifest.v1+json"
    );
    assert_eq!(
        manifest["config"]["mediaType"],
        "application/vnd.cncf.helm.config.v1+json"
    );
    assert_eq!(
        manifest["config"]["digest"],
        packed.config_digest.as_str()
    );
    assert_eq!(packed.config_digest, Digest::of_bytes(&packed.config));

    let layer = &manifest["layers"][0];
    assert_eq!(
        layer["mediaType"],
        "application/vnd.cncf.helm.chart.content.v1.tar+gzip"
    );
    assert_eq!(layer["digest"], Digest::of_bytes(&tgz).as_str());
    assert_eq!(layer["size"], tgz.len() as u64);
    assert_eq!(
        layer["annotations"]["org.opencontainers.image.title"],
        "mychart-1.2.3.tgz"
    );

    let annotations = &manifest["annotations"];
    assert_eq!(annotations["org.opencontainers.image.title"], "mychart");
    assert_eq!(annotations["org.opencontainers.image.version"], "1.2.3");
    assert_eq!(
        annotations["org.opencontainers.image.created"],
        "2023-12-11T14:37:55Z"
    );
    assert_eq!(
        annotations["org.opencontainers.image.description"],
        "A test chart"
    );
    assert_eq!(
        annotations["org.opencontainers.image.url"],
        "https://example.com"
    );
    assert_eq!(
        annotations["org.opencontainers.image.source"],
        "https://github.com/example/mychart"
    );
    assert_eq!(
        annotations["org.opencontainers.image.authors"],
        "Jane (jane@example.com), Joe"
    );
}

#[test]
fn custom_annotations_cannot_override_title_or_version() {
    let (_, meta) = test_chart();
    let created = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let annotations = oci_annotations(&meta, created);

    // Chart.yaml tried to smuggle in its own title
    assert_eq!(annotations[ANNOTATION_TITLE], "mychart");
    assert_eq!(annotations[ANNOTATION_VERSION], "1.2.3");
    assert_eq!(
        annotations["artifacthub.io/license"].as_str(),
        "Apache-2.0"
    );
}

#[test]
fn missing_metadata_packs_empty_config() {
    let tgz = common::build_chart_tgz("apiVersion: v2\nname: x\nversion: 0.1.0\n", "x", &[]);
    let created = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let packed = pack_chart(None, &tgz, DOWNLOAD_URL, created).unwrap();

    assert_eq!(packed.config.as_ref(), b"{}");
    let manifest: serde_json::Value = serde_json::from_slice(&packed.manifest).unwrap();
    assert_eq!(
        manifest["annotations"]["org.opencontainers.image.created"],
        "2023-01-01T00:00:00Z"
    );
    assert!(manifest["annotations"]
        .get("org.opencontainers.image.title")
        .is_none());
}

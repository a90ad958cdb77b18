//! Helm chart repository model and the chart → OCI conversion pipeline.

pub mod fetch;
pub mod index;
pub mod pack;
pub mod rewrite;

use crate::error::{ProxyError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use flate2::read::GzDecoder;
use sha2::{Digest as _, Sha256};
use std::io::Read;

pub use index::{ChartEntry, ChartMetadata, RepoIndex};

/// Locate `Chart.yaml` inside a gzipped chart archive and return its archive
/// path and raw bytes. Charts place it at `<chart-name>/Chart.yaml`.
pub(crate) fn find_chart_yaml(tarball: &[u8]) -> Result<(String, Vec<u8>)> {
    let gz = GzDecoder::new(tarball);
    let mut archive = tar::Archive::new(gz);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        if path == "Chart.yaml" || path.ends_with("/Chart.yaml") {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            return Ok((path, data));
        }
    }
    Err(ProxyError::Chart(
        "Chart.yaml not found in archive".to_string(),
    ))
}

/// Parse the chart metadata out of a chart archive. Used to populate the OCI
/// config blob and the manifest annotations.
pub fn extract_chart_metadata(tarball: &[u8]) -> Result<ChartMetadata> {
    let (_, data) = find_chart_yaml(tarball)?;
    Ok(serde_yaml::from_slice(&data)?)
}

/// Deterministic creation timestamp for a chart version.
///
/// Two preparation passes over the same upstream entry must produce
/// byte-identical manifests, otherwise watchers such as FluxCD see spurious
/// change events. The index `created` value is used when present; the
/// fallback derives a stable offset from the chart coordinates.
pub fn deterministic_created(
    name: &str,
    version: &str,
    indexed: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    if let Some(created) = indexed {
        if created.timestamp() != 0 {
            return created;
        }
    }
    let seed = Sha256::digest(format!("{name}@{version}").as_bytes());
    let offset = u32::from_be_bytes([seed[0], seed[1], seed[2], seed[3]]);
    base_epoch() + Duration::seconds(i64::from(offset))
}

fn base_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_created_prefers_index_timestamp() {
        let created = Utc.with_ymd_and_hms(2023, 12, 11, 14, 37, 55).unwrap();
        assert_eq!(
            deterministic_created("cert-manager", "v1.13.3", Some(created)),
            created
        );
    }

    #[test]
    fn deterministic_created_fallback_is_pure() {
        let a = deterministic_created("ingress-nginx", "4.11.3", None);
        let b = deterministic_created("ingress-nginx", "4.11.3", None);
        assert_eq!(a, b);
        assert!(a >= base_epoch());
    }

    #[test]
    fn deterministic_created_fallback_separates_charts() {
        let a = deterministic_created("ingress-nginx", "4.11.3", None);
        let b = deterministic_created("ingress-nginx", "4.11.4", None);
        let c = deterministic_created("redis", "4.11.3", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}

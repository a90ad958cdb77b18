use crate::error::{ProxyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use url::Url;

pub const API_VERSION_V1: &str = "v1";

/// Chart metadata as found in `Chart.yaml` and inlined into `index.yaml`
/// entries. Also serves as the OCI config blob payload, so serialization must
/// stay deterministic (fixed field order, sorted annotation keys).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub home: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kube_version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub chart_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Maintainer {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dependency {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub alias: String,
}

/// One chart version entry of an `index.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartEntry {
    #[serde(flatten)]
    pub metadata: ChartMetadata,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub removed: bool,
}

impl ChartEntry {
    fn is_valid(&self) -> bool {
        !self.metadata.name.is_empty() && !self.metadata.version.is_empty()
    }
}

/// Parsed `index.yaml` of a classic chart repository.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoIndex {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,
}

impl RepoIndex {
    /// Parse raw index bytes. Entries with an empty `apiVersion` are coerced
    /// to `v1`; structurally invalid entries are dropped; versions are sorted
    /// descending so an empty reference resolves to the newest release.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(ProxyError::Index("empty index.yaml".to_string()));
        }
        let mut index: RepoIndex = serde_yaml::from_slice(data)?;
        for versions in index.entries.values_mut() {
            for entry in versions.iter_mut() {
                if entry.metadata.api_version.is_empty() {
                    entry.metadata.api_version = API_VERSION_V1.to_string();
                }
            }
            versions.retain(ChartEntry::is_valid);
            versions.sort_by(|a, b| version_ord(&b.metadata.version, &a.metadata.version));
        }
        if index.api_version.is_empty() {
            return Err(ProxyError::Index(
                "no apiVersion specified in index.yaml".to_string(),
            ));
        }
        Ok(index)
    }

    /// Resolve a chart version by reference. The reference arrives without a
    /// `v` prefix (the manifest handler strips it); index entries may carry
    /// one, so both spellings are tried, followed by the `_` → `+` remap used
    /// for build metadata that cannot appear in OCI tags.
    pub fn resolve(&self, chart: &str, reference: &str) -> Option<&ChartEntry> {
        if let Some(entry) = self.lookup(chart, reference) {
            return Some(entry);
        }
        if reference.contains('_') {
            return self.lookup(chart, &reference.replace('_', "+"));
        }
        None
    }

    fn lookup(&self, chart: &str, reference: &str) -> Option<&ChartEntry> {
        let versions = self.entries.get(chart)?;
        if reference.is_empty() {
            return versions.first();
        }
        versions.iter().find(|entry| {
            let version = entry.metadata.version.as_str();
            version == reference
                || (!reference.starts_with('v') && version.strip_prefix('v') == Some(reference))
        })
    }
}

/// Download URL for a resolved entry: absolute URLs pass through, relative
/// ones are joined to the upstream repository path.
pub fn chart_download_url(repo_path: &str, raw: &str) -> String {
    match Url::parse(raw) {
        Ok(_) => raw.to_string(),
        Err(_) => format!("https://{repo_path}/{raw}"),
    }
}

fn version_ord(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn parse_version(v: &str) -> Option<semver::Version> {
    semver::Version::parse(v.trim_start_matches('v')).ok()
}

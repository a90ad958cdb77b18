//! Chart dependency rewriting.
//!
//! Edits `Chart.yaml` inside a gzipped chart archive so that every external
//! dependency repository points back through this proxy, then repacks the
//! archive with all other entries preserved bit-exactly.

use crate::chart::find_chart_yaml;
use crate::config::Config;
use crate::error::Result;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_yaml::Value;
use std::io::Read;
use url::Url;

/// Per-request rewrite decision.
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    /// Query-parameter override layered on the process-wide default.
    pub enabled: bool,
    /// Host rewritten URLs point at; `PROXY_HOST` or the inbound Host header.
    pub proxy_host: String,
}

impl RewriteOptions {
    pub fn resolve(config: &Config, query_override: Option<bool>, request_host: Option<&str>) -> Self {
        let enabled = query_override.unwrap_or(config.rewrite_dependencies);
        let proxy_host = if config.proxy_host.is_empty() {
            request_host.unwrap_or("").to_string()
        } else {
            config.proxy_host.clone()
        };
        RewriteOptions {
            enabled,
            proxy_host,
        }
    }

    pub fn disabled() -> Self {
        RewriteOptions {
            enabled: false,
            proxy_host: String::new(),
        }
    }
}

/// Report of what a rewrite pass did.
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    pub modified: bool,
    pub dependencies: Vec<RewrittenDependency>,
}

#[derive(Debug)]
pub struct RewrittenDependency {
    pub name: String,
    pub original_url: String,
    pub new_url: Option<String>,
    pub skip_reason: Option<String>,
}

/// Rewrite every external dependency repository URL in the chart archive to
/// go through the proxy. Returns the (possibly unchanged) archive bytes and a
/// per-dependency report. When nothing changes the input bytes are returned
/// untouched, which also makes the operation idempotent.
pub fn rewrite_chart_dependencies(
    tarball: &[u8],
    proxy_host: &str,
) -> Result<(Bytes, RewriteOutcome)> {
    let (yaml_path, yaml_data) = find_chart_yaml(tarball)?;
    // Chart.yaml is edited as a generic YAML document so fields this proxy
    // does not model survive the re-marshal.
    let mut doc: Value = serde_yaml::from_slice(&yaml_data)?;
    let mut outcome = RewriteOutcome::default();

    {
        let deps = match doc.get_mut("dependencies").and_then(Value::as_sequence_mut) {
            Some(deps) if !deps.is_empty() => deps,
            _ => return Ok((Bytes::copy_from_slice(tarball), outcome)),
        };

        for dep in deps.iter_mut() {
            let name = dep
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let original = dep
                .get("repository")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if let Some(reason) = skip_reason(&original) {
                outcome.dependencies.push(RewrittenDependency {
                    name,
                    original_url: original,
                    new_url: None,
                    skip_reason: Some(reason.to_string()),
                });
                continue;
            }

            match rewrite_dependency_url(&original, proxy_host) {
                Ok(new_url) => {
                    if let Some(mapping) = dep.as_mapping_mut() {
                        mapping.insert(
                            Value::String("repository".to_string()),
                            Value::String(new_url.clone()),
                        );
                    }
                    outcome.modified = true;
                    outcome.dependencies.push(RewrittenDependency {
                        name,
                        original_url: original,
                        new_url: Some(new_url),
                        skip_reason: None,
                    });
                }
                Err(reason) => {
                    tracing::debug!(
                        dependency = %name,
                        url = %original,
                        reason = %reason,
                        "skipping dependency rewrite"
                    );
                    outcome.dependencies.push(RewrittenDependency {
                        name,
                        original_url: original,
                        new_url: None,
                        skip_reason: Some(reason),
                    });
                }
            }
        }
    }

    if !outcome.modified {
        return Ok((Bytes::copy_from_slice(tarball), outcome));
    }

    let new_yaml = serde_yaml::to_string(&doc)?;
    let rewritten = replace_archive_entry(tarball, &yaml_path, new_yaml.as_bytes())?;
    Ok((rewritten, outcome))
}

/// Why a repository URL is exempt from rewriting, if it is.
pub fn skip_reason(repo_url: &str) -> Option<&'static str> {
    if repo_url.is_empty() {
        return Some("empty URL");
    }
    if repo_url.starts_with('@') || repo_url.starts_with("alias:") {
        return Some("Helm repo alias");
    }
    if repo_url.starts_with("file://") || repo_url.starts_with("file:") {
        return Some("local file reference");
    }
    None
}

/// Transform `https://<host>/<path>` (or http/oci) into
/// `oci://<proxy-host>/<host>/<path>`. An `oci://` URL already pointing at
/// the proxy host is left alone so repeated passes converge.
pub fn rewrite_dependency_url(original: &str, proxy_host: &str) -> std::result::Result<String, String> {
    if original.is_empty() {
        return Err("empty URL".to_string());
    }
    let parsed = Url::parse(original).map_err(|e| format!("failed to parse URL: {e}"))?;

    match parsed.scheme() {
        "http" | "https" | "oci" => {}
        other => return Err(format!("unsupported scheme: {other}")),
    }

    let mut host = parsed
        .host_str()
        .ok_or_else(|| "missing host".to_string())?
        .to_string();
    if let Some(port) = parsed.port() {
        host = format!("{host}:{port}");
    }
    if parsed.scheme() == "oci" && host == proxy_host {
        return Err("already proxied".to_string());
    }

    let path = parsed.path().trim_start_matches('/');
    if path.is_empty() {
        Ok(format!("oci://{proxy_host}/{host}"))
    } else {
        Ok(format!("oci://{proxy_host}/{host}/{path}"))
    }
}

/// Repack the archive, substituting `new_data` for the entry at `target`.
/// Entries are streamed in original order; headers of untouched entries are
/// carried over verbatim.
fn replace_archive_entry(tarball: &[u8], target: &str, new_data: &[u8]) -> Result<Bytes> {
    let gz = GzDecoder::new(tarball);
    let mut archive = tar::Archive::new(gz);

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut header = entry.header().clone();
        if path == target {
            header.set_size(new_data.len() as u64);
            header.set_cksum();
            builder.append(&header, new_data)?;
        } else {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            builder.append(&header, data.as_slice())?;
        }
    }

    let encoder = builder.into_inner()?;
    let compressed = encoder.finish()?;
    Ok(Bytes::from(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reasons() {
        assert_eq!(skip_reason(""), Some("empty URL"));
        assert_eq!(skip_reason("@bitnami"), Some("Helm repo alias"));
        assert_eq!(skip_reason("alias:bitnami"), Some("Helm repo alias"));
        assert_eq!(
            skip_reason("file://./charts/mychart"),
            Some("local file reference")
        );
        assert_eq!(
            skip_reason("file:./charts/mychart"),
            Some("local file reference")
        );
        assert_eq!(skip_reason("https://charts.bitnami.com/bitnami"), None);
        assert_eq!(skip_reason("http://charts.example.com/charts"), None);
        assert_eq!(skip_reason("oci://registry.example.com/charts"), None);
    }

    #[test]
    fn rewrite_url_https_with_path() {
        assert_eq!(
            rewrite_dependency_url(
                "https://charts.bitnami.com/bitnami",
                "chartproxy.example.com"
            )
            .unwrap(),
            "oci://chartproxy.example.com/charts.bitnami.com/bitnami"
        );
    }

    #[test]
    fn rewrite_url_https_without_path() {
        assert_eq!(
            rewrite_dependency_url("https://charts.jetstack.io", "chartproxy.example.com")
                .unwrap(),
            "oci://chartproxy.example.com/charts.jetstack.io"
        );
    }

    #[test]
    fn rewrite_url_http_and_oci() {
        assert_eq!(
            rewrite_dependency_url("http://charts.example.com/repo", "proxy.local").unwrap(),
            "oci://proxy.local/charts.example.com/repo"
        );
        assert_eq!(
            rewrite_dependency_url("oci://registry.example.com/charts/mychart", "proxy.local")
                .unwrap(),
            "oci://proxy.local/registry.example.com/charts/mychart"
        );
    }

    #[test]
    fn rewrite_url_rejects_bad_inputs() {
        assert!(rewrite_dependency_url("", "proxy.local").is_err());
        assert!(rewrite_dependency_url("ftp://charts.example.com", "proxy.local").is_err());
    }

    #[test]
    fn rewrite_url_already_proxied_is_skipped() {
        let err = rewrite_dependency_url("oci://proxy.local/charts.example.com/repo", "proxy.local")
            .unwrap_err();
        assert_eq!(err, "already proxied");
    }
}

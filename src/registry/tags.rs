//! Tag listing with Distribution-spec pagination.

use crate::chart::rewrite::RewriteOptions;
use crate::registry::manifest::ManifestStore;
use crate::registry::RegError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
struct TagList {
    name: String,
    tags: Vec<String>,
}

/// GET `/v2/<repo>/tags/list?n=&last=`
///
/// Tags come from the upstream index when it is available so clients can
/// discover versions that were never materialised here; the local store is
/// only a fallback. Leading `v`s are stripped to match the tags manifests are
/// served under.
pub async fn list_tags(
    store: &ManifestStore,
    repo: &str,
    query: &HashMap<String, String>,
    rewrite: &RewriteOptions,
) -> Result<Response, RegError> {
    let mut entries = store.entries.lock().await;
    if !entries.contains_key(repo) {
        store.prepare_chart(&mut entries, repo, "", rewrite).await?;
    }

    let mut tags: Vec<String> = Vec::new();
    let parts: Vec<&str> = repo.split('/').collect();
    let mut from_index = false;
    if parts.len() >= 2 {
        let path = parts[..parts.len() - 1].join("/");
        let chart = parts[parts.len() - 1];
        if let Ok(index) = store.fetcher.get_index(&path).await {
            from_index = true;
            if let Some(versions) = index.entries.get(chart) {
                tags = versions
                    .iter()
                    .map(|v| v.metadata.version.trim_start_matches('v').to_string())
                    .collect();
            }
        }
    }
    if !from_index {
        if let Some(records) = entries.get(repo) {
            tags = records
                .keys()
                .filter(|name| !name.contains("sha256:"))
                .cloned()
                .collect();
        }
    }
    tags.sort();

    if let Some(last) = query.get("last") {
        if !last.is_empty() {
            tags.retain(|tag| tag.as_str() > last.as_str());
        }
    }
    if let Some(n) = query.get("n") {
        let n: usize = n
            .parse()
            .map_err(|err| RegError::bad_request(format!("parsing n: {err}")))?;
        tags.truncate(n);
    }

    Ok(Json(TagList {
        name: repo.to_string(),
        tags,
    })
    .into_response())
}

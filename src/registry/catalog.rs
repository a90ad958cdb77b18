//! Repository catalog listing.

use crate::registry::manifest::ManifestStore;
use crate::registry::RegError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;

const DEFAULT_CATALOG_LIMIT: usize = 10_000;

#[derive(Serialize)]
struct Catalog {
    repositories: Vec<String>,
}

/// GET `/v2/_catalog` and `/v2/<prefix>/_catalog?n=`
///
/// With an upstream prefix the catalog mirrors that repository's index
/// (`<prefix>/<chart>` per entry); without one it lists the repositories
/// materialised locally.
pub async fn list_catalog(
    store: &ManifestStore,
    prefix: &str,
    query: &HashMap<String, String>,
) -> Result<Response, RegError> {
    let limit = match query.get("n") {
        Some(n) => n
            .parse::<usize>()
            .map_err(|err| RegError::bad_request(format!("parsing n: {err}")))?,
        None => DEFAULT_CATALOG_LIMIT,
    };

    let mut repositories: Vec<String> = if !prefix.is_empty() {
        match store.fetcher.get_index(prefix).await {
            Ok(index) => index
                .entries
                .keys()
                .map(|name| format!("{prefix}/{name}"))
                .collect(),
            Err(_) => Vec::new(),
        }
    } else {
        store.repositories().await
    };

    repositories.sort();
    repositories.truncate(limit);

    Ok(Json(Catalog { repositories }).into_response())
}

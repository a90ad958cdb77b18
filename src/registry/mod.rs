//! OCI Distribution v2 surface: routing rules, wire errors, and the pull
//! handlers.

pub mod blob;
pub mod catalog;
pub mod manifest;
pub mod tags;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Distribution-spec error written as `{"errors":[{code,message}]}`.
#[derive(Debug)]
pub struct RegError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl RegError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        RegError {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            err.to_string(),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT FOUND", message)
    }

    pub fn name_invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "NAME_INVALID", message)
    }

    pub fn blob_unknown() -> Self {
        Self::new(StatusCode::NOT_FOUND, "BLOB_UNKNOWN", "Unknown Blob")
    }

    pub fn method_unknown() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "METHOD_UNKNOWN",
            "We don't understand your method + url",
        )
    }

    pub fn unknown_url(path: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "METHOD_UNKNOWN",
            format!("We don't understand your URL: {path}"),
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

#[derive(Serialize)]
struct WireError {
    code: String,
    message: String,
}

#[derive(Serialize)]
struct WireErrorEnvelope {
    errors: Vec<WireError>,
}

impl IntoResponse for RegError {
    fn into_response(self) -> Response {
        let body = WireErrorEnvelope {
            errors: vec![WireError {
                code: self.code.to_string(),
                message: self.message,
            }],
        };
        (self.status, Json(body)).into_response()
    }
}

/// Split a URL path into segments, dropping the leading empty segment and an
/// optional trailing one.
pub fn path_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.first() == Some(&"") {
        segments.remove(0);
    }
    if segments.last() == Some(&"") {
        segments.pop();
    }
    segments
}

/// Blob URLs are recognised by the trailing path, not the leading one, so
/// arbitrarily deep upstream repository paths stay out of the decision.
pub fn is_blob(segments: &[&str]) -> bool {
    if segments.len() < 3 {
        return false;
    }
    segments[segments.len() - 2] == "blobs"
        || (segments[segments.len() - 3] == "blobs" && segments[segments.len() - 2] == "uploads")
}

pub fn is_manifest(segments: &[&str]) -> bool {
    segments.len() >= 4 && segments[segments.len() - 2] == "manifests"
}

pub fn is_tags(segments: &[&str]) -> bool {
    segments.len() >= 4 && segments[segments.len() - 2] == "tags"
}

pub fn is_catalog(segments: &[&str]) -> bool {
    segments.len() >= 2 && segments[segments.len() - 1] == "_catalog"
}

pub fn is_v2_probe(segments: &[&str]) -> bool {
    segments.last() == Some(&"v2")
}

/// Repository name for a request: the segments between `v2` (exclusive) and
/// the operation token (exclusive), joined in input order. `trailing` is the
/// number of operation segments at the end of the path (`manifests/<ref>` and
/// `blobs/<digest>` have two, `_catalog` has one).
pub fn repository_name(segments: &[&str], trailing: usize) -> String {
    let end = segments.len().saturating_sub(trailing);
    let mut start = 0;
    for i in (0..end).rev() {
        if segments[i] == "v2" {
            start = i + 1;
            break;
        }
    }
    segments[start..end].join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_trailing_segments() {
        assert!(is_blob(&path_segments("/v2/foo/blobs/sha256:abc")));
        assert!(is_blob(&path_segments("/v2/foo/blobs/uploads/123")));
        assert!(!is_blob(&path_segments("/v2/blobs")));

        assert!(is_manifest(&path_segments(
            "/v2/charts.bitnami.com/bitnami/airflow/manifests/2.0.0"
        )));
        assert!(!is_manifest(&path_segments("/v2/manifests/2.0.0")));

        assert!(is_tags(&path_segments("/v2/foo/bar/tags/list")));
        assert!(is_catalog(&path_segments("/v2/_catalog")));
        assert!(is_catalog(&path_segments("/v2/charts.jetstack.io/_catalog")));
        assert!(is_v2_probe(&path_segments("/v2")));
        assert!(is_v2_probe(&path_segments("/v2/")));
    }

    #[test]
    fn repository_name_keeps_segment_order() {
        let segments = path_segments("/v2/charts.bitnami.com/bitnami/airflow/manifests/2.0.0");
        assert_eq!(
            repository_name(&segments, 2),
            "charts.bitnami.com/bitnami/airflow"
        );

        let segments = path_segments("/v2/charts.jetstack.io/cert-manager/blobs/sha256:abc");
        assert_eq!(repository_name(&segments, 2), "charts.jetstack.io/cert-manager");

        let segments = path_segments("/v2/charts.jetstack.io/_catalog");
        assert_eq!(repository_name(&segments, 1), "charts.jetstack.io");

        let segments = path_segments("/v2/_catalog");
        assert_eq!(repository_name(&segments, 1), "");
    }
}

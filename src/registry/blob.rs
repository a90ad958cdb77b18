//! Blob pull handlers.

use crate::blobs::{BlobError, BlobHandler};
use crate::digest::Digest;
use crate::registry::RegError;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;

/// GET / HEAD `/v2/<repo>/blobs/<digest>`
///
/// Uses the backend's stat capability when present so HEAD never reads blob
/// contents. A redirect signal from the backend is relayed to the client with
/// the backend-supplied status code.
pub async fn serve_blob(
    blobs: &dyn BlobHandler,
    repo: &str,
    target: &str,
    include_body: bool,
) -> Result<Response, RegError> {
    let digest = Digest::parse(target).map_err(|_| RegError::name_invalid("invalid digest"))?;

    let size: u64;
    let mut body = Body::empty();

    if let Some(stat) = blobs.stat_handler() {
        match stat.stat(repo, &digest).await {
            Ok(s) => size = s,
            Err(err) => return blob_error_response(err),
        }
        if include_body {
            match blobs.get(repo, &digest).await {
                Ok(data) => body = Body::from(data),
                Err(err) => return blob_error_response(err),
            }
        }
    } else {
        match blobs.get(repo, &digest).await {
            Ok(data) => {
                size = data.len() as u64;
                if include_body {
                    body = Body::from(data);
                }
            }
            Err(err) => return blob_error_response(err),
        }
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, size)
        .header("Docker-Content-Digest", digest.as_str())
        .body(body)
        .map_err(RegError::internal)
}

fn blob_error_response(err: BlobError) -> Result<Response, RegError> {
    match err {
        BlobError::NotFound => Err(RegError::blob_unknown()),
        BlobError::Redirect { location, code } => Response::builder()
            .status(StatusCode::from_u16(code).unwrap_or(StatusCode::TEMPORARY_REDIRECT))
            .header(header::LOCATION, location)
            .body(Body::empty())
            .map_err(RegError::internal),
        other => Err(RegError::internal(other)),
    }
}

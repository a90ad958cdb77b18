//! Read-only OCI Distribution v2 proxy for legacy Helm chart repositories.
//!
//! Clients pull `oci://<proxy>/<upstream-host>/<chart>:<tag>`; the proxy
//! fetches the upstream `index.yaml`, resolves the chart version, downloads
//! the tarball, optionally rewrites embedded dependency URLs, and serves a
//! synthesised OCI image manifest plus blobs. All state is in memory and
//! expires on a TTL.

pub mod blobs;
pub mod cache;
pub mod chart;
pub mod config;
pub mod digest;
pub mod error;
pub mod registry;
pub mod server;
pub mod tls;

pub use config::Config;
pub use digest::Digest;
pub use error::{ProxyError, Result};
pub use server::{build_router, AppState};

use tokio_util::sync::CancellationToken;

/// Start the proxy server with the given configuration.
pub async fn start_server(
    config: Config,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    server::start_server(config, shutdown).await
}

use std::sync::Arc;
use thiserror::Error;

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;

/// Crate-level error. Handler-facing Distribution errors live in
/// `registry::RegError`; this type covers everything behind them.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("config error: {0}")]
    Config(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("chart error: {0}")]
    Chart(String),

    #[error("invalid digest: {0}")]
    Digest(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A failure replayed out of the index cache. Cached outcomes are shared
    /// between requests, so the original error only exists behind an `Arc`.
    #[error("{0}")]
    Shared(Arc<ProxyError>),
}

impl From<Arc<ProxyError>> for ProxyError {
    fn from(err: Arc<ProxyError>) -> Self {
        ProxyError::Shared(err)
    }
}

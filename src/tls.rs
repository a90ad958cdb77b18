use crate::error::{ProxyError, Result};
use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;

/// Load the server certificate and key for HTTPS serving.
pub async fn server_tls_config(cert_file: &str, key_file: &str) -> Result<RustlsConfig> {
    let cert_path = Path::new(cert_file);
    let key_path = Path::new(key_file);
    if !cert_path.exists() {
        return Err(ProxyError::Tls(format!(
            "certificate file not found: {}",
            cert_path.display()
        )));
    }
    if !key_path.exists() {
        return Err(ProxyError::Tls(format!(
            "key file not found: {}",
            key_path.display()
        )));
    }
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| ProxyError::Tls(format!("failed to load TLS config: {e}")))
}

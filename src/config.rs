use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9000;

/// How long a prepared manifest stays visible before the eviction loop
/// removes it, in seconds.
pub const DEFAULT_MANIFEST_CACHE_TTL_SECS: u64 = 60;

/// How long a successfully fetched upstream index is reused, in seconds.
pub const DEFAULT_INDEX_CACHE_TTL_SECS: u64 = 3600 * 4;

/// How long a failed index fetch is remembered, in seconds. Short on purpose:
/// it only exists to absorb client retry storms.
pub const DEFAULT_INDEX_ERROR_CACHE_TTL_SECS: u64 = 30;

const DEFAULT_CERT_FILE: &str = "certs/registry.pem";
const DEFAULT_KEY_FILE: &str = "certs/registry-key.pem";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_cert_file")]
    pub cert_file: String,
    #[serde(default = "default_key_file")]
    pub key_file: String,
    #[serde(default = "default_manifest_cache_ttl")]
    pub manifest_cache_ttl_secs: u64,
    #[serde(default = "default_index_cache_ttl")]
    pub index_cache_ttl_secs: u64,
    #[serde(default = "default_index_error_cache_ttl")]
    pub index_error_cache_ttl_secs: u64,
    /// Process-wide default for dependency rewriting; a `?rewrite=1|0` query
    /// parameter on the manifest request overrides it.
    #[serde(default)]
    pub rewrite_dependencies: bool,
    /// Host clients should be pointed at in rewritten dependency URLs.
    /// Empty means "use the inbound Host header".
    #[serde(default)]
    pub proxy_host: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cert_file() -> String {
    DEFAULT_CERT_FILE.to_string()
}

fn default_key_file() -> String {
    DEFAULT_KEY_FILE.to_string()
}

fn default_manifest_cache_ttl() -> u64 {
    DEFAULT_MANIFEST_CACHE_TTL_SECS
}

fn default_index_cache_ttl() -> u64 {
    DEFAULT_INDEX_CACHE_TTL_SECS
}

fn default_index_error_cache_ttl() -> u64 {
    DEFAULT_INDEX_ERROR_CACHE_TTL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            debug: false,
            use_tls: false,
            cert_file: default_cert_file(),
            key_file: default_key_file(),
            manifest_cache_ttl_secs: default_manifest_cache_ttl(),
            index_cache_ttl_secs: default_index_cache_ttl(),
            index_error_cache_ttl_secs: default_index_error_cache_ttl(),
            rewrite_dependencies: false,
            proxy_host: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from the environment. Missing or unparseable values
    /// fall back to the defaults.
    pub fn from_env() -> Self {
        Config {
            port: env_parse("PORT", default_port()),
            debug: env_bool("DEBUG", false),
            use_tls: env_bool("USE_TLS", false),
            cert_file: env_string("CERT_FILE", DEFAULT_CERT_FILE),
            key_file: env_string("KEY_FILE", DEFAULT_KEY_FILE),
            manifest_cache_ttl_secs: env_parse("MANIFEST_CACHE_TTL", default_manifest_cache_ttl()),
            index_cache_ttl_secs: env_parse("INDEX_CACHE_TTL", default_index_cache_ttl()),
            index_error_cache_ttl_secs: env_parse(
                "INDEX_ERROR_CACHE_TTL",
                default_index_error_cache_ttl(),
            ),
            rewrite_dependencies: env_bool("REWRITE_DEPENDENCIES", false),
            proxy_host: env_string("PROXY_HOST", ""),
        }
    }

    pub fn manifest_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.manifest_cache_ttl_secs)
    }

    pub fn index_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.index_cache_ttl_secs)
    }

    pub fn index_error_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.index_error_cache_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "t" | "T" | "true" | "TRUE" | "True"),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

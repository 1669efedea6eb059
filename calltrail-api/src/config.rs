//! Service Configuration
//!
//! Every setting is read from `CALLTRAIL_*` environment variables with
//! defaults from [`crate::constants`]. Each struct has a `from_env()` and a
//! `from_lookup()` that takes any key lookup, so tests can pass a map
//! instead of mutating the process environment.

use crate::constants::*;
use calltrail_core::OperatorId;
use std::time::Duration;

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ============================================================================
// SERVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// WebSocket broadcast channel capacity
    pub ws_capacity: usize,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            ws_capacity: DEFAULT_WS_CAPACITY,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// `PORT` (set by most hosting platforms) wins over `CALLTRAIL_API_PORT`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT").or_else(|| lookup("CALLTRAIL_API_PORT"));
        Self {
            bind_addr: non_empty(lookup("CALLTRAIL_API_BIND"))
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port: parse_or(port, DEFAULT_PORT),
            ws_capacity: parse_or(lookup("CALLTRAIL_WS_CAPACITY"), DEFAULT_WS_CAPACITY).max(1),
            cors_origins: lookup("CALLTRAIL_CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Operator assigned when no SIP match exists. `None` leaves calls unassigned.
    pub fallback_operator_id: Option<OperatorId>,
    /// Bound on each store or directory call
    pub store_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fallback_operator_id: None,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            fallback_operator_id: lookup("CALLTRAIL_FALLBACK_OPERATOR_ID")
                .and_then(|s| s.trim().parse().ok()),
            store_timeout: Duration::from_secs(parse_or(
                lookup("CALLTRAIL_STORE_TIMEOUT_SECS"),
                DEFAULT_STORE_TIMEOUT_SECS,
            )),
        }
    }
}

// ============================================================================
// RECORDING PIPELINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingConfig {
    pub settle_delay: Duration,
    pub download_timeout: Duration,
    pub upload_timeout: Duration,
    /// Validity of signed download URLs
    pub url_ttl: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            url_ttl: Duration::from_secs(DEFAULT_URL_TTL_SECS),
        }
    }
}

impl RecordingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            settle_delay: Duration::from_millis(parse_or(
                lookup("CALLTRAIL_RECORDING_SETTLE_DELAY_MS"),
                DEFAULT_SETTLE_DELAY_MS,
            )),
            download_timeout: Duration::from_secs(parse_or(
                lookup("CALLTRAIL_RECORDING_DOWNLOAD_TIMEOUT_SECS"),
                DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            )),
            upload_timeout: Duration::from_secs(parse_or(
                lookup("CALLTRAIL_RECORDING_UPLOAD_TIMEOUT_SECS"),
                DEFAULT_UPLOAD_TIMEOUT_SECS,
            )),
            url_ttl: Duration::from_secs(parse_or(
                lookup("CALLTRAIL_RECORDING_URL_TTL_SECS"),
                DEFAULT_URL_TTL_SECS,
            )),
        }
    }
}

// ============================================================================
// RECORDING PROVIDER
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub api_salt: Option<String>,
}

// Credentials stay out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_salt", &self.api_salt.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_PROVIDER_API_URL.to_string(),
            api_key: None,
            api_salt: None,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_url: non_empty(lookup("CALLTRAIL_PROVIDER_API_URL"))
                .unwrap_or_else(|| DEFAULT_PROVIDER_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: non_empty(lookup("CALLTRAIL_PROVIDER_API_KEY")),
            api_salt: non_empty(lookup("CALLTRAIL_PROVIDER_API_SALT")),
        }
    }

    /// Both key and salt are present.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.api_salt.is_some()
    }
}

// ============================================================================
// BROADCAST
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Realtime broadcast service; `None` keeps fan-out local to WebSocket observers
    pub realtime_url: Option<String>,
    pub realtime_token: Option<String>,
    pub rooms: Vec<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for BroadcastConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastConfig")
            .field("realtime_url", &self.realtime_url)
            .field("realtime_token", &self.realtime_token.as_ref().map(|_| "<redacted>"))
            .field("rooms", &self.rooms)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            realtime_url: None,
            realtime_token: None,
            rooms: DEFAULT_BROADCAST_ROOMS.iter().map(|r| r.to_string()).collect(),
            timeout: Duration::from_secs(DEFAULT_BROADCAST_TIMEOUT_SECS),
        }
    }
}

impl BroadcastConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let rooms: Vec<String> = lookup("CALLTRAIL_BROADCAST_ROOMS")
            .map(|s| {
                s.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let defaults = Self::default();

        Self {
            realtime_url: non_empty(lookup("CALLTRAIL_REALTIME_URL"))
                .map(|u| u.trim_end_matches('/').to_string()),
            realtime_token: non_empty(lookup("CALLTRAIL_REALTIME_TOKEN")),
            rooms: if rooms.is_empty() { defaults.rooms } else { rooms },
            timeout: Duration::from_secs(parse_or(
                lookup("CALLTRAIL_BROADCAST_TIMEOUT_SECS"),
                DEFAULT_BROADCAST_TIMEOUT_SECS,
            )),
        }
    }
}

// ============================================================================
// BLOB STORAGE
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct BlobConfig {
    /// Directory recordings are archived into; `None` disables archival
    pub root: Option<String>,
    /// Base URL signed download links point at
    pub public_url: String,
    pub signing_secret: Option<String>,
}

impl std::fmt::Debug for BlobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobConfig")
            .field("root", &self.root)
            .field("public_url", &self.public_url)
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: None,
            public_url: format!("http://localhost:{}/recordings", DEFAULT_PORT),
            signing_secret: None,
        }
    }
}

impl BlobConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            root: non_empty(lookup("CALLTRAIL_BLOB_ROOT")),
            public_url: non_empty(lookup("CALLTRAIL_BLOB_PUBLIC_URL"))
                .unwrap_or_else(|| Self::default().public_url),
            signing_secret: non_empty(lookup("CALLTRAIL_BLOB_SIGNING_SECRET")),
        }
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// Everything the service reads at startup, minus database and telemetry
/// settings which are consumed before the rest of the state is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reconciler: ReconcilerConfig,
    pub recording: RecordingConfig,
    pub provider: ProviderConfig,
    pub broadcast: BroadcastConfig,
    pub blob: BlobConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: ServerConfig::from_lookup(&lookup),
            reconciler: ReconcilerConfig::from_lookup(&lookup),
            recording: RecordingConfig::from_lookup(&lookup),
            provider: ProviderConfig::from_lookup(&lookup),
            broadcast: BroadcastConfig::from_lookup(&lookup),
            blob: BlobConfig::from_lookup(&lookup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let empty = lookup(&[]);
        assert_eq!(ServerConfig::from_lookup(&empty), ServerConfig::default());
        assert_eq!(ReconcilerConfig::from_lookup(&empty), ReconcilerConfig::default());
        assert_eq!(RecordingConfig::from_lookup(&empty), RecordingConfig::default());
        assert_eq!(ProviderConfig::from_lookup(&empty), ProviderConfig::default());
        assert_eq!(BroadcastConfig::from_lookup(&empty), BroadcastConfig::default());
        assert_eq!(BlobConfig::from_lookup(&empty), BlobConfig::default());
        assert_eq!(AppConfig::from_lookup(&empty), AppConfig::default());
    }

    #[test]
    fn test_port_precedence() {
        let both = lookup(&[("PORT", "8080"), ("CALLTRAIL_API_PORT", "9090")]);
        assert_eq!(ServerConfig::from_lookup(both).port, 8080);

        let api_only = lookup(&[("CALLTRAIL_API_PORT", "9090")]);
        assert_eq!(ServerConfig::from_lookup(api_only).socket_addr(), "0.0.0.0:9090");

        let garbage = lookup(&[("PORT", "not-a-port")]);
        assert_eq!(ServerConfig::from_lookup(garbage).port, DEFAULT_PORT);
    }

    #[test]
    fn test_cors_origins_list() {
        let cfg = ServerConfig::from_lookup(lookup(&[(
            "CALLTRAIL_CORS_ORIGINS",
            "https://crm.example.com, ,https://ops.example.com",
        )]));
        assert_eq!(
            cfg.cors_origins,
            vec!["https://crm.example.com", "https://ops.example.com"]
        );
    }

    #[test]
    fn test_fallback_operator_is_optional() {
        let set = lookup(&[("CALLTRAIL_FALLBACK_OPERATOR_ID", "1")]);
        assert_eq!(ReconcilerConfig::from_lookup(set).fallback_operator_id, Some(1));

        let bad = lookup(&[("CALLTRAIL_FALLBACK_OPERATOR_ID", "first")]);
        assert_eq!(ReconcilerConfig::from_lookup(bad).fallback_operator_id, None);
    }

    #[test]
    fn test_recording_timings() {
        let cfg = RecordingConfig::from_lookup(lookup(&[
            ("CALLTRAIL_RECORDING_SETTLE_DELAY_MS", "250"),
            ("CALLTRAIL_RECORDING_DOWNLOAD_TIMEOUT_SECS", "5"),
        ]));
        assert_eq!(cfg.settle_delay, Duration::from_millis(250));
        assert_eq!(cfg.download_timeout, Duration::from_secs(5));
        assert_eq!(cfg.url_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_provider_requires_key_and_salt() {
        let key_only = ProviderConfig::from_lookup(lookup(&[("CALLTRAIL_PROVIDER_API_KEY", "k")]));
        assert!(!key_only.is_configured());

        let both = ProviderConfig::from_lookup(lookup(&[
            ("CALLTRAIL_PROVIDER_API_KEY", "k"),
            ("CALLTRAIL_PROVIDER_API_SALT", "s"),
            ("CALLTRAIL_PROVIDER_API_URL", "https://pbx.example/vpbx/"),
        ]));
        assert!(both.is_configured());
        assert_eq!(both.api_url, "https://pbx.example/vpbx");
        assert!(!format!("{:?}", both).contains("\"k\""));
    }

    #[test]
    fn test_broadcast_rooms_parsing() {
        let cfg = BroadcastConfig::from_lookup(lookup(&[(
            "CALLTRAIL_BROADCAST_ROOMS",
            "operators, supervisors,,",
        )]));
        assert_eq!(cfg.rooms, vec!["operators", "supervisors"]);

        let blank = BroadcastConfig::from_lookup(lookup(&[("CALLTRAIL_BROADCAST_ROOMS", " , ")]));
        assert_eq!(blank.rooms, vec!["operators"]);
    }

    #[test]
    fn test_blob_disabled_without_root() {
        let cfg = BlobConfig::from_lookup(lookup(&[("CALLTRAIL_BLOB_ROOT", "  ")]));
        assert!(cfg.root.is_none());
    }
}

//! Constants for calltrail API
//!
//! Defaults for every environment-driven setting, plus fixed protocol
//! values. Centralizing them keeps config parsing and tests in agreement.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default WebSocket broadcast channel capacity
pub const DEFAULT_WS_CAPACITY: usize = 1000;

/// Default tracing filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "calltrail_api=debug,tower_http=debug,info";

// ============================================================================
// DATABASE
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "calltrail";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_POOL_SIZE: usize = 16;
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// RECONCILER
// ============================================================================

/// Default timeout for a single store or directory call
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// RECORDING PIPELINE
// ============================================================================

/// Default wait between locating a job's call and downloading its audio
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 3000;

/// Default recording download timeout
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Default blob upload timeout
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Default validity of a signed recording download URL (1 hour)
pub const DEFAULT_URL_TTL_SECS: u64 = 3600;

/// Content type recordings are archived with
pub const RECORDING_CONTENT_TYPE: &str = "audio/mpeg";

/// File extension of archived recordings
pub const RECORDING_FILE_EXTENSION: &str = "mp3";

/// Job state that lets the pipeline proceed
pub const COMPLETED_JOB_STATE: &str = "completed";

// ============================================================================
// RECORDING PROVIDER
// ============================================================================

/// Default recording provider API base URL
pub const DEFAULT_PROVIDER_API_URL: &str = "https://app.mango-office.ru/vpbx";

/// Provider endpoint that streams a recording
pub const PROVIDER_RECORDING_PATH: &str = "/queries/recording/post";

/// Action requested from the provider
pub const PROVIDER_RECORDING_ACTION: &str = "play";

/// Redirects followed when downloading a recording
pub const PROVIDER_MAX_REDIRECTS: usize = 5;

// ============================================================================
// BROADCAST
// ============================================================================

/// Default rooms a call event is addressed to
pub const DEFAULT_BROADCAST_ROOMS: &[&str] = &["operators"];

/// Default broadcast timeout per notifier
pub const DEFAULT_BROADCAST_TIMEOUT_SECS: u64 = 5;

/// Path prefix of the realtime broadcast service
pub const REALTIME_BROADCAST_PATH: &str = "/api/v1/broadcast";

// ============================================================================
// WEBHOOK ACKNOWLEDGEMENTS
// ============================================================================

pub const MSG_WEBHOOK_PROCESSED: &str = "Webhook processed";
pub const MSG_RECORDING_LINK_SAVED: &str = "Recording link saved";
pub const MSG_MISSING_FIELDS: &str = "Missing required fields";
pub const MSG_RECORDING_NOT_READY: &str = "Recording not ready yet";
pub const MSG_RECORDING_ARCHIVED: &str = "Recording archived";
pub const MSG_RECORDING_DOWNLOADED: &str = "Recording downloaded, archival skipped";
pub const MSG_RECORDING_NOT_FOUND: &str = "Recording not found for this call";
pub const MSG_RECORDING_FILE_NOT_FOUND: &str = "Recording file not found";

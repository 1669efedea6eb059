//! Blob storage for archived call recordings.
//!
//! Keys are namespaced under [`RECORDING_KEY_PREFIX`]. Two implementations
//! ship here: [`InMemoryBlobStore`] for tests and [`LocalBlobStore`], which
//! writes to a directory and hands out HMAC-signed download URLs for a
//! static file server or reverse proxy to check.

use ::async_trait::async_trait;
use calltrail_core::BlobError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

/// Logical prefix every recording key lives under.
pub const RECORDING_KEY_PREFIX: &str = "callcentre/recordings";

/// Blob store result alias.
pub type BlobResult<T> = Result<T, BlobError>;

/// Namespaced key for a recording file name.
pub fn recording_key(filename: &str) -> String {
    format!("{}/{}", RECORDING_KEY_PREFIX, filename)
}

/// Object storage primitives.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, returning the stored reference.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> BlobResult<String>;

    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Time-limited download URL for `key`.
    async fn signed_get_url(&self, key: &str, ttl: Duration) -> BlobResult<String>;
}

fn validate_key(key: &str) -> BlobResult<()> {
    let invalid = |reason: &str| BlobError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.trim().is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(invalid("key must be a relative path"));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(invalid("key must not contain '.' or '..' segments"));
    }
    Ok(())
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory blob store. Cloning shares the contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, StoredBlob>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<StoredBlob> {
        self.blobs.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> BlobResult<String> {
        validate_key(key)?;
        self.blobs.write().await.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn signed_get_url(&self, key: &str, ttl: Duration) -> BlobResult<String> {
        validate_key(key)?;
        Ok(format!("memory://{}?ttl={}", key, ttl.as_secs()))
    }
}

// ============================================================================
// FILESYSTEM
// ============================================================================

/// Signed URL verification failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Signed URL expired at {expires}")]
    Expired { expires: i64 },

    #[error("Signature is malformed")]
    Malformed,

    #[error("Signature does not match")]
    Mismatch,
}

/// Directory-backed blob store with HMAC-SHA256 signed download URLs.
///
/// A URL has the form `{public_url}/{key}?expires={unix}&signature={hex}`
/// where the signature covers `"{key}\n{expires}"`.
#[derive(Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
    signer: HmacSha256,
}

impl std::fmt::Debug for LocalBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBlobStore")
            .field("root", &self.root)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl LocalBlobStore {
    /// Fails with [`BlobError::NotConfigured`] on an empty signing secret.
    pub fn new(
        root: impl Into<PathBuf>,
        public_url: impl Into<String>,
        signing_secret: &[u8],
    ) -> BlobResult<Self> {
        if signing_secret.is_empty() {
            return Err(BlobError::NotConfigured);
        }
        let signer =
            HmacSha256::new_from_slice(signing_secret).map_err(|_| BlobError::NotConfigured)?;
        Ok(Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> BlobResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.signer.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Signature for `key` valid until `expires` (unix seconds).
    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// Check a signature produced by [`LocalBlobStore::sign`].
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        if now > expires {
            return Err(SignatureError::Expired { expires });
        }
        let provided = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
        self.mac(key, expires)
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> BlobResult<String> {
        let path = self.path_for(key)?;
        let io_err = |e: std::io::Error| BlobError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let size = bytes.len();
        tokio::fs::write(&path, bytes).await.map_err(io_err)?;
        tracing::debug!(key = %key, size, content_type = %content_type, "Blob stored");
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path).await.map_err(|e| BlobError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn signed_get_url(&self, key: &str, ttl: Duration) -> BlobResult<String> {
        validate_key(key)?;
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.public_url,
            key,
            expires,
            self.sign(key, expires)
        ))
    }
}

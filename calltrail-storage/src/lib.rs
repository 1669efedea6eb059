//! calltrail Storage - Store Traits and In-Memory Implementations
//!
//! Defines the persistence seams the reconciler and recording pipeline are
//! written against. The PostgreSQL call store lives in calltrail-api.

pub mod blob;
pub mod call_store;

pub use blob::{
    recording_key, BlobResult, BlobStore, InMemoryBlobStore, LocalBlobStore, SignatureError,
    StoredBlob, RECORDING_KEY_PREFIX,
};
pub use call_store::{CallStore, InMemoryCallStore, StoreResult};

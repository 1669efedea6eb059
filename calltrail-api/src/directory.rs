//! Operator Directory
//!
//! Resolves the callee line of a call to the operator who handled it.
//! Resolution never fails: lookup errors, timeouts and misses all degrade
//! to the configured fallback operator, and then to "no operator".

use calltrail_core::{extract_sip_username, Operator, OperatorId};
use calltrail_storage::CallStore;
use std::sync::Arc;
use std::time::Duration;

/// Read-only view of the operator table.
#[derive(Clone)]
pub struct OperatorDirectory {
    store: Arc<dyn CallStore>,
    fallback_operator_id: Option<OperatorId>,
    timeout: Duration,
}

impl OperatorDirectory {
    pub fn new(
        store: Arc<dyn CallStore>,
        fallback_operator_id: Option<OperatorId>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            fallback_operator_id,
            timeout,
        }
    }

    pub fn fallback_operator_id(&self) -> Option<OperatorId> {
        self.fallback_operator_id
    }

    /// Resolve an address (`sip:user@domain` or a bare extension).
    ///
    /// Exact match on the routing key first, then the fallback operator.
    pub async fn resolve_by_sip(&self, address: &str) -> Option<Operator> {
        let sip = extract_sip_username(address);
        if let Some(operator) = self.exact(sip).await {
            return Some(operator);
        }
        tracing::debug!(sip, "No operator for SIP address, trying fallback");
        self.fallback().await
    }

    /// Like [`resolve_by_sip`](Self::resolve_by_sip), but an absent
    /// address goes straight to the fallback.
    pub async fn resolve(&self, address: Option<&str>) -> Option<Operator> {
        match address.map(str::trim).filter(|a| !a.is_empty()) {
            Some(address) => self.resolve_by_sip(address).await,
            None => self.fallback().await,
        }
    }

    async fn exact(&self, sip: &str) -> Option<Operator> {
        match tokio::time::timeout(self.timeout, self.store.find_operator_by_sip(sip)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::warn!(sip, error = %e, "Operator lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(sip, timeout_ms = self.timeout.as_millis() as u64, "Operator lookup timed out");
                None
            }
        }
    }

    async fn fallback(&self) -> Option<Operator> {
        let id = self.fallback_operator_id?;
        match tokio::time::timeout(self.timeout, self.store.find_operator_by_id(id)).await {
            Ok(Ok(Some(operator))) => Some(operator),
            Ok(Ok(None)) => {
                tracing::warn!(operator_id = id, "Fallback operator does not exist");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(operator_id = id, error = %e, "Fallback operator lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(operator_id = id, "Fallback operator lookup timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calltrail_storage::InMemoryCallStore;

    fn operator(id: OperatorId, sip: &str) -> Operator {
        Operator {
            id,
            name: format!("Operator {}", id),
            sip_address: sip.to_string(),
            city: None,
        }
    }

    fn directory(fallback: Option<OperatorId>) -> OperatorDirectory {
        let store = InMemoryCallStore::with_operators([operator(1, "reception"), operator(7, "alice")]);
        OperatorDirectory::new(Arc::new(store), fallback, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_resolves_sip_uri_username() {
        let found = directory(None).resolve_by_sip("sip:alice@pbx.example").await;
        assert_eq!(found.map(|o| o.id), Some(7));
    }

    #[tokio::test]
    async fn test_bare_extension_used_verbatim() {
        let found = directory(None).resolve_by_sip("alice").await;
        assert_eq!(found.map(|o| o.id), Some(7));
    }

    #[tokio::test]
    async fn test_miss_uses_fallback() {
        let found = directory(Some(1)).resolve_by_sip("sip:bob@pbx.example").await;
        assert_eq!(found.map(|o| o.id), Some(1));
    }

    #[tokio::test]
    async fn test_miss_without_fallback_is_none() {
        assert!(directory(None).resolve_by_sip("1001").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_fallback_operator_is_none() {
        assert!(directory(Some(99)).resolve_by_sip("1001").await.is_none());
    }

    #[tokio::test]
    async fn test_absent_address_goes_to_fallback() {
        assert_eq!(directory(Some(1)).resolve(None).await.map(|o| o.id), Some(1));
        assert_eq!(directory(Some(1)).resolve(Some("  ")).await.map(|o| o.id), Some(1));
        assert!(directory(None).resolve(None).await.is_none());
    }
}

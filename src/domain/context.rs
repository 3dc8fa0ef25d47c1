//! Operation Context
//!
//! Who is asking, and the metadata used to correlate their request in logs.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Context for an operation, used for access checks and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Account the request acts on behalf of (X-Request-User-Id)
    pub actor_id: Uuid,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    pub fn new(actor_id: Uuid) -> Self {
        Self {
            actor_id,
            correlation_id: None,
            client_ip: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let actor = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let context = OperationContext::new(actor).with_correlation_id(correlation_id);

        assert_eq!(context.actor_id, actor);
        assert_eq!(context.correlation_id, Some(correlation_id));
        assert!(context.client_ip.is_none());
    }

    #[test]
    fn test_ensure_correlation_id() {
        let mut context = OperationContext::new(Uuid::new_v4());
        assert!(context.correlation_id.is_none());

        let id = context.ensure_correlation_id();
        assert_eq!(context.correlation_id, Some(id));

        // Calling again should return the same ID
        assert_eq!(context.ensure_correlation_id(), id);
    }
}

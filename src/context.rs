//! Request context threaded through resilience calls.
//!
//! Carries the correlation id of the in-flight invocation so normalized
//! responses and log events can be tagged with it. The context is passed
//! explicitly; nothing here is global.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-invocation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    correlation_id: String,
}

impl RequestContext {
    /// Context with a freshly generated correlation id (UUID v4).
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Context for an inbound request that already carries an id.
    ///
    /// Blank ids are replaced with a generated one.
    pub fn with_correlation_id(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.trim().is_empty() {
            return Self::new();
        }
        Self { correlation_id: id }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// A tracing span tagged with this context's correlation id.
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!("resilience", operation, correlation_id = %self.correlation_id)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

//! Store-backed circuit breaker executor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::circuit_breaker::state::{CircuitBreakerRecord, CircuitState, Transition};
use crate::clock::{duration_millis, duration_secs, Clock, SystemClock};
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::store::{Condition, ConditionalStore, Item, StoreResult};

/// Errors surfaced by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open and no fallback was supplied.
    #[error("circuit breaker is OPEN for service '{service}'")]
    Open { service: String },

    /// The operation exceeded the configured timeout.
    #[error("operation timed out after {}ms for service '{}'", .timeout.as_millis(), .service)]
    Timeout { service: String, timeout: Duration },

    /// The operation (or the fallback) returned an error.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// The wrapped operation error, if this is one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Circuit breaker for one protected service.
///
/// Holds no state in memory: every call loads the service's record, applies
/// the outcome and writes it back, so independent worker processes share
/// one breaker through the store.
pub struct CircuitBreaker<S: ConditionalStore + ?Sized> {
    service_name: String,
    config: CircuitBreakerConfig,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: ConditionalStore + ?Sized> Clone for CircuitBreaker<S> {
    fn clone(&self) -> Self {
        Self {
            service_name: self.service_name.clone(),
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: ConditionalStore + ?Sized> CircuitBreaker<S> {
    pub fn new(service_name: impl Into<String>, config: CircuitBreakerConfig, store: Arc<S>) -> Self {
        Self::with_clock(service_name, config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service_name: impl Into<String>,
        config: CircuitBreakerConfig,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            config,
            store,
            clock,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(operation, None::<fn() -> Fut>).await
    }

    /// Run `operation` through the breaker, calling `fallback` instead while open.
    pub async fn execute_with_fallback<T, E, F, Fut, FB, FutB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FutB,
        FutB: Future<Output = Result<T, E>>,
    {
        self.run(operation, Some(fallback)).await
    }

    async fn run<T, E, F, Fut, FB, FutB>(
        &self,
        operation: F,
        fallback: Option<FB>,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FutB,
        FutB: Future<Output = Result<T, E>>,
    {
        let mut record = self.load_or_default().await;

        if record.state == CircuitState::Open {
            let now = self.clock.now_millis();
            match record.try_half_open(now, duration_millis(self.config.reset_timeout())) {
                Some(transition) => self.log_transition(transition),
                None => {
                    metrics::record_breaker_rejection(&self.service_name);
                    tracing::debug!(service = %self.service_name, "Circuit open, rejecting call");
                    self.save(&mut record).await;
                    return match fallback {
                        Some(fallback) => fallback().await.map_err(BreakerError::Operation),
                        None => Err(BreakerError::Open {
                            service: self.service_name.clone(),
                        }),
                    };
                }
            }
        }

        let limit = self.config.timeout();
        let outcome = timeout(limit, operation()).await;
        let now = self.clock.now_millis();

        let (transition, result) = match outcome {
            Ok(Ok(value)) => (record.record_success(&self.config), Ok(value)),
            Ok(Err(e)) => (
                record.record_failure(now, &self.config),
                Err(BreakerError::Operation(e)),
            ),
            Err(_) => {
                let timeout_ms = duration_millis(limit);
                tracing::warn!(service = %self.service_name, timeout_ms, "Operation timed out");
                (
                    record.record_failure(now, &self.config),
                    Err(BreakerError::Timeout {
                        service: self.service_name.clone(),
                        timeout: limit,
                    }),
                )
            }
        };

        if let Some(transition) = transition {
            self.log_transition(transition);
        }
        self.save(&mut record).await;
        result
    }

    /// Current state, CLOSED if the record is missing or unreadable.
    pub async fn state(&self) -> CircuitState {
        self.load_or_default().await.state
    }

    /// Read the persisted record.
    pub async fn record(&self) -> StoreResult<Option<CircuitBreakerRecord>> {
        match self.store.get(&self.config.table, &self.service_name).await? {
            Some(item) => Ok(Some(item.to_record()?)),
            None => Ok(None),
        }
    }

    /// Force the breaker CLOSED with zeroed counters.
    pub async fn reset(&self) -> StoreResult<()> {
        let mut record = self
            .record()
            .await?
            .unwrap_or_else(|| CircuitBreakerRecord::new(&self.service_name));
        if let Some(transition) = record.reset() {
            self.log_transition(transition);
        }
        self.write(&mut record).await
    }

    /// Load the record, falling back to a fresh CLOSED one on any storage error.
    async fn load_or_default(&self) -> CircuitBreakerRecord {
        match self.record().await {
            Ok(Some(record)) => record,
            Ok(None) => CircuitBreakerRecord::new(&self.service_name),
            Err(e) => {
                tracing::error!(
                    service = %self.service_name,
                    error = %e,
                    "Failed to load circuit breaker state, treating as CLOSED"
                );
                CircuitBreakerRecord::new(&self.service_name)
            }
        }
    }

    async fn save(&self, record: &mut CircuitBreakerRecord) {
        if let Err(e) = self.write(record).await {
            tracing::error!(
                service = %self.service_name,
                error = %e,
                "Failed to persist circuit breaker state"
            );
        }
    }

    async fn write(&self, record: &mut CircuitBreakerRecord) -> StoreResult<()> {
        record.ttl = self
            .clock
            .now_secs()
            .saturating_add(duration_secs(self.config.record_ttl()));
        let item = Item::from_record(&self.service_name, &*record, Some(record.ttl))?;
        self.store
            .put(&self.config.table, item, Condition::Always)
            .await?;
        Ok(())
    }

    fn log_transition(&self, transition: Transition) {
        match transition.to {
            CircuitState::Open => tracing::warn!(
                service = %self.service_name,
                from = %transition.from,
                to = %transition.to,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                service = %self.service_name,
                from = %transition.from,
                to = %transition.to,
                "Circuit breaker state transition"
            ),
        }
        metrics::record_breaker_transition(&self.service_name, transition.from, transition.to);
    }
}

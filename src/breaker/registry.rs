//! Breaker registry, one breaker per downstream service.

use std::sync::Arc;

use dashmap::DashMap;

use crate::breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Lazily creates and hands out the breaker for each service.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    /// Creates an empty registry; new breakers use `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Configuration applied to new breakers.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the breaker for `service`, creating it on first use.
    pub fn get_or_create(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(service) {
            return Arc::clone(breaker.value());
        }
        let entry = self
            .breakers
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(service, self.config.clone())));
        Arc::clone(entry.value())
    }

    /// Returns the breaker for `service` if one exists.
    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(service)
            .map(|breaker| Arc::clone(breaker.value()))
    }

    /// Current state for `service`. Services never called report CLOSED.
    pub fn state(&self, service: &str) -> CircuitState {
        self.get(service)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot for `service`, if its breaker exists.
    pub fn snapshot(&self, service: &str) -> Option<BreakerSnapshot> {
        self.get(service).map(|breaker| breaker.snapshot())
    }

    /// Snapshots of every breaker, sorted by service.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|item| item.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }

    /// Forces the breaker for `service` open.
    pub fn force_open(&self, service: &str) -> BreakerSnapshot {
        let breaker = self.get_or_create(service);
        breaker.force_open();
        breaker.snapshot()
    }

    /// Forces the breaker for `service` closed.
    pub fn force_close(&self, service: &str) -> BreakerSnapshot {
        let breaker = self.get_or_create(service);
        breaker.force_close();
        breaker.snapshot()
    }

    /// Resets the breaker for `service`.
    pub fn reset(&self, service: &str) -> BreakerSnapshot {
        let breaker = self.get_or_create(service);
        breaker.reset();
        breaker.snapshot()
    }

    /// Number of breakers created so far.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true when no breaker has been created.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

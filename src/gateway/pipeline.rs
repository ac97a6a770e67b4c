//! Integration Gateway
//!
//! Wraps every outbound call in the same pipeline:
//!
//! ```text
//! rate limit -> cache read -> breaker gate -> downstream (with timeout)
//!            -> breaker outcome + cache write -> audit event
//! ```
//!
//! Cache failures never fail a call; they are logged and treated as a miss.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::breaker::{BreakerRegistry, ExecuteError};
use crate::cache::{CacheStore, SharedCache, MAX_KEY_LENGTH};
use crate::config::Config;
use crate::error::{CacheError, GatewayError};
use crate::gateway::{AuditEvent, AuditOutcome, AuditSink, DownstreamError, DownstreamInvoker};
use crate::limiter::{RateLimitRule, RateLimiter, RateWindow};

// == Options ==
/// Per-call knobs supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Serve from and store into the cache
    pub cacheable: bool,
    /// TTL for the cached response; None uses the cache default, -1 never expires
    pub ttl_seconds: Option<i64>,
    /// Overrides the gateway's call timeout
    pub timeout: Option<Duration>,
    /// Overrides the service's rate limit
    pub rate_limit: Option<RateLimitRule>,
}

impl InvokeOptions {
    /// Options for a cacheable call with the given TTL.
    pub fn cached(ttl_seconds: i64) -> Self {
        Self {
            cacheable: true,
            ttl_seconds: Some(ttl_seconds),
            ..Self::default()
        }
    }
}

/// Gateway-wide limits.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Rate limit for services without an override
    pub default_limit: RateLimitRule,
    /// Per-service rate limits
    pub service_limits: HashMap<String, RateLimitRule>,
    /// Downstream timeout when the caller gives none
    pub call_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_limit: RateLimitRule::per_seconds(100, 60),
            service_limits: HashMap::new(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewaySettings {
    /// Rate limit applying to `service_id`.
    pub fn limit_for(&self, service_id: &str) -> RateLimitRule {
        self.service_limits
            .get(service_id)
            .copied()
            .unwrap_or(self.default_limit)
    }
}

// == Gateway ==
/// Entry point for every outbound integration call.
pub struct Gateway {
    cache: SharedCache,
    limiter: Arc<RateLimiter>,
    breakers: Arc<BreakerRegistry>,
    invokers: DashMap<String, Arc<dyn DownstreamInvoker>>,
    audit: Arc<dyn AuditSink>,
    settings: GatewaySettings,
}

impl Gateway {
    /// Creates a gateway over explicitly constructed components.
    pub fn new(
        cache: SharedCache,
        limiter: Arc<RateLimiter>,
        breakers: Arc<BreakerRegistry>,
        audit: Arc<dyn AuditSink>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            cache,
            limiter,
            breakers,
            invokers: DashMap::new(),
            audit,
            settings,
        }
    }

    /// Builds all components from configuration.
    pub fn from_config(config: &Config, audit: Arc<dyn AuditSink>) -> Self {
        let cache = Arc::new(RwLock::new(CacheStore::with_policy(
            config.max_entries,
            config.default_ttl,
            config.eviction_policy,
        )));
        let settings = GatewaySettings {
            default_limit: config.default_rate_limit(),
            service_limits: config.service_rate_limits.clone(),
            call_timeout: config.call_timeout(),
        };

        Self::new(
            cache,
            Arc::new(RateLimiter::new()),
            Arc::new(BreakerRegistry::new(config.breaker_config())),
            audit,
            settings,
        )
    }

    /// Registers the invoker for `service_id`, replacing any previous one.
    pub fn register_service(&self, service_id: impl Into<String>, invoker: Arc<dyn DownstreamInvoker>) {
        let service_id = service_id.into();
        debug!("Registered downstream service {}", service_id);
        self.invokers.insert(service_id, invoker);
    }

    /// Whether an invoker is registered for `service_id`.
    pub fn has_service(&self, service_id: &str) -> bool {
        self.invokers.contains_key(service_id)
    }

    /// Registered service ids, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.invokers.iter().map(|item| item.key().clone()).collect();
        services.sort();
        services
    }

    /// Shared response cache.
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Breaker registry.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Gateway-wide limits.
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    // == Rate Limit Administration ==
    /// Live rate-limit windows of `identity`, one per registered service.
    pub fn rate_limit_status(&self, identity: &str) -> Vec<(String, RateWindow)> {
        self.services()
            .into_iter()
            .filter_map(|service| {
                let window = self.limiter.status(&limiter_key(&service, identity))?;
                Some((service, window))
            })
            .collect()
    }

    /// Clears every rate-limit window of `identity`. Returns how many existed.
    pub fn reset_rate_limits(&self, identity: &str) -> usize {
        self.services()
            .iter()
            .filter(|service| self.limiter.reset(&limiter_key(service, identity)))
            .count()
    }

    // == Invoke ==
    /// Calls `operation` on `service_id` on behalf of `identity`.
    ///
    /// Exactly one audit event is recorded per call, whatever the outcome.
    ///
    /// # Arguments
    /// * `service_id` - Registered downstream service
    /// * `operation` - Operation name passed to the invoker
    /// * `payload` - Request body; also part of the cache key
    /// * `identity` - Caller the rate limit applies to
    /// * `options` - Caching, timeout and rate-limit overrides
    pub async fn invoke(
        &self,
        service_id: &str,
        operation: &str,
        payload: &Value,
        identity: &str,
        options: InvokeOptions,
    ) -> Result<Value, GatewayError> {
        let started = Instant::now();
        let result = self
            .dispatch(service_id, operation, payload, identity, &options)
            .await;

        let (outcome, error) = match &result {
            Ok((_, outcome)) => (*outcome, None),
            Err(err) => (outcome_for(err), Some(err.to_string())),
        };
        self.audit.record(AuditEvent {
            service_id: service_id.to_string(),
            operation: operation.to_string(),
            identity: identity.to_string(),
            outcome,
            latency_ms: started.elapsed().as_millis() as u64,
            error,
            timestamp: Utc::now(),
        });

        result.map(|(value, _)| value)
    }

    async fn dispatch(
        &self,
        service_id: &str,
        operation: &str,
        payload: &Value,
        identity: &str,
        options: &InvokeOptions,
    ) -> Result<(Value, AuditOutcome), GatewayError> {
        let invoker = self
            .invokers
            .get(service_id)
            .map(|item| Arc::clone(item.value()))
            .ok_or_else(|| GatewayError::UnknownService(service_id.to_string()))?;

        // Rate limit
        let rule = options
            .rate_limit
            .unwrap_or_else(|| self.settings.limit_for(service_id));
        let decision = self.limiter.allow(
            &limiter_key(service_id, identity),
            rule.max_requests,
            rule.window,
        );
        if !decision.allowed {
            return Err(GatewayError::RateLimitExceeded {
                service: service_id.to_string(),
                identity: identity.to_string(),
                retry_after_secs: decision.retry_after_secs().unwrap_or(1),
            });
        }

        // Cache read
        let cache_key = if options.cacheable {
            match cache_key(service_id, operation, payload) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Call {}.{} is not cacheable: {}", service_id, operation, e);
                    None
                }
            }
        } else {
            None
        };
        if let Some(key) = &cache_key {
            let cached = self.cache.write().await.get(key);
            if let Some(value) = cached {
                match serde_json::from_value::<CachedResponse>(value) {
                    Ok(hit) if hit.answers(service_id, operation, payload) => {
                        debug!("Cache hit for {}.{}", service_id, operation);
                        return Ok((hit.response, AuditOutcome::CacheHit));
                    }
                    _ => warn!("Cache entry {} belongs to another request, ignoring it", key),
                }
            }
        }

        // Breaker-gated downstream call
        let timeout = options.timeout.unwrap_or(self.settings.call_timeout);
        let breaker = self.breakers.get_or_create(service_id);
        let result = breaker
            .execute(|| async {
                match tokio::time::timeout(timeout, invoker.call(service_id, operation, payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(DownstreamError::timed_out(timeout)),
                }
            })
            .await;

        let value = match result {
            Ok(value) => value,
            Err(ExecuteError::Rejected(rejection)) => {
                return Err(GatewayError::CircuitOpen {
                    service: service_id.to_string(),
                    next_probe_at: rejection.next_probe_at,
                });
            }
            Err(ExecuteError::Failed(err)) => {
                warn!("Downstream call {}.{} failed: {}", service_id, operation, err);
                return Err(GatewayError::from_downstream(service_id, operation, err, timeout));
            }
        };

        // Cache write
        if let Some(key) = cache_key {
            let stored = CachedResponse {
                service: service_id.to_string(),
                operation: operation.to_string(),
                payload: payload.clone(),
                response: value.clone(),
            };
            let result = match serde_json::to_value(stored) {
                Ok(stored) => self.cache.write().await.set(key, stored, options.ttl_seconds),
                Err(e) => Err(CacheError::Serialization(e.to_string())),
            };
            if let Err(e) = result {
                warn!("Failed to cache response of {}.{}: {}", service_id, operation, e);
            }
        }

        Ok((value, AuditOutcome::Success))
    }
}

/// Cached downstream response together with the request that produced it.
///
/// Keys are 64-bit digests; a hit is only served when the stored request
/// matches the current one.
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    service: String,
    operation: String,
    payload: Value,
    response: Value,
}

impl CachedResponse {
    fn answers(&self, service_id: &str, operation: &str, payload: &Value) -> bool {
        self.service == service_id && self.operation == operation && self.payload == *payload
    }
}

/// Derives the cache key for a call from service, operation and payload.
///
/// The operation and canonical payload only enter through the digest, so
/// the key length depends on the service name alone. Service names too long
/// to fit are hashed as well.
pub fn cache_key(
    service_id: &str,
    operation: &str,
    payload: &Value,
) -> Result<String, CacheError> {
    let body = serde_json::to_string(payload).map_err(|e| {
        CacheError::Serialization(format!("payload of {}.{}: {}", service_id, operation, e))
    })?;
    let mut hasher = DefaultHasher::new();
    service_id.hash(&mut hasher);
    operation.hash(&mut hasher);
    body.hash(&mut hasher);
    let digest = hasher.finish();

    let key = format!("gw:{}:{:016x}", service_id, digest);
    if key.len() > MAX_KEY_LENGTH {
        return Ok(format!("gw:{:016x}", digest));
    }
    Ok(key)
}

fn limiter_key(service_id: &str, identity: &str) -> String {
    format!("{}:{}", service_id, identity)
}

fn outcome_for(err: &GatewayError) -> AuditOutcome {
    match err {
        GatewayError::RateLimitExceeded { .. } => AuditOutcome::RateLimited,
        GatewayError::CircuitOpen { .. } => AuditOutcome::CircuitOpen,
        GatewayError::Downstream { .. } => AuditOutcome::Failed,
        GatewayError::Timeout { .. } => AuditOutcome::TimedOut,
        GatewayError::UnknownService(_) => AuditOutcome::UnknownService,
    }
}

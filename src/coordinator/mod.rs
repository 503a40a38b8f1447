//! Request coordination: cache lookup, in-flight deduplication and tenant switches.
//!
//! [`RequestCoordinator`] sits between the application's HTTP-calling layer and
//! the transport. For every cacheable request it walks the same path:
//!
//! ```text
//! fetch(tenant, method, path, params, executor)
//!   │
//!   ├─ tenant id empty?              ──► Err(TenantIdMissing)
//!   ├─ CacheKey::derive(..)
//!   ├─ ResponseCache hit?            ──► Ok(value), executor untouched
//!   ├─ in-flight entry for the key?  ──► attach, await the same outcome
//!   └─ otherwise                     ──► new in-flight entry, run executor once
//!                                          on settle: drop the in-flight entry,
//!                                          store Ok values if the tenant stamp
//!                                          is still current
//! ```
//!
//! A single key therefore moves `ABSENT → PENDING → {CACHED | ABSENT}`; a second
//! request for a `PENDING` key never re-enters `PENDING`, it subscribes.
//!
//! ## Tenant switches
//!
//! [`RequestCoordinator::on_tenant_change`] is the only operation that clears
//! the cache. Under the coordinator lock it starts a new tenant epoch, empties
//! the response cache and forgets every in-flight entry. Requests already on
//! the wire keep running; when they settle their `(tenant, epoch)` stamp no
//! longer matches and the result is handed to the waiting callers but never
//! written back.
//!
//! ## Locking
//!
//! The tenant context and the in-flight map share one [`parking_lot::Mutex`];
//! the response cache has its own. The coordinator lock is always taken first
//! and neither lock is held across an `.await`.
//!
//! ## Panicking executors
//!
//! A panic inside an executor releases its key before unwinding into the
//! callers, so the next `fetch` for that key starts a fresh request.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ResponseCache};
use crate::client::TransportError;
use crate::config::{CacheConfig, ConfigError};
use crate::http::Method;
use crate::key::{CacheKey, QueryParams};

pub mod tenant;

pub use tenant::{TenantContext, TenantTransition};

/// Errors surfaced by [`RequestCoordinator::fetch`].
///
/// Cloneable so that every subscriber of one in-flight request receives the
/// very same failure.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("no tenant id supplied; refusing to cache under a shared key")]
    TenantIdMissing,

    #[error("transport failure: {0}")]
    Transport(#[source] Arc<TransportError>),
}

impl FetchError {
    /// The underlying transport failure, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(err) => Some(err),
            Self::TenantIdMissing => None,
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        Self::Transport(Arc::new(err))
    }
}

type PendingOutcome<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

/// Tenant and epoch a unit of work was issued under.
#[derive(Debug, Clone)]
struct Stamp {
    tenant: String,
    epoch: u64,
}

/// One request currently on the wire, shared by everyone asking for its key.
struct InFlightEntry<V> {
    id: u64,
    stamp: Stamp,
    pending: PendingOutcome<V>,
    subscribers: usize,
}

struct State<V> {
    tenant: TenantContext,
    in_flight: HashMap<CacheKey, InFlightEntry<V>>,
    next_id: u64,
}

struct Inner<V> {
    config: CacheConfig,
    cache: ResponseCache<V>,
    state: Mutex<State<V>>,
}

enum Lookup<V> {
    Hit(V),
    Pending(PendingOutcome<V>),
}

/// Tenant-scoped response cache with request deduplication.
///
/// Cloning is cheap and every clone shares the same cache, in-flight map and
/// tenant context; an application creates one coordinator per session and
/// hands clones to whatever issues requests.
///
/// # Examples
///
/// ```
/// use tenant_cache::{CacheConfig, Method, QueryParams, RequestCoordinator, TransportError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = RequestCoordinator::<String>::new(CacheConfig::default())?;
///     coordinator.switch_tenant(Some("r-1"));
///
///     let params = QueryParams::new().with("status", "pending");
///     let orders = coordinator
///         .fetch("r-1", &Method::Get, "/orders", &params, || async {
///             Ok::<_, TransportError>("[]".to_string())
///         })
///         .await?;
///
///     assert_eq!(orders, "[]");
///     assert_eq!(coordinator.stats().size, 1);
///     Ok(())
/// }
/// ```
pub struct RequestCoordinator<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for RequestCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> RequestCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a coordinator with an empty cache and no current tenant.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`CacheConfig::validate`].
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = ResponseCache::new(config.capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                cache,
                state: Mutex::new(State {
                    tenant: TenantContext::default(),
                    in_flight: HashMap::new(),
                    next_id: 0,
                }),
            }),
        })
    }

    /// Returns the response for a request, from cache, from an identical
    /// request already in flight, or by running `executor` exactly once.
    ///
    /// Requests with unsafe methods (unless enabled in the config) and all
    /// requests while caching is disabled go straight to `executor`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::TenantIdMissing`] — `tenant_id` is empty or blank; `executor` is not run.
    /// - [`FetchError::Transport`] — the executor failed. Every caller sharing
    ///   the in-flight request gets the same error and the key is free to be
    ///   retried immediately.
    pub async fn fetch<F, Fut>(
        &self,
        tenant_id: &str,
        method: &Method,
        path: &str,
        params: &QueryParams,
        executor: F,
    ) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let tenant_id = require_tenant(tenant_id)?;

        if !self.is_cacheable(method) {
            debug!(tenant = tenant_id, %method, path, "bypassing cache");
            return executor().await.map_err(FetchError::from);
        }

        let key = CacheKey::derive(tenant_id, method, path, params);
        let ttl = self.inner.config.ttl_for(path);

        match self.lookup(tenant_id, key, ttl, executor) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Pending(pending) => pending.await,
        }
    }

    /// Drops the cached response for one request of one tenant, e.g. after a
    /// mutation made it stale. Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// [`FetchError::TenantIdMissing`] if `tenant_id` is empty or blank.
    pub fn invalidate(
        &self,
        tenant_id: &str,
        method: &Method,
        path: &str,
        params: &QueryParams,
    ) -> Result<bool, FetchError> {
        let tenant_id = require_tenant(tenant_id)?;
        let key = CacheKey::derive(tenant_id, method, path, params);
        let removed = self.inner.cache.invalidate(&key);
        debug!(%key, removed, "explicit invalidation");
        Ok(removed)
    }

    /// Handles a tenant transition reported by the session layer.
    ///
    /// Must be called exactly once per transition, from the one place that
    /// sets the active tenant. `previous == None` (first selection) and
    /// `previous == next` clear nothing. Any other transition, including
    /// `Some(a) → None` on logout, clears the cache and the in-flight map
    /// before returning.
    pub fn on_tenant_change(&self, previous: Option<&str>, next: Option<&str>) -> TenantTransition {
        let mut state = self.inner.state.lock();
        if previous != state.tenant.current() {
            warn!(
                reported = previous,
                recorded = state.tenant.current(),
                "tenant change reported from a stale previous tenant"
            );
        }
        self.transition(&mut state, previous, next)
    }

    /// Makes `next` the active tenant, using the recorded current tenant as
    /// `previous`.
    pub fn switch_tenant(&self, next: Option<&str>) -> TenantTransition {
        let mut state = self.inner.state.lock();
        let previous = state.tenant.current().map(str::to_owned);
        self.transition(&mut state, previous.as_deref(), next)
    }

    pub fn current_tenant(&self) -> Option<String> {
        self.inner.state.lock().tenant.current().map(str::to_owned)
    }

    /// Cache counters, including how many entries the last tenant switch removed.
    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Number of keys with a request currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn is_cacheable(&self, method: &Method) -> bool {
        let config = &self.inner.config;
        config.enabled && (method.is_safe() || config.cache_unsafe_methods)
    }

    /// Cache check, in-flight check and in-flight registration as one step.
    fn lookup<F, Fut>(&self, tenant_id: &str, key: CacheKey, ttl: Duration, executor: F) -> Lookup<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if let Some(value) = self.inner.cache.get(&key) {
            debug!(%key, "served from cache");
            return Lookup::Hit(value);
        }

        if let Some(entry) = state.in_flight.get_mut(&key) {
            entry.subscribers += 1;
            debug!(%key, subscribers = entry.subscribers, "joined in-flight request");
            return Lookup::Pending(entry.pending.clone());
        }

        let id = state.next_id;
        state.next_id += 1;
        let stamp = Stamp {
            tenant: tenant_id.to_owned(),
            epoch: state.tenant.epoch(),
        };

        let inner = Arc::clone(&self.inner);
        let settle_key = key.clone();
        let settle_stamp = stamp.clone();
        let pending = async move {
            let run = AssertUnwindSafe(async move { executor().await })
                .catch_unwind()
                .await;
            match run {
                Ok(result) => {
                    let outcome = result.map_err(FetchError::from);
                    inner.settle(&settle_key, id, &settle_stamp, ttl, &outcome);
                    outcome
                }
                Err(panic) => {
                    inner.release(&settle_key, id);
                    warn!(key = %settle_key, "executor panicked, key released");
                    std::panic::resume_unwind(panic)
                }
            }
        }
        .boxed()
        .shared();

        debug!(%key, epoch = stamp.epoch, "dispatching request");
        state.in_flight.insert(
            key,
            InFlightEntry {
                id,
                stamp,
                pending: pending.clone(),
                subscribers: 1,
            },
        );
        Lookup::Pending(pending)
    }

    fn transition(
        &self,
        state: &mut State<V>,
        previous: Option<&str>,
        next: Option<&str>,
    ) -> TenantTransition {
        let Some(previous) = previous else {
            state.tenant.select(next);
            debug!(next, "initial tenant selected");
            return TenantTransition::Initial;
        };
        if Some(previous) == next {
            state.tenant.select(next);
            return TenantTransition::Unchanged;
        }

        state.tenant.advance(next);
        let cleared = self.inner.cache.invalidate_all();
        let abandoned = state.in_flight.len();
        for (key, entry) in state.in_flight.drain() {
            debug!(
                %key,
                issued_under = %entry.stamp.tenant,
                subscribers = entry.subscribers,
                "detaching in-flight request"
            );
        }

        info!(
            previous,
            next,
            cleared,
            abandoned,
            epoch = state.tenant.epoch(),
            "tenant switched, response cache cleared"
        );
        TenantTransition::Switched { cleared, abandoned }
    }
}

impl<V: Clone> Inner<V> {
    /// Removes the in-flight record for `key` if it is still the one issued
    /// as `id`, returning its subscriber count.
    ///
    /// A tenant switch may have dropped the record, and a newer request may
    /// have taken the key since.
    fn release_locked(state: &mut State<V>, key: &CacheKey, id: u64) -> Option<usize> {
        let owned = state.in_flight.get(key).is_some_and(|entry| entry.id == id);
        if !owned {
            return None;
        }
        state.in_flight.remove(key).map(|entry| entry.subscribers)
    }

    fn release(&self, key: &CacheKey, id: u64) {
        Self::release_locked(&mut self.state.lock(), key, id);
    }

    /// Runs once per in-flight entry, right after the executor finishes and
    /// before any subscriber sees the outcome.
    fn settle(
        &self,
        key: &CacheKey,
        id: u64,
        stamp: &Stamp,
        ttl: Duration,
        outcome: &Result<V, FetchError>,
    ) {
        let mut state = self.state.lock();
        let subscribers = Self::release_locked(&mut state, key, id).unwrap_or(0);

        match outcome {
            Ok(value) if state.tenant.accepts(&stamp.tenant, stamp.epoch) => {
                self.cache.put(key.clone(), value.clone(), ttl);
                debug!(%key, subscribers, ?ttl, "response cached");
            }
            Ok(_) => {
                debug!(
                    %key,
                    issued_under = %stamp.tenant,
                    issued_epoch = stamp.epoch,
                    current_epoch = state.tenant.epoch(),
                    "tenant changed while in flight, discarding response"
                );
            }
            Err(err) => {
                debug!(%key, subscribers, error = %err, "request failed, key released");
            }
        }
    }
}

fn require_tenant(tenant_id: &str) -> Result<&str, FetchError> {
    if tenant_id.trim().is_empty() {
        warn!("request issued without a tenant id");
        return Err(FetchError::TenantIdMissing);
    }
    Ok(tenant_id)
}

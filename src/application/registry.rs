//! Central registry of named rate limiters.
//!
//! Limiters are created lazily on first lookup and shared by every caller
//! using the same name, so all subscriptions gated by one name draw from the
//! same permit window.

use crate::application::limiter::RateLimiter;
use crate::application::ports::{Clock, Storage};
use crate::domain::config::{ConfigError, RateLimiterConfig};
use std::sync::Arc;
use tracing::debug;

/// Registry managing named rate limiters.
///
/// This type is generic over the storage implementation. In production, use
/// `Arc<ShardedStorage>`.
#[derive(Clone)]
pub struct RateLimiterRegistry<S>
where
    S: Storage<String, Arc<RateLimiter>> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    default_config: RateLimiterConfig,
}

impl<S> RateLimiterRegistry<S>
where
    S: Storage<String, Arc<RateLimiter>> + Clone,
{
    /// Create a new registry with storage, clock, and a default configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if the default configuration is invalid.
    pub fn new(
        storage: S,
        clock: Arc<dyn Clock>,
        default_config: RateLimiterConfig,
    ) -> Result<Self, ConfigError> {
        default_config.validate()?;
        Ok(Self {
            storage,
            clock,
            default_config,
        })
    }

    /// Get or create the limiter named `name` with the default configuration.
    pub fn rate_limiter(&self, name: &str) -> Arc<RateLimiter> {
        self.get_or_create(name, self.default_config.clone())
    }

    /// Get or create the limiter named `name`, using `config` if it is new.
    ///
    /// An existing limiter is returned unchanged.
    ///
    /// # Errors
    /// Returns `ConfigError` if `config` is invalid, even when a limiter with
    /// this name already exists.
    pub fn rate_limiter_with_config(
        &self,
        name: &str,
        config: RateLimiterConfig,
    ) -> Result<Arc<RateLimiter>, ConfigError> {
        config.validate()?;
        Ok(self.get_or_create(name, config))
    }

    fn get_or_create(&self, name: &str, config: RateLimiterConfig) -> Arc<RateLimiter> {
        let clock = Arc::clone(&self.clock);
        self.storage.with_entry_mut(
            name.to_string(),
            || {
                debug!(limiter = name, "creating rate limiter");
                Arc::new(RateLimiter::from_validated(name.to_string(), config, clock))
            },
            |limiter| Arc::clone(limiter),
        )
    }

    /// Look up an existing limiter without creating it.
    pub fn find(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.storage.with_entry(&name.to_string(), Arc::clone)
    }

    /// Remove a limiter from the registry.
    ///
    /// Callers already holding the limiter keep using it; the next lookup
    /// creates a fresh one.
    pub fn remove(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.storage.remove(&name.to_string())
    }

    /// Get the default configuration.
    pub fn default_config(&self) -> &RateLimiterConfig {
        &self.default_config
    }

    /// Get the number of registered limiters.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Remove every limiter.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Iterate over all limiters with a callback.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<RateLimiter>),
    {
        self.storage.for_each(|name, limiter| f(name, limiter));
    }
}

impl<S> std::fmt::Debug for RateLimiterRegistry<S>
where
    S: Storage<String, Arc<RateLimiter>> + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterRegistry")
            .field("limiters", &self.storage.len())
            .field("default_config", &self.default_config)
            .finish()
    }
}

use crate::events::CacheEvent;
use analytica_core::{EventListeners, FnListener};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::CacheEngine`].
pub struct CacheConfig {
    pub(crate) name: String,
    pub(crate) max_size: usize,
    pub(crate) default_ttl: Duration,
    pub(crate) cleanup_interval: Option<Duration>,
    /// Fraction of an entry's TTL after which a `get` schedules its refresh
    /// callback.
    pub(crate) refresh_threshold: f64,
    pub(crate) persist_dir: Option<PathBuf>,
    pub(crate) persistent_namespaces: HashSet<String>,
    pub(crate) listeners: EventListeners<CacheEvent>,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    name: String,
    max_size: usize,
    default_ttl: Duration,
    cleanup_interval: Option<Duration>,
    refresh_threshold: f64,
    persist_dir: Option<PathBuf>,
    persistent_namespaces: HashSet<String>,
    listeners: EventListeners<CacheEvent>,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            max_size: 1000,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Some(Duration::from_secs(60)),
            refresh_threshold: 0.75,
            persist_dir: None,
            persistent_namespaces: HashSet::new(),
            listeners: EventListeners::new(),
        }
    }

    /// Engine-wide entry capacity. Default: 1000.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// TTL applied when a `set` does not specify one. Default: 5 minutes.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Interval of the expiry sweeper; `None` disables it. Default: 60 s.
    pub fn cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Fraction of TTL after which a `get` triggers background refresh.
    /// Clamped to `(0, 1]`. Default: 0.75.
    pub fn refresh_threshold(mut self, threshold: f64) -> Self {
        self.refresh_threshold = threshold.clamp(f64::EPSILON, 1.0);
        self
    }

    /// Directory for persistent entries; `None` disables persistence.
    pub fn persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    /// Marks a namespace persistent; its entries are written durably and
    /// restored by `preload`.
    pub fn persistent_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.persistent_namespaces.insert(namespace.into());
        self
    }

    /// Engine name used in events and logs. Default: `<unnamed>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for evictions (size pressure or expiry).
    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event: &CacheEvent| {
            if let CacheEvent::Evicted { namespace, key, .. } = event {
                f(namespace, key);
            }
        }));
        self
    }

    /// Registers a callback for background refresh failures.
    pub fn on_refresh_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event: &CacheEvent| {
            if let CacheEvent::RefreshFailed { namespace, key, .. } = event {
                f(namespace, key);
            }
        }));
        self
    }

    pub fn build(self) -> CacheConfig {
        CacheConfig {
            name: self.name,
            max_size: self.max_size,
            default_ttl: self.default_ttl,
            cleanup_interval: self.cleanup_interval,
            refresh_threshold: self.refresh_threshold,
            persist_dir: self.persist_dir,
            persistent_namespaces: self.persistent_namespaces,
            listeners: self.listeners,
        }
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

use crate::fingerprint::SemanticFingerprint;
use analytica_core::Result;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Eviction weight of a cache entry. Higher priorities survive size
/// pressure longer; `Critical` entries are never evicted for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    pub fn from_u8(value: u8) -> Priority {
        match value {
            0 => Priority::Low,
            2 => Priority::High,
            3 => Priority::Critical,
            _ => Priority::Medium,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Callback that produces a fresh value during background refresh.
pub type RefreshFn<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

/// One stored value plus its bookkeeping.
///
/// The tag set is frozen at insertion; a successful background refresh
/// replaces the value and creation time but leaves tags untouched.
pub struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) created_at: Instant,
    pub(crate) wall_created: SystemTime,
    pub(crate) ttl: Duration,
    pub(crate) last_access: Instant,
    pub(crate) access_count: u64,
    pub(crate) priority: Priority,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) refresh: Option<RefreshFn<V>>,
    pub(crate) fingerprint: Option<SemanticFingerprint>,
}

impl<V> CacheEntry<V> {
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.created_at)
    }
}

impl<V: fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("ttl", &self.ttl)
            .field("access_count", &self.access_count)
            .field("priority", &self.priority)
            .field("tags", &self.tags)
            .field("has_refresh", &self.refresh.is_some())
            .finish()
    }
}

/// Options for one `set` call.
pub struct SetOptions<V> {
    pub(crate) ttl: Option<Duration>,
    pub(crate) priority: Priority,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) refresh: Option<RefreshFn<V>>,
    pub(crate) fingerprint: Option<SemanticFingerprint>,
}

impl<V> Default for SetOptions<V> {
    fn default() -> Self {
        Self {
            ttl: None,
            priority: Priority::Medium,
            tags: BTreeSet::new(),
            refresh: None,
            fingerprint: None,
        }
    }
}

impl<V> SetOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry lifetime. Default: the engine's configured default TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Eviction priority. Default: `Medium`.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Callback run when a `get` finds the entry past the refresh threshold;
    /// the stale value is returned immediately and replaced in the
    /// background.
    pub fn refresh<F>(mut self, f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<V>> + Send + Sync + 'static,
    {
        self.refresh = Some(Arc::new(f));
        self
    }

    /// Fingerprint for approximate lookup via `find_similar`.
    pub fn fingerprint(mut self, fingerprint: SemanticFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }
}

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, Priority, RefreshFn, SetOptions};
use crate::events::{CacheEvent, EvictionReason};
use crate::fingerprint::SemanticFingerprint;
use crate::persist::{decode, encode, entry_path, now_ms, Envelope};
use crate::stats::{CacheStats, ShardCounters};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A match returned by [`CacheEngine::find_similar`].
#[derive(Debug, Clone)]
pub struct SimilarEntry<V> {
    pub key: String,
    pub value: V,
    pub similarity: f64,
}

/// An entry returned by [`CacheEngine::get_by_tags`].
#[derive(Debug, Clone)]
pub struct TaggedEntry<V> {
    pub namespace: String,
    pub key: String,
    pub value: V,
}

/// Entry table plus the secondary indexes, guarded together so tag and
/// fingerprint indexes never point at absent entries.
struct ShardState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    tag_index: HashMap<String, HashSet<String>>,
    fp_index: HashMap<&'static str, HashSet<String>>,
}

impl<V> ShardState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            tag_index: HashMap::new(),
            fp_index: HashMap::new(),
        }
    }

    fn link(&mut self, key: String, entry: CacheEntry<V>) {
        for tag in &entry.tags {
            self.tag_index.entry(tag.clone()).or_default().insert(key.clone());
        }
        if let Some(fp) = &entry.fingerprint {
            self.fp_index.entry(fp.kind_tag()).or_default().insert(key.clone());
        }
        self.entries.insert(key, entry);
    }

    fn unlink(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        if let Some(fp) = &entry.fingerprint {
            if let Some(keys) = self.fp_index.get_mut(fp.kind_tag()) {
                keys.remove(key);
                if keys.is_empty() {
                    self.fp_index.remove(fp.kind_tag());
                }
            }
        }
        Some(entry)
    }
}

/// One namespace: its entries, indexes and statistics.
struct Shard<V> {
    name: String,
    persistent: AtomicBool,
    state: Mutex<ShardState<V>>,
    counters: ShardCounters,
}

impl<V> Shard<V> {
    fn new(name: &str, persistent: bool) -> Self {
        Self {
            name: name.to_string(),
            persistent: AtomicBool::new(persistent),
            state: Mutex::new(ShardState::new()),
            counters: ShardCounters::default(),
        }
    }

    fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Relaxed)
    }
}

struct EngineInner<V> {
    config: CacheConfig,
    shards: RwLock<HashMap<String, Arc<Shard<V>>>>,
    total_entries: AtomicUsize,
    // Background-refresh single-flight: at most one inflight refresh per
    // (namespace, key).
    inflight: Mutex<HashSet<(String, String)>>,
    sweeper: Mutex<Option<tokio::task::AbortHandle>>,
}

impl<V> Drop for EngineInner<V> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

/// Namespaced, tagged, priority-weighted cache with TTL expiry, background
/// refresh and optional per-namespace persistence.
///
/// Cheap to clone; all clones share the same storage. Operations never
/// propagate internal failures: persistence and refresh problems degrade to
/// misses and are recorded in statistics.
pub struct CacheEngine<V> {
    inner: Arc<EngineInner<V>>,
}

impl<V> Clone for CacheEngine<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> CacheEngine<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                shards: RwLock::new(HashMap::new()),
                total_entries: AtomicUsize::new(0),
                inflight: Mutex::new(HashSet::new()),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Looks up a live value. Expired entries are removed and reported as a
    /// miss; entries past the refresh threshold are returned immediately
    /// while their callback runs in the background.
    pub fn get(&self, namespace: &str, key: &str) -> Option<V> {
        let shard = self.shard(namespace)?;
        let now = Instant::now();

        let mut refresh: Option<RefreshFn<V>> = None;
        let value = {
            let mut state = shard.state.lock().unwrap();
            let status = state.entries.get(key).map(|entry| entry.is_expired(now));
            match status {
                None => {
                    drop(state);
                    shard.counters.bump_miss();
                    self.emit_miss(&shard.name, key);
                    return None;
                }
                Some(true) => {
                    state.unlink(key);
                    drop(state);
                    self.inner.total_entries.fetch_sub(1, Ordering::Relaxed);
                    shard.counters.bump_miss();
                    shard.counters.bump_evictions(1);
                    self.emit_miss(&shard.name, key);
                    self.inner.config.listeners.emit(&CacheEvent::Evicted {
                        engine: self.inner.config.name.clone(),
                        timestamp: Instant::now(),
                        namespace: shard.name.clone(),
                        key: key.to_string(),
                        reason: EvictionReason::Expired,
                    });
                    #[cfg(feature = "metrics")]
                    metrics::counter!("cache_evictions_total", "namespace" => shard.name.clone(), "reason" => "expired").increment(1);
                    self.remove_persisted(&shard, key);
                    return None;
                }
                Some(false) => {}
            }
            let entry = state.entries.get_mut(key)?;
            entry.last_access = now;
            entry.access_count += 1;
            if let Some(callback) = &entry.refresh {
                let threshold = entry.ttl.mul_f64(self.inner.config.refresh_threshold);
                if entry.age(now) >= threshold {
                    refresh = Some(Arc::clone(callback));
                }
            }
            entry.value.clone()
        };

        shard.counters.bump_hit();
        #[cfg(feature = "metrics")]
        metrics::counter!("cache_hits_total", "namespace" => shard.name.clone()).increment(1);
        self.inner.config.listeners.emit(&CacheEvent::Hit {
            engine: self.inner.config.name.clone(),
            timestamp: Instant::now(),
            namespace: shard.name.clone(),
            key: key.to_string(),
        });
        if let Some(callback) = refresh {
            self.schedule_refresh(Arc::clone(&shard), key, callback);
        }
        Some(value)
    }

    /// Inserts a value. When the engine is full, victims are evicted lowest
    /// priority first (ties: oldest last access); if only equal-or-higher
    /// priority victims remain, or the victim would be `Critical`, the set
    /// is rejected silently.
    pub fn set(&self, namespace: &str, key: &str, value: V, opts: SetOptions<V>) {
        let shard = self.shard_or_create(namespace);
        let ttl = opts.ttl.unwrap_or(self.inner.config.default_ttl);
        let now = Instant::now();

        let replacing = shard.state.lock().unwrap().entries.contains_key(key);
        if !replacing {
            while self.inner.total_entries.load(Ordering::Relaxed) >= self.inner.config.max_size {
                if !self.evict_one(opts.priority) {
                    shard
                        .counters
                        .rejected_sets
                        .fetch_add(1, Ordering::Relaxed);
                    self.inner.config.listeners.emit(&CacheEvent::SetRejected {
                        engine: self.inner.config.name.clone(),
                        timestamp: Instant::now(),
                        namespace: shard.name.clone(),
                        key: key.to_string(),
                    });
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        namespace = %shard.name,
                        key,
                        "set rejected: no evictable entry below priority"
                    );
                    return;
                }
            }
        }

        let entry = CacheEntry {
            value,
            created_at: now,
            wall_created: SystemTime::now(),
            ttl,
            last_access: now,
            access_count: 0,
            priority: opts.priority,
            tags: opts.tags,
            refresh: opts.refresh,
            fingerprint: opts.fingerprint,
        };

        let bytes = if shard.is_persistent() {
            self.encode_entry(&shard.name, key, &entry)
        } else {
            None
        };

        {
            let mut state = shard.state.lock().unwrap();
            if state.unlink(key).is_none() {
                self.inner.total_entries.fetch_add(1, Ordering::Relaxed);
            }
            state.link(key.to_string(), entry);
        }
        shard.counters.bump_put();
        #[cfg(feature = "metrics")]
        metrics::counter!("cache_puts_total", "namespace" => shard.name.clone()).increment(1);

        if let (Some(bytes), Some(dir)) = (bytes, self.inner.config.persist_dir.clone()) {
            self.spawn_write(entry_path(&dir, &shard.name, key), bytes);
        }
    }

    /// True when a live (non-expired) entry exists. Does not touch access
    /// statistics.
    pub fn has(&self, namespace: &str, key: &str) -> bool {
        let Some(shard) = self.shard(namespace) else {
            return false;
        };
        let now = Instant::now();
        let state = shard.state.lock().unwrap();
        state.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Removes an entry. Explicit removal is not counted as an eviction.
    pub fn remove(&self, namespace: &str, key: &str) -> bool {
        let Some(shard) = self.shard(namespace) else {
            return false;
        };
        let removed = shard.state.lock().unwrap().unlink(key).is_some();
        if removed {
            self.inner.total_entries.fetch_sub(1, Ordering::Relaxed);
            self.remove_persisted(&shard, key);
        }
        removed
    }

    /// Drops every entry in a namespace; statistics counters survive.
    pub fn clear_namespace(&self, namespace: &str) {
        let Some(shard) = self.shard(namespace) else {
            return;
        };
        self.clear_shard(&shard);
    }

    pub fn clear_all(&self) {
        for shard in self.all_shards() {
            self.clear_shard(&shard);
        }
    }

    /// Live entries carrying any of the given tags, across all namespaces.
    pub fn get_by_tags(&self, tags: &[&str]) -> Vec<TaggedEntry<V>> {
        let now = Instant::now();
        let mut found = Vec::new();
        for shard in self.all_shards() {
            let state = shard.state.lock().unwrap();
            let mut keys: HashSet<&String> = HashSet::new();
            for tag in tags {
                if let Some(tagged) = state.tag_index.get(*tag) {
                    keys.extend(tagged.iter());
                }
            }
            for key in keys {
                if let Some(entry) = state.entries.get(key) {
                    if !entry.is_expired(now) {
                        found.push(TaggedEntry {
                            namespace: shard.name.clone(),
                            key: key.clone(),
                            value: entry.value.clone(),
                        });
                    }
                }
            }
        }
        found
    }

    /// Removes every entry whose tag set intersects `tags` (OR semantics).
    /// Returns the number of removed entries.
    pub fn invalidate_by_tags(&self, tags: &[&str]) -> usize {
        let mut removed = 0;
        for shard in self.all_shards() {
            let victims: Vec<String> = {
                let state = shard.state.lock().unwrap();
                let mut keys: HashSet<String> = HashSet::new();
                for tag in tags {
                    if let Some(tagged) = state.tag_index.get(*tag) {
                        keys.extend(tagged.iter().cloned());
                    }
                }
                keys.into_iter().collect()
            };
            for key in victims {
                if shard.state.lock().unwrap().unlink(&key).is_some() {
                    self.inner.total_entries.fetch_sub(1, Ordering::Relaxed);
                    removed += 1;
                    self.remove_persisted(&shard, &key);
                }
            }
        }
        removed
    }

    /// Entries in a namespace whose fingerprint similarity to `fingerprint`
    /// is at least `threshold`, best match first.
    pub fn find_similar(
        &self,
        namespace: &str,
        fingerprint: &SemanticFingerprint,
        threshold: f64,
    ) -> Vec<SimilarEntry<V>> {
        let Some(shard) = self.shard(namespace) else {
            return Vec::new();
        };
        let now = Instant::now();
        let state = shard.state.lock().unwrap();
        let Some(bucket) = state.fp_index.get(fingerprint.kind_tag()) else {
            return Vec::new();
        };
        let mut matches: Vec<SimilarEntry<V>> = bucket
            .iter()
            .filter_map(|key| {
                let entry = state.entries.get(key)?;
                if entry.is_expired(now) {
                    return None;
                }
                let similarity = entry.fingerprint.as_ref()?.similarity(fingerprint);
                (similarity >= threshold).then(|| SimilarEntry {
                    key: key.clone(),
                    value: entry.value.clone(),
                    similarity,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches
    }

    /// Marks a namespace persistent from now on.
    pub fn mark_persistent(&self, namespace: &str) {
        self.shard_or_create(namespace)
            .persistent
            .store(true, Ordering::Relaxed);
    }

    /// Restores persisted entries from the configured directory.
    ///
    /// Malformed and already-expired files are skipped (expired ones are
    /// deleted); remaining TTL, priority and tags are preserved. Returns the
    /// number of restored entries.
    pub async fn preload(&self) -> usize {
        let Some(dir) = self.inner.config.persist_dir.clone() else {
            return 0;
        };
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(dir = %dir.display(), error = %_err, "cache preload: cannot read directory");
                return 0;
            }
        };

        let mut loaded = 0;
        while let Ok(Some(dirent)) = reader.next_entry().await {
            let path = dirent.path();
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("cache_") || !name.ends_with(".json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(file = %path.display(), error = %_err, "cache preload: unreadable file, skipping");
                    continue;
                }
            };
            let Some(envelope) = decode::<V>(&bytes) else {
                #[cfg(feature = "tracing")]
                tracing::warn!(file = %path.display(), "cache preload: malformed envelope, skipping");
                continue;
            };
            if envelope.namespace.is_empty() || envelope.key.is_empty() {
                continue;
            }
            let now = now_ms();
            if envelope.remaining_ttl(now).is_none() {
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }
            if self.inner.total_entries.load(Ordering::Relaxed) >= self.inner.config.max_size {
                #[cfg(feature = "tracing")]
                tracing::warn!("cache preload: capacity reached, remaining files skipped");
                break;
            }

            let elapsed = envelope.elapsed(now);
            let created_at = Instant::now()
                .checked_sub(elapsed)
                .unwrap_or_else(Instant::now);
            let priority = envelope.priority();
            let entry = CacheEntry {
                value: envelope.data,
                created_at,
                wall_created: UNIX_EPOCH + Duration::from_millis(envelope.timestamp),
                ttl: Duration::from_millis(envelope.ttl),
                last_access: Instant::now(),
                access_count: 0,
                priority,
                tags: envelope.tags.iter().cloned().collect(),
                refresh: None,
                fingerprint: None,
            };

            let shard = self.shard_or_create(&envelope.namespace);
            shard.persistent.store(true, Ordering::Relaxed);
            let mut state = shard.state.lock().unwrap();
            // Never clobber an entry written since startup.
            if !state.entries.contains_key(&envelope.key) {
                state.link(envelope.key.clone(), entry);
                self.inner.total_entries.fetch_add(1, Ordering::Relaxed);
                loaded += 1;
            }
        }
        #[cfg(feature = "tracing")]
        tracing::info!(loaded, "cache preload finished");
        loaded
    }

    /// Statistics for one namespace.
    pub fn stats(&self, namespace: &str) -> Option<CacheStats> {
        let shard = self.shard(namespace)?;
        Some(self.shard_stats(&shard))
    }

    /// Statistics for every namespace.
    pub fn stats_all(&self) -> Vec<CacheStats> {
        self.all_shards()
            .into_iter()
            .map(|shard| self.shard_stats(&shard))
            .collect()
    }

    /// Total live entries across all namespaces.
    pub fn len(&self) -> usize {
        self.inner.total_entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the periodic expiry sweeper if an interval is configured.
    /// No-op outside a tokio runtime or when already running.
    pub fn start_sweeper(&self) {
        let Some(interval) = self.inner.config.cleanup_interval else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let mut guard = self.inner.sweeper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let engine = self.clone();
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.sweep();
            }
        });
        *guard = Some(task.abort_handle());
    }

    /// Removes expired entries once; returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut swept = 0;
        for shard in self.all_shards() {
            let victims: Vec<String> = {
                let state = shard.state.lock().unwrap();
                state
                    .entries
                    .iter()
                    .filter(|(_, entry)| entry.is_expired(now))
                    .map(|(key, _)| key.clone())
                    .collect()
            };
            for key in victims {
                if shard.state.lock().unwrap().unlink(&key).is_some() {
                    self.inner.total_entries.fetch_sub(1, Ordering::Relaxed);
                    shard.counters.bump_evictions(1);
                    swept += 1;
                    self.inner.config.listeners.emit(&CacheEvent::Evicted {
                        engine: self.inner.config.name.clone(),
                        timestamp: Instant::now(),
                        namespace: shard.name.clone(),
                        key: key.clone(),
                        reason: EvictionReason::Expired,
                    });
                    self.remove_persisted(&shard, &key);
                }
            }
        }
        swept
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn shard(&self, namespace: &str) -> Option<Arc<Shard<V>>> {
        self.inner.shards.read().unwrap().get(namespace).cloned()
    }

    fn shard_or_create(&self, namespace: &str) -> Arc<Shard<V>> {
        if let Some(shard) = self.shard(namespace) {
            return shard;
        }
        let mut shards = self.inner.shards.write().unwrap();
        Arc::clone(shards.entry(namespace.to_string()).or_insert_with(|| {
            Arc::new(Shard::new(
                namespace,
                self.inner.config.persistent_namespaces.contains(namespace),
            ))
        }))
    }

    fn all_shards(&self) -> Vec<Arc<Shard<V>>> {
        self.inner.shards.read().unwrap().values().cloned().collect()
    }

    fn clear_shard(&self, shard: &Arc<Shard<V>>) {
        let keys: Vec<String> = {
            let mut state = shard.state.lock().unwrap();
            let keys: Vec<String> = state.entries.keys().cloned().collect();
            state.entries.clear();
            state.tag_index.clear();
            state.fp_index.clear();
            keys
        };
        self.inner
            .total_entries
            .fetch_sub(keys.len(), Ordering::Relaxed);
        for key in keys {
            self.remove_persisted(shard, &key);
        }
    }

    fn shard_stats(&self, shard: &Arc<Shard<V>>) -> CacheStats {
        let mut stats = CacheStats::derive(&shard.name, &shard.counters);
        let state = shard.state.lock().unwrap();
        stats.size = state.entries.len();
        let mut ttl_total = Duration::ZERO;
        for entry in state.entries.values() {
            let ms = entry
                .wall_created
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            stats.oldest_entry_ms = Some(stats.oldest_entry_ms.map_or(ms, |m| m.min(ms)));
            stats.newest_entry_ms = Some(stats.newest_entry_ms.map_or(ms, |m| m.max(ms)));
            stats.priority_counts[entry.priority.as_u8() as usize] += 1;
            ttl_total += entry.ttl;
        }
        if !state.entries.is_empty() {
            stats.average_ttl_ms = (ttl_total.as_millis() / state.entries.len() as u128) as u64;
        }
        stats
    }

    /// Selects and removes the least-valuable entry engine-wide.
    ///
    /// Returns false when nothing may be evicted: either the cache is empty
    /// or the best victim has `Critical` or higher-than-incoming priority.
    fn evict_one(&self, incoming: Priority) -> bool {
        let mut victim: Option<(Arc<Shard<V>>, String, Priority, Instant)> = None;
        for shard in self.all_shards() {
            let state = shard.state.lock().unwrap();
            for (key, entry) in &state.entries {
                let better = match &victim {
                    None => true,
                    Some((_, _, priority, last_access)) => {
                        (entry.priority, entry.last_access) < (*priority, *last_access)
                    }
                };
                if better {
                    victim = Some((
                        Arc::clone(&shard),
                        key.clone(),
                        entry.priority,
                        entry.last_access,
                    ));
                }
            }
        }
        let Some((shard, key, priority, _)) = victim else {
            return false;
        };
        if priority == Priority::Critical || priority > incoming {
            return false;
        }
        if shard.state.lock().unwrap().unlink(&key).is_some() {
            self.inner.total_entries.fetch_sub(1, Ordering::Relaxed);
            shard.counters.bump_evictions(1);
            self.inner.config.listeners.emit(&CacheEvent::Evicted {
                engine: self.inner.config.name.clone(),
                timestamp: Instant::now(),
                namespace: shard.name.clone(),
                key: key.clone(),
                reason: EvictionReason::SizePressure,
            });
            #[cfg(feature = "metrics")]
            metrics::counter!("cache_evictions_total", "namespace" => shard.name.clone(), "reason" => "size").increment(1);
            self.remove_persisted(&shard, &key);
        }
        true
    }

    fn emit_miss(&self, namespace: &str, key: &str) {
        #[cfg(feature = "metrics")]
        metrics::counter!("cache_misses_total", "namespace" => namespace.to_string()).increment(1);
        self.inner.config.listeners.emit(&CacheEvent::Miss {
            engine: self.inner.config.name.clone(),
            timestamp: Instant::now(),
            namespace: namespace.to_string(),
            key: key.to_string(),
        });
    }

    /// Runs the refresh callback at most once per key, replacing the entry
    /// atomically on success. The triggering `get` never waits on this.
    fn schedule_refresh(&self, shard: Arc<Shard<V>>, key: &str, callback: RefreshFn<V>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        {
            let mut inflight = self.inner.inflight.lock().unwrap();
            if !inflight.insert((shard.name.clone(), key.to_string())) {
                return;
            }
        }
        self.inner.config.listeners.emit(&CacheEvent::RefreshStarted {
            engine: self.inner.config.name.clone(),
            timestamp: Instant::now(),
            namespace: shard.name.clone(),
            key: key.to_string(),
        });

        let engine = self.clone();
        let key = key.to_string();
        let _task = handle.spawn(async move {
            match callback().await {
                Ok(value) => {
                    let snapshot = {
                        let mut state = shard.state.lock().unwrap();
                        match state.entries.get_mut(&key) {
                            Some(entry) => {
                                entry.value = value;
                                entry.created_at = Instant::now();
                                entry.wall_created = SystemTime::now();
                                shard.is_persistent().then(|| CacheEntrySnapshot {
                                    wall_created: entry.wall_created,
                                    ttl: entry.ttl,
                                    priority: entry.priority,
                                    tags: entry.tags.iter().cloned().collect(),
                                    value: entry.value.clone(),
                                })
                            }
                            // Entry vanished while refreshing; drop the result.
                            None => None,
                        }
                    };
                    let bytes = snapshot
                        .and_then(|s| engine.encode_snapshot(&shard.name, &key, &s));
                    if let (Some(bytes), Some(dir)) =
                        (bytes, engine.inner.config.persist_dir.clone())
                    {
                        engine.spawn_write(entry_path(&dir, &shard.name, &key), bytes);
                    }
                }
                Err(_err) => {
                    shard
                        .counters
                        .refresh_failures
                        .fetch_add(1, Ordering::Relaxed);
                    engine.inner.config.listeners.emit(&CacheEvent::RefreshFailed {
                        engine: engine.inner.config.name.clone(),
                        timestamp: Instant::now(),
                        namespace: shard.name.clone(),
                        key: key.clone(),
                    });
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        namespace = %shard.name,
                        key = %key,
                        error = %_err,
                        "background refresh failed; stale entry kept"
                    );
                }
            }
            engine
                .inner
                .inflight
                .lock()
                .unwrap()
                .remove(&(shard.name.clone(), key));
        });
    }

    fn encode_entry(&self, namespace: &str, key: &str, entry: &CacheEntry<V>) -> Option<Vec<u8>> {
        if self.inner.config.persist_dir.is_none() {
            return None;
        }
        let timestamp = entry
            .wall_created
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        encode(&Envelope {
            data: &entry.value,
            timestamp,
            ttl: entry.ttl.as_millis() as u64,
            priority: entry.priority.as_u8(),
            tags: entry.tags.iter().cloned().collect(),
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }

    fn encode_snapshot(
        &self,
        namespace: &str,
        key: &str,
        snapshot: &CacheEntrySnapshot<V>,
    ) -> Option<Vec<u8>> {
        if self.inner.config.persist_dir.is_none() {
            return None;
        }
        let timestamp = snapshot
            .wall_created
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        encode(&Envelope {
            data: &snapshot.value,
            timestamp,
            ttl: snapshot.ttl.as_millis() as u64,
            priority: snapshot.priority.as_u8(),
            tags: snapshot.tags.clone(),
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }

    /// Durable writes are best-effort and asynchronous; `set` never waits.
    fn spawn_write(&self, path: PathBuf, bytes: Vec<u8>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let _task = handle.spawn(async move {
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            if let Err(_err) = tokio::fs::write(&path, bytes).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(file = %path.display(), error = %_err, "cache persistence write failed");
            }
        });
    }

    fn remove_persisted(&self, shard: &Arc<Shard<V>>, key: &str) {
        if !shard.is_persistent() {
            return;
        }
        let Some(dir) = self.inner.config.persist_dir.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let path = entry_path(&dir, &shard.name, key);
        let _task = handle.spawn(async move {
            let _ = tokio::fs::remove_file(&path).await;
        });
    }
}

/// Owned copy of the persistence-relevant entry fields, taken under the
/// shard lock so serialization can happen outside it.
struct CacheEntrySnapshot<V> {
    wall_created: SystemTime,
    ttl: Duration,
    priority: Priority,
    tags: Vec<String>,
    value: V,
}

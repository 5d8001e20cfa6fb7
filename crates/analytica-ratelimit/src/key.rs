use std::fmt;
use std::time::Instant;

/// One registered API key.
///
/// The secret itself never appears in `Debug` output or error context.
#[derive(Clone)]
pub struct ApiKey {
    secret: String,
    provider: String,
    usage_count: u64,
    last_used: Option<Instant>,
    cooldown_until: Option<Instant>,
    invalidated: bool,
}

impl ApiKey {
    pub fn new(provider: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            provider: provider.into(),
            usage_count: 0,
            last_used: None,
            cooldown_until: None,
            invalidated: false,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn is_available(&self, now: Instant) -> bool {
        !self.invalidated && self.cooldown_until.map_or(true, |until| until <= now)
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("provider", &self.provider)
            .field("secret", &"<redacted>")
            .field("usage_count", &self.usage_count)
            .field("invalidated", &self.invalidated)
            .field("cooling_down", &self.cooldown_until.is_some())
            .finish()
    }
}

/// Key pool for one provider.
///
/// Selection is round-robin among available keys; because every use stamps
/// `last_used`, picking the available key with the earliest last use walks
/// the pool in rotation and doubles as the tie-break rule.
#[derive(Debug, Default)]
pub struct KeyPool {
    keys: Vec<ApiKey>,
}

impl KeyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds keys to the pool, skipping secrets already registered.
    pub fn merge(&mut self, provider: &str, secrets: impl IntoIterator<Item = String>) {
        for secret in secrets {
            if !self.keys.iter().any(|k| k.secret == secret) {
                self.keys.push(ApiKey::new(provider, secret));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Selects a key and stamps its usage. Returns the secret to call with.
    pub fn checkout(&mut self, now: Instant) -> Option<String> {
        // `None < Some(_)`, so never-used keys sort to the front.
        let idx = self
            .keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_available(now))
            .min_by_key(|(_, k)| k.last_used)?
            .0;
        let key = &mut self.keys[idx];
        key.usage_count += 1;
        key.last_used = Some(now);
        Some(key.secret.clone())
    }

    /// Places a key into cooldown until the given instant.
    pub fn cooldown(&mut self, secret: &str, until: Instant) {
        if let Some(key) = self.keys.iter_mut().find(|k| k.secret == secret) {
            key.cooldown_until = Some(until);
        }
    }

    /// Marks a key permanently unusable (e.g. after an auth failure).
    pub fn invalidate(&mut self, secret: &str) {
        if let Some(key) = self.keys.iter_mut().find(|k| k.secret == secret) {
            key.invalidated = true;
        }
    }

    /// Earliest instant at which a currently-cooling key becomes available.
    ///
    /// `None` when a key is available right now, or when every key has been
    /// invalidated (waiting would never help).
    pub fn next_available_at(&self, now: Instant) -> Option<Instant> {
        if self.keys.iter().any(|k| k.is_available(now)) {
            return None;
        }
        self.keys
            .iter()
            .filter(|k| !k.invalidated)
            .filter_map(|k| k.cooldown_until)
            .min()
    }

    /// True when no key can ever become available again.
    pub fn is_exhausted(&self) -> bool {
        self.keys.iter().all(|k| k.invalidated)
    }

    pub fn cooling_down(&self, now: Instant) -> usize {
        self.keys
            .iter()
            .filter(|k| !k.invalidated && !k.is_available(now))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pool_with(n: usize) -> KeyPool {
        let mut pool = KeyPool::new();
        pool.merge("p", (0..n).map(|i| format!("k{i}")));
        pool
    }

    #[test]
    fn checkout_rotates_through_keys() {
        let mut pool = pool_with(3);
        let t0 = Instant::now();
        let a = pool.checkout(t0).unwrap();
        let b = pool.checkout(t0 + Duration::from_millis(1)).unwrap();
        let c = pool.checkout(t0 + Duration::from_millis(2)).unwrap();
        let d = pool.checkout(t0 + Duration::from_millis(3)).unwrap();
        assert_eq!(vec!["k0", "k1", "k2"], {
            let mut v = vec![a.clone(), b.clone(), c.clone()];
            v.sort();
            v
        });
        // Fourth checkout wraps back to the first key used.
        assert_eq!(d, a);
    }

    #[test]
    fn cooldown_keys_are_skipped() {
        let mut pool = pool_with(2);
        let now = Instant::now();
        pool.cooldown("k0", now + Duration::from_secs(10));
        assert_eq!(pool.checkout(now), Some("k1".into()));
        assert_eq!(pool.checkout(now), Some("k1".into()));
    }

    #[test]
    fn invalidated_keys_never_return() {
        let mut pool = pool_with(2);
        let now = Instant::now();
        pool.invalidate("k0");
        pool.invalidate("k1");
        assert_eq!(pool.checkout(now), None);
        assert!(pool.is_exhausted());
        assert_eq!(pool.next_available_at(now), None);
    }

    #[test]
    fn next_available_tracks_earliest_cooldown() {
        let mut pool = pool_with(2);
        let now = Instant::now();
        pool.cooldown("k0", now + Duration::from_secs(5));
        pool.cooldown("k1", now + Duration::from_secs(2));
        assert_eq!(pool.next_available_at(now), Some(now + Duration::from_secs(2)));
        // A cooldown in the past makes the key available again.
        assert!(pool.checkout(now + Duration::from_secs(3)).is_some());
    }

    #[test]
    fn merge_skips_duplicates() {
        let mut pool = pool_with(2);
        pool.merge("p", vec!["k1".into(), "k2".into()]);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn debug_redacts_secret() {
        let key = ApiKey::new("p", "super-secret-value");
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}

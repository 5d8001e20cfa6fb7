//! Per-entry durable storage.
//!
//! Each persistent entry lives in its own file,
//! `cache_<namespace>_<sha256(key)>.json`, so writes never rewrite a shared
//! index and a corrupt file loses exactly one entry. The envelope carries
//! the namespace and key alongside the required fields because the filename
//! hash is one-way; readers tolerate any additional fields.

use crate::entry::Priority;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Envelope<V> {
    pub data: V,
    /// Entry creation, ms since epoch.
    pub timestamp: u64,
    /// TTL in ms.
    pub ttl: u64,
    /// Priority as 0..3 (`Low` .. `Critical`).
    pub priority: u8,
    pub tags: Vec<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub key: String,
}

impl<V> Envelope<V> {
    pub(crate) fn remaining_ttl(&self, now_ms: u64) -> Option<Duration> {
        let expires = self.timestamp.checked_add(self.ttl)?;
        if now_ms >= expires {
            None
        } else {
            Some(Duration::from_millis(expires - now_ms))
        }
    }

    pub(crate) fn elapsed(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.timestamp))
    }

    pub(crate) fn priority(&self) -> Priority {
        Priority::from_u8(self.priority)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Filesystem-safe path for a `(namespace, key)` address.
pub(crate) fn entry_path(dir: &Path, namespace: &str, key: &str) -> PathBuf {
    let digest = Sha256::digest(key.as_bytes());
    let mut hash = String::with_capacity(32);
    for byte in &digest[..16] {
        hash.push_str(&format!("{byte:02x}"));
    }
    dir.join(format!("cache_{}_{hash}.json", sanitize(namespace)))
}

fn sanitize(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Serializes an envelope; `None` when the value cannot be encoded.
pub(crate) fn encode<V: Serialize>(envelope: &Envelope<V>) -> Option<Vec<u8>> {
    serde_json::to_vec(envelope).ok()
}

/// Parses an envelope; `None` for malformed bytes.
pub(crate) fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Option<Envelope<V>> {
    serde_json::from_slice(bytes).ok()
}

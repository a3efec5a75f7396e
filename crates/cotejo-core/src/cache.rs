//! Result cache capability.
//!
//! The core never needs a cache to be correct. [`CachedReconciler`] wraps a
//! [`Reconciler`] and memoizes its results in any [`ResultCache`], keyed by
//! a SHA-256 fingerprint of the inputs, the configuration and the
//! reference date.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::error::SchemaError;
use crate::models::document::RawDocument;
use crate::models::report::{ComparisonReport, ValidationResult};
use crate::reconciler::Reconciler;

/// Key/value store with per-entry time to live.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String, ttl: Duration);

    fn invalidate(&self, key: &str);
}

/// Default bound on the number of entries.
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// In-process cache with a bounded number of entries.
///
/// Expired entries are dropped on read and swept on every write; when the
/// cache is full, the entry closest to expiry makes room for the new one.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
    max_entries: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries; expired ones count until the next write.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((expires, value)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, (expires, _)| *expires > now);
        if entries.len() < before {
            trace!("Swept {} expired cache entries", before - entries.len());
        }

        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            let soonest = entries
                .iter()
                .min_by_key(|(_, (expires, _))| *expires)
                .map(|(k, _)| k.clone());
            if let Some(evicted) = soonest {
                debug!("Cache full ({} entries), evicting {}", self.max_entries, evicted);
                entries.remove(&evicted);
            }
        }

        entries.insert(key.to_string(), (now + ttl, value));
    }

    fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// `cotejo:<prefix>:<sha256 hex>` over the serialized parts.
pub fn fingerprint<T: Serialize + ?Sized>(prefix: &str, value: &T) -> Option<String> {
    let bytes = serde_json::to_vec(value).ok()?;
    let digest = Sha256::digest(&bytes);
    Some(format!("cotejo:{}:{:x}", prefix, digest))
}

/// A [`Reconciler`] whose results are memoized.
pub struct CachedReconciler<C: ResultCache> {
    inner: Reconciler,
    cache: C,
    ttl: Duration,
    enabled: bool,
}

impl<C: ResultCache> CachedReconciler<C> {
    pub fn new(inner: Reconciler, cache: C) -> Self {
        let settings = &inner.config().cache;
        let ttl = Duration::from_secs(settings.ttl_secs);
        let enabled = settings.enabled;
        Self {
            inner,
            cache,
            ttl,
            enabled,
        }
    }

    pub fn inner(&self) -> &Reconciler {
        &self.inner
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn validate_document(&self, raw: &RawDocument) -> Result<ValidationResult, SchemaError> {
        let key = self.key("validation", &(raw,));
        self.memoize(key, || self.inner.validate_document(raw))
    }

    pub fn compare_documents(
        &self,
        escritura: &RawDocument,
        candidates: &[RawDocument],
    ) -> Result<ComparisonReport, SchemaError> {
        let key = self.key("comparison", &(escritura, candidates));
        self.memoize(key, || self.inner.compare_documents(escritura, candidates))
    }

    fn key<T: Serialize>(&self, prefix: &str, inputs: &T) -> Option<String> {
        if !self.enabled {
            return None;
        }
        fingerprint(
            prefix,
            &(inputs, self.inner.config(), self.inner.reference_date()),
        )
    }

    fn memoize<T, F>(&self, key: Option<String>, compute: F) -> Result<T, SchemaError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, SchemaError>,
    {
        let Some(key) = key else {
            return compute();
        };

        if let Some(hit) = self.cache.get(&key) {
            match serde_json::from_str(&hit) {
                Ok(value) => {
                    debug!("Cache hit {}", key);
                    return Ok(value);
                }
                Err(e) => {
                    debug!("Discarding unreadable cache entry {}: {}", key, e);
                    self.cache.invalidate(&key);
                }
            }
        }

        trace!("Cache miss {}", key);
        let value = compute()?;
        if let Ok(serialized) = serde_json::to_string(&value) {
            self.cache.set(&key, serialized, self.ttl);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::CotejoConfig;
    use crate::models::document::DocumentKind;
    use chrono::NaiveDate;

    fn reconciler(config: CotejoConfig) -> Reconciler {
        Reconciler::new(config).with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn escritura() -> RawDocument {
        RawDocument::new(DocumentKind::Escritura, "esc")
            .with_field("cadastral_reference", "1234567AB1234N")
            .with_field("buyer_id", "12345678Z")
    }

    fn modelo() -> RawDocument {
        RawDocument::new(DocumentKind::Modelo600, "m600")
            .with_field("cadastral_reference", "1234567AB1234N")
            .with_field("taxpayer_id", "12345678Z")
    }

    #[test]
    fn test_memory_cache_ttl() {
        let cache = MemoryCache::new();
        cache.set("a", "1".to_string(), Duration::from_secs(60));
        cache.set("b", "2".to_string(), Duration::ZERO);

        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.len(), 1);

        cache.invalidate("a");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_swept_on_write() {
        let cache = MemoryCache::new();
        for i in 0..100 {
            cache.set(&format!("stale-{}", i), "x".to_string(), Duration::ZERO);
        }
        cache.set("fresh", "1".to_string(), Duration::from_secs(60));

        // No read of the stale keys ever happened
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh").as_deref(), Some("1"));
    }

    #[test]
    fn test_bounded_size_evicts_soonest_expiry() {
        let cache = MemoryCache::with_max_entries(2);
        cache.set("short", "1".to_string(), Duration::from_secs(10));
        cache.set("long", "2".to_string(), Duration::from_secs(600));
        cache.set("new", "3".to_string(), Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long").as_deref(), Some("2"));
        assert_eq!(cache.get("new").as_deref(), Some("3"));

        // Overwriting a key never evicts
        cache.set("long", "4".to_string(), Duration::from_secs(600));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("new").as_deref(), Some("3"));
    }

    #[test]
    fn test_fingerprint_shape() {
        let key = fingerprint("comparison", &("x", 1)).unwrap();
        assert!(key.starts_with("cotejo:comparison:"));
        assert_eq!(key.len(), "cotejo:comparison:".len() + 64);
        assert_eq!(Some(key), fingerprint("comparison", &("x", 1)));
        assert_ne!(fingerprint("comparison", &("x", 1)), fingerprint("comparison", &("y", 1)));
    }

    #[test]
    fn test_cached_result_equals_fresh_result() {
        let cached = CachedReconciler::new(reconciler(CotejoConfig::default()), MemoryCache::new());

        let first = cached.compare_documents(&escritura(), &[modelo()]).unwrap();
        assert_eq!(cached.cache().len(), 1);
        let second = cached.compare_documents(&escritura(), &[modelo()]).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            cached.inner().compare_documents(&escritura(), &[modelo()]).unwrap()
        );
    }

    #[test]
    fn test_config_change_changes_key() {
        let mut other = CotejoConfig::default();
        other.matching.thresholds.text = 0.9;

        let a = fingerprint("x", &(escritura(), CotejoConfig::default())).unwrap();
        let b = fingerprint("x", &(escritura(), other)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let mut config = CotejoConfig::default();
        config.cache.enabled = false;
        let cached = CachedReconciler::new(reconciler(config), MemoryCache::new());

        cached.validate_document(&escritura()).unwrap();
        assert!(cached.cache().is_empty());
    }

    #[test]
    fn test_schema_errors_not_cached() {
        let cached = CachedReconciler::new(reconciler(CotejoConfig::default()), MemoryCache::new());
        let raw = RawDocument::new(DocumentKind::Escritura, "esc").with_field("tax_due", "1");

        assert!(cached.validate_document(&raw).is_err());
        assert!(cached.cache().is_empty());
    }
}

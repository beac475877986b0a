use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use nixrs::store_path::StorePath;

use crate::input::{Attrs, Input};

/// Where a network-backed scheme keeps its persistent scratch checkout,
/// e.g. `git`'s bare clone — `<cache-dir>/nixrs/<scheme>/<sha256(url)>`,
/// mirroring the original `<cache>/nix/git/<hash(url)>` layout referenced
/// in the scheme table.
pub fn cache_dir_for_url(scheme: &str, url: &str) -> PathBuf {
    let hash = nixrs::hash::digest(nixrs::hash::Algorithm::SHA256, url.as_bytes());
    let encoded = format!("{:#}", hash.base32());
    let base = dirs_cache_root();
    base.join("nixrs").join(scheme).join(encoded)
}

fn dirs_cache_root() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(|| PathBuf::from("/var/cache"))
}

#[derive(Debug, Clone)]
struct AttrsCacheEntry {
    info_attrs: Attrs,
    store_path: StorePath,
    inserted_at: Instant,
}

#[derive(Debug, Clone)]
struct FactEntry {
    value: String,
    inserted_at: Instant,
}

/// The two caches the fetcher registry keeps across fetches in a single
/// process: locked-input metadata (TTL'd, so a re-run within the TTL skips
/// the network entirely) and small scheme-specific facts like a resolved
/// `gitRevToTreeHash`. Neither persists to disk — see the existing
/// in-memory-build-trace note for the same "SQLite persistence is out of
/// scope here" reasoning.
pub struct FetcherCache {
    ttl: Duration,
    attrs: Mutex<BTreeMap<String, AttrsCacheEntry>>,
    facts: Mutex<BTreeMap<String, FactEntry>>,
}

impl FetcherCache {
    pub fn new(ttl: Duration) -> Self {
        FetcherCache {
            ttl,
            attrs: Mutex::new(BTreeMap::new()),
            facts: Mutex::new(BTreeMap::new()),
        }
    }

    fn attrs_key(input: &Input) -> String {
        format!("{:?}", input.attrs())
    }

    /// `Some((info_attrs, store_path, expired))`; `expired` still returns
    /// the cached store path (a stale substitute beats a cold re-fetch) but
    /// tells the caller to refresh `lastModified` rather than trust it.
    pub fn lookup_attrs(&self, input: &Input) -> Option<(Attrs, StorePath, bool)> {
        let cache = self.attrs.lock().expect("fetcher attrs cache poisoned");
        let entry = cache.get(&Self::attrs_key(input))?;
        let expired = entry.inserted_at.elapsed() > self.ttl;
        Some((entry.info_attrs.clone(), entry.store_path.clone(), expired))
    }

    pub fn insert_attrs(&self, input: &Input, info_attrs: Attrs, store_path: StorePath) {
        let mut cache = self.attrs.lock().expect("fetcher attrs cache poisoned");
        cache.insert(
            Self::attrs_key(input),
            AttrsCacheEntry {
                info_attrs,
                store_path,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn lookup_fact(&self, key: &str) -> Option<String> {
        let cache = self.facts.lock().expect("fetcher fact cache poisoned");
        cache
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() <= self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn insert_fact(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut cache = self.facts.lock().expect("fetcher fact cache poisoned");
        cache.insert(
            key.into(),
            FactEntry {
                value: value.into(),
                inserted_at: Instant::now(),
            },
        );
    }
}

impl Default for FetcherCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

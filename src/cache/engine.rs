use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::entry::{CacheEntry, CacheIndex, EntryHeader};
use super::eviction::{plan_eviction, EvictionCandidate, EvictionReport};
use super::{estimate_size, CacheConfig, KeyPart, CACHE_INDEX_KEY, CACHE_PREFIX};
use crate::storage::KeyValueStore;

/// Caché de respuestas persistente con TTL y límite de tamaño
///
/// Owns every read and write of the index slot. Index read-modify-write
/// cycles are serialised by `index_lock` within one process; nothing
/// coordinates separate processes sharing the same store.
///
/// No operation returns an error: storage failures are logged and the
/// cache degrades to "always miss".
pub struct ResponseCache<S, C = SystemClock> {
    store: S,
    clock: C,
    config: CacheConfig,
    index_lock: Mutex<()>,
}

/// Per-entry line of [`CacheStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheItemStats {
    /// Key without the namespace prefix.
    pub key: String,
    pub size: usize,
    pub age_minutes: i64,
    pub ttl_minutes: u64,
}

/// Snapshot returned by [`ResponseCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub size: usize,
    pub items: Vec<CacheItemStats>,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "🗄️ Cache Stats:\n📝 Entries: {}\n📦 Total Size: {} bytes ({:.2} KB)",
            self.count,
            self.size,
            self.size as f64 / 1024.0
        )?;
        for item in &self.items {
            write!(
                f,
                "\n  • {} ({} bytes, {} min / {} min)",
                item.key, item.size, item.age_minutes, item.ttl_minutes
            )?;
        }
        Ok(())
    }
}

/// Resultado de una pasada de limpieza
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub corrupted: usize,
    /// Indexed keys whose slot had already disappeared.
    pub missing: usize,
    /// Live slots found outside the index and re-attached to it.
    pub adopted: usize,
    pub retained: usize,
    pub total_size: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.corrupted
    }
}

enum SlotState {
    Readable { header: EntryHeader, size: usize },
    Corrupted,
    Missing,
}

impl<S: KeyValueStore> ResponseCache<S, SystemClock> {
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<S: KeyValueStore, C: Clock> ResponseCache<S, C> {
    pub fn with_clock(store: S, clock: C, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
            index_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn generate_key(kind: &str, params: &[KeyPart]) -> String {
        super::generate_key(kind, params)
    }

    /// Obtiene un valor del caché
    ///
    /// Missing, corrupted and expired entries all read as `None`. The
    /// latter two are deleted and dropped from the index.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let _guard = self.index_lock.lock();

        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("❌ Cache miss: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Cache read error for {}: {}", key, e);
                return None;
            }
        };

        // A readable envelope whose payload fails to decode means the caller
        // asked for the wrong type; anything else is corruption.
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                match EntryHeader::parse(&raw) {
                    Ok(_) => warn!("Cache type mismatch for {}: {}", key, e),
                    Err(_) => warn!("Corrupted cache entry {}: {}", key, e),
                }
                self.drop_slot(key);
                return None;
            }
        };

        if entry.is_expired_at(self.clock.now_millis()) {
            debug!("⏰ Entrada expirada removida: {}", key);
            self.drop_slot(key);
            return None;
        }

        debug!("✅ Cache hit: {}", key);
        Some(entry.data)
    }

    /// Guarda un valor en el caché (best-effort)
    ///
    /// Runs an eviction pass first when the write would cross the ceiling.
    /// A failed write triggers one forced eviction and a single retry; if
    /// that fails too the value is dropped.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Duration) {
        let _guard = self.index_lock.lock();

        let serialized = match self.serialize_entry(data, ttl) {
            Some(serialized) => serialized,
            None => return,
        };
        let size = estimate_size(&serialized);

        let index = self.read_index();
        if index.total_size + size > self.config.max_size_bytes {
            info!(
                "🧹 Cache size {} + {} exceeds {} bytes, evicting",
                index.total_size, size, self.config.max_size_bytes
            );
            self.force_cleanup();
        }

        match self.store.set_item(key, &serialized) {
            Ok(()) => self.record_write(key, size),
            Err(e) => {
                warn!("Cache write error, attempting cleanup: {}", e);
                self.force_cleanup();

                let Some(retry) = self.serialize_entry(data, ttl) else {
                    return;
                };
                match self.store.set_item(key, &retry) {
                    Ok(()) => self.record_write(key, estimate_size(&retry)),
                    Err(e) => warn!("Cache write failed after cleanup, dropping {}: {}", key, e),
                }
            }
        }
    }

    /// Elimina una entrada; no-op if the key is absent.
    pub fn remove(&self, key: &str) {
        let _guard = self.index_lock.lock();
        self.drop_slot(key);
    }

    /// Deletes every indexed slot, then the index itself.
    ///
    /// Slots outside the cache namespace are never touched.
    pub fn clear_all(&self) {
        let _guard = self.index_lock.lock();

        let index = self.read_index();
        let mut failed = 0;
        for key in &index.keys {
            if let Err(e) = self.store.remove_item(key) {
                warn!("Failed to remove cache slot {}: {}", key, e);
                failed += 1;
            }
        }
        if let Err(e) = self.store.remove_item(CACHE_INDEX_KEY) {
            warn!("Failed to remove cache index: {}", e);
        }

        info!("🗑️ Caché limpiado: {} entradas ({} fallos)", index.keys.len() - failed, failed);
    }

    /// Reconciling sweep.
    ///
    /// Drops expired and corrupted slots, then rewrites the index with the
    /// live keys and their exact total size. Live cache slots that lost
    /// their index entry are re-attached.
    pub fn cleanup_expired(&self) -> SweepReport {
        let _guard = self.index_lock.lock();

        let index = self.read_index();
        let now = self.clock.now_millis();
        let mut report = SweepReport::default();
        let mut live_keys = Vec::with_capacity(index.keys.len());

        for key in &index.keys {
            self.sweep_slot(key, now, &mut report, &mut live_keys);
        }

        for key in self.orphan_keys(&index) {
            let before = live_keys.len();
            self.sweep_slot(&key, now, &mut report, &mut live_keys);
            report.adopted += live_keys.len() - before;
        }

        report.retained = live_keys.len();
        self.save_index(&CacheIndex {
            keys: live_keys,
            total_size: report.total_size,
            last_cleanup: now,
        });

        if report.removed() > 0 || report.adopted > 0 {
            info!(
                "🧹 Cache cleanup: removed {} expired, {} corrupted, adopted {} ({} bytes retained)",
                report.expired, report.corrupted, report.adopted, report.total_size
            );
        }

        report
    }

    /// Non-mutating inventory of the indexed entries.
    pub fn stats(&self) -> CacheStats {
        let _guard = self.index_lock.lock();

        let index = self.read_index();
        let now = self.clock.now_millis();
        let items: Vec<CacheItemStats> = index
            .keys
            .iter()
            .filter_map(|key| {
                let raw = self.store.get_item(key).ok().flatten()?;
                let header = EntryHeader::parse(&raw).ok()?;
                Some(CacheItemStats {
                    key: key.strip_prefix(CACHE_PREFIX).unwrap_or(key).to_string(),
                    size: estimate_size(&raw),
                    age_minutes: millis_to_minutes(now.saturating_sub(header.timestamp) as f64) as i64,
                    ttl_minutes: millis_to_minutes(header.ttl as f64) as u64,
                })
            })
            .collect();

        CacheStats {
            count: items.len(),
            size: items.iter().map(|item| item.size).sum(),
            items,
        }
    }

    /// Snapshot of the persisted index.
    pub fn index(&self) -> CacheIndex {
        let _guard = self.index_lock.lock();
        self.read_index()
    }

    /// Forced oldest-first eviction down to the configured floor.
    pub fn evict(&self) -> EvictionReport {
        let _guard = self.index_lock.lock();
        self.force_cleanup()
    }

    // Métodos privados; callers hold `index_lock`.

    fn serialize_entry<T: Serialize + ?Sized>(&self, data: &T, ttl: Duration) -> Option<String> {
        let entry = CacheEntry::new(data, self.clock.now_millis(), ttl);
        match serde_json::to_string(&entry) {
            Ok(serialized) => Some(serialized),
            Err(e) => {
                warn!("Failed to serialize cache entry: {}", e);
                None
            }
        }
    }

    fn read_index(&self) -> CacheIndex {
        match self.store.get_item(CACHE_INDEX_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(index) => return index,
                Err(e) => warn!("Failed to read cache index: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("Failed to read cache index: {}", e),
        }
        CacheIndex::empty(self.clock.now_millis())
    }

    fn save_index(&self, index: &CacheIndex) {
        let result = serde_json::to_string(index)
            .map_err(|e| e.to_string())
            .and_then(|raw| self.store.set_item(CACHE_INDEX_KEY, &raw).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("Failed to save cache index: {}", e);
        }
    }

    fn record_write(&self, key: &str, size: usize) {
        let mut index = self.read_index();
        index.record_write(key, size);
        self.save_index(&index);
    }

    fn drop_slot(&self, key: &str) {
        if let Err(e) = self.store.remove_item(key) {
            warn!("Cache remove error for {}: {}", key, e);
        }
        let mut index = self.read_index();
        if index.contains(key) {
            index.remove_key(key);
            self.save_index(&index);
        }
    }

    fn inspect_slot(&self, key: &str) -> SlotState {
        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SlotState::Missing,
            Err(e) => {
                warn!("Unreadable cache slot {}: {}", key, e);
                return SlotState::Corrupted;
            }
        };
        match EntryHeader::parse(&raw) {
            Ok(header) => SlotState::Readable {
                header,
                size: estimate_size(&raw),
            },
            Err(_) => SlotState::Corrupted,
        }
    }

    fn sweep_slot(&self, key: &str, now: i64, report: &mut SweepReport, live_keys: &mut Vec<String>) {
        match self.inspect_slot(key) {
            SlotState::Readable { header, .. } if header.is_expired_at(now) => {
                self.delete_quietly(key);
                report.expired += 1;
            }
            SlotState::Readable { size, .. } => {
                live_keys.push(key.to_string());
                report.total_size += size;
            }
            SlotState::Corrupted => {
                self.delete_quietly(key);
                report.corrupted += 1;
            }
            SlotState::Missing => report.missing += 1,
        }
    }

    fn orphan_keys(&self, index: &CacheIndex) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(CACHE_PREFIX) && k != CACHE_INDEX_KEY && !index.contains(k))
                .collect(),
            Err(e) => {
                warn!("Could not list storage keys: {}", e);
                Vec::new()
            }
        }
    }

    fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove_item(key) {
            warn!("Cache remove error for {}: {}", key, e);
        }
    }

    fn force_cleanup(&self) -> EvictionReport {
        let index = self.read_index();
        let now = self.clock.now_millis();
        let mut report = EvictionReport::default();
        let mut candidates = Vec::with_capacity(index.keys.len());

        for key in &index.keys {
            match self.inspect_slot(key) {
                // expired slots compete on age like any other
                SlotState::Readable { header, size } => candidates.push(EvictionCandidate {
                    key: key.clone(),
                    timestamp: header.timestamp,
                    size,
                }),
                SlotState::Corrupted => {
                    self.delete_quietly(key);
                    report.corrupted += 1;
                }
                SlotState::Missing => {}
            }
        }

        let plan = plan_eviction(candidates, self.config.cleanup_threshold_bytes);
        for key in &plan.evict {
            self.delete_quietly(key);
        }

        report.evicted = plan.evict.len();
        report.freed_size = plan.freed_size;
        report.remaining_size = plan.remaining_size;

        self.save_index(&CacheIndex {
            keys: plan.keep,
            total_size: plan.remaining_size,
            last_cleanup: now,
        });

        info!(
            "🧹 Evicted {} entries ({} bytes freed, {} corrupted), {} bytes remain",
            report.evicted, report.freed_size, report.corrupted, report.remaining_size
        );
        report
    }
}

fn millis_to_minutes(millis: f64) -> f64 {
    (millis / 1000.0 / 60.0).round()
}

/// Runs one reconciling sweep after the configured startup delay.
pub fn spawn_startup_cleanup<S, C>(cache: Arc<ResponseCache<S, C>>) -> JoinHandle<()>
where
    S: KeyValueStore + 'static,
    C: Clock + 'static,
{
    let delay = cache.config().startup_cleanup_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match tokio::task::spawn_blocking(move || cache.cleanup_expired()).await {
            Ok(report) => debug!(
                "Startup cache sweep done: {} retained, {} removed",
                report.retained,
                report.removed()
            ),
            Err(e) => warn!("Startup cache sweep failed: {}", e),
        }
    })
}

/// Settles the startup sweep before a short-lived process exits.
///
/// A sweep still waiting out its delay is cancelled and run inline, so
/// commands that finish early still reconcile the cache.
pub async fn finish_startup_cleanup<S, C>(cache: &ResponseCache<S, C>, handle: JoinHandle<()>)
where
    S: KeyValueStore,
    C: Clock,
{
    if !handle.is_finished() {
        handle.abort();
    }
    match handle.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            let report = cache.cleanup_expired();
            debug!(
                "Startup cache sweep ran inline: {} retained, {} removed",
                report.retained,
                report.removed()
            );
        }
        Err(e) => warn!("Startup cache sweep failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, CLEANUP_THRESHOLD_BYTES};
    use crate::cache_key;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    type TestCache = ResponseCache<Arc<MemoryStore>, Arc<ManualClock>>;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn setup_with(store: MemoryStore, config: CacheConfig) -> (TestCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = ResponseCache::with_clock(store.clone(), clock.clone(), config);
        (cache, store, clock)
    }

    fn setup() -> (TestCache, Arc<MemoryStore>, Arc<ManualClock>) {
        setup_with(MemoryStore::new(), CacheConfig::default())
    }

    fn raw_size(store: &MemoryStore, key: &str) -> usize {
        store.get_item(key).unwrap().map(|raw| raw.len()).unwrap_or(0)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        keyword: String,
        results: Vec<String>,
    }

    fn payload(keyword: &str) -> Payload {
        Payload {
            keyword: keyword.to_string(),
            results: vec!["晴天".to_string(), "稻香".to_string()],
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let (cache, _, _) = setup();
        let key = cache_key!("search", "netease", "abc", 20);

        cache.set(&key, &payload("abc"), Duration::from_secs(600));

        assert_eq!(cache.get::<Payload>(&key), Some(payload("abc")));
        assert_eq!(cache.index().keys, vec![key]);
    }

    #[test]
    fn entries_expire_strictly_after_ttl() {
        let (cache, store, clock) = setup();
        let key = cache_key!("toplists", "qq");
        cache.set(&key, &vec![1, 2, 3], Duration::from_millis(1_000));

        clock.advance(Duration::from_millis(1_000));
        assert_eq!(cache.get::<Vec<i32>>(&key), Some(vec![1, 2, 3]));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<Vec<i32>>(&key), None);
        assert_eq!(store.get_item(&key).unwrap(), None);
        assert!(!cache.index().contains(&key));
    }

    #[test]
    fn removing_absent_key_is_a_noop() {
        let (cache, store, _) = setup();
        let key = cache_key!("lyrics", "kuwo", "1");
        cache.set(&key, "lrc", DAY);
        let before = cache.index();

        cache.remove("inspire_cache_lyrics_kuwo_missing");
        cache.remove("inspire_cache_lyrics_kuwo_missing");

        assert_eq!(cache.index(), before);
        assert!(store.get_item(&key).unwrap().is_some());

        cache.remove(&key);
        assert_eq!(cache.get::<String>(&key), None);
        assert!(cache.index().keys.is_empty());
    }

    #[test]
    fn corrupted_entry_reads_as_miss_and_leaves_index() {
        let (cache, store, _) = setup();
        let key = cache_key!("songinfo", "netease", "42");
        cache.set(&key, &payload("x"), DAY);
        store.set_item(&key, "{\"data\": [unterminated").unwrap();

        assert_eq!(cache.get::<Payload>(&key), None);
        assert!(!cache.index().contains(&key));
        assert_eq!(store.get_item(&key).unwrap(), None);
    }

    #[test]
    fn corrupted_index_is_treated_as_empty() {
        let (cache, store, _) = setup();
        store.set_item(CACHE_INDEX_KEY, "not an index").unwrap();

        let key = cache_key!("playlist", "qq", "7");
        cache.set(&key, "data", Duration::from_secs(60));

        assert_eq!(cache.index().keys, vec![key]);
    }

    #[test]
    fn overwrites_inflate_size_until_cleanup_reconciles() {
        let (cache, store, clock) = setup();
        let live = cache_key!("songinfo", "netease", "1");
        let short = cache_key!("search", "qq", "abc", 20);
        let broken = cache_key!("playlist", "kuwo", "9");

        cache.set(&live, &payload("one"), DAY);
        cache.set(&live, &payload("one"), DAY);
        cache.set(&short, &payload("two"), Duration::from_secs(600));
        cache.set(&broken, &payload("three"), DAY);
        let broken_size = raw_size(&store, &broken);
        store.set_item(&broken, "garbage").unwrap();

        assert_eq!(
            cache.index().total_size,
            2 * raw_size(&store, &live) + raw_size(&store, &short) + broken_size
        );

        clock.advance(Duration::from_secs(601));
        let report = cache.cleanup_expired();

        assert_eq!(report.expired, 1);
        assert_eq!(report.corrupted, 1);
        assert_eq!(report.retained, 1);

        let index = cache.index();
        assert_eq!(index.keys, vec![live.clone()]);
        assert_eq!(index.total_size, raw_size(&store, &live));
        assert_eq!(index.last_cleanup, clock.now_millis());
        assert_eq!(store.get_item(&short).unwrap(), None);
        assert_eq!(store.get_item(&broken).unwrap(), None);
    }

    #[test]
    fn cleanup_adopts_orphans_and_forgets_missing_slots() {
        let (cache, store, clock) = setup();
        let orphan = cache_key!("lyrics", "qq", "5");
        let ghost = cache_key!("lyrics", "qq", "6");

        let envelope = CacheEntry::new("orphan lrc", clock.now_millis(), DAY);
        store.set_item(&orphan, &serde_json::to_string(&envelope).unwrap()).unwrap();
        cache.set(&ghost, "gone soon", DAY);
        store.remove_item(&ghost).unwrap();
        store.set_item("inspire-favs", "[]").unwrap();

        let report = cache.cleanup_expired();

        assert_eq!(report.adopted, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(cache.index().keys, vec![orphan.clone()]);
        assert_eq!(cache.index().total_size, raw_size(&store, &orphan));
        assert_eq!(store.get_item("inspire-favs").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn expired_lyrics_are_purged_from_stats() {
        let (cache, _, clock) = setup();
        let key = cache_key!("lyrics", "netease", "186016");
        cache.set(&key, "[00:01.00]晴天", Duration::from_millis(604_800_000));

        clock.advance(8 * DAY);

        assert_eq!(cache.get::<String>(&key), None);
        assert!(cache.stats().items.iter().all(|item| item.key != "lyrics_netease_186016"));
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn stats_report_sizes_and_rounded_minutes() {
        let (cache, store, clock) = setup();
        let key = cache_key!("search", "netease", "abc", 20);
        cache.set(&key, &payload("abc"), Duration::from_secs(600));
        cache.set("inspire_cache_other", "v", Duration::from_secs(600));
        store.set_item("inspire_cache_other", "{broken").unwrap();

        clock.advance(Duration::from_secs(90));
        let stats = cache.stats();

        assert_eq!(stats.count, 1);
        assert_eq!(stats.size, raw_size(&store, &key));
        assert_eq!(
            stats.items,
            vec![CacheItemStats {
                key: "search_netease_abc_20".to_string(),
                size: raw_size(&store, &key),
                age_minutes: 2,
                ttl_minutes: 10,
            }]
        );
        // stats never mutate
        assert_eq!(cache.get::<Payload>(&key), Some(payload("abc")));
    }

    #[test]
    fn capacity_eviction_drops_oldest_entries() {
        let (cache, store, clock) = setup();
        let chunk = "x".repeat(100 * 1024);
        let keys: Vec<String> = (0..50).map(|i| cache_key!("playlist", "netease", i)).collect();

        for key in &keys {
            cache.set(key, &chunk, Duration::from_secs(3_600));
            clock.advance(Duration::from_secs(1));
        }
        assert!(keys.iter().all(|k| store.get_item(k).unwrap().is_some()));

        let big = cache_key!("lyrics", "qq", "big");
        let big_payload = "y".repeat(200 * 1024);
        cache.set(&big, &big_payload, DAY);

        let index = cache.index();
        let new_size = raw_size(&store, &big);
        assert!(index.total_size <= CLEANUP_THRESHOLD_BYTES + new_size);
        assert!(index.contains(&big));
        assert_eq!(cache.get::<String>(&big), Some(big_payload));

        let survivors: Vec<bool> = keys.iter().map(|k| store.get_item(k).unwrap().is_some()).collect();
        let first_kept = survivors.iter().position(|kept| *kept).unwrap();
        assert!(first_kept > 0, "oldest entry must be evicted");
        assert!(survivors[first_kept..].iter().all(|kept| *kept));
        assert!(survivors[..first_kept].iter().all(|kept| !kept));
        assert!(*survivors.last().unwrap(), "newest entry survives");
    }

    #[test]
    fn failed_write_evicts_and_retries_once() {
        let config = CacheConfig {
            max_size_bytes: 10_000,
            cleanup_threshold_bytes: 0,
            ..CacheConfig::default()
        };
        let (cache, store, clock) = setup_with(MemoryStore::with_quota(950), config);
        clock.set(0);
        let body = "z".repeat(250);

        cache.set("inspire_cache_a", &body, Duration::from_secs(60));
        clock.advance(Duration::from_millis(1));
        cache.set("inspire_cache_b", &body, Duration::from_secs(60));
        clock.advance(Duration::from_millis(1));
        cache.set("inspire_cache_c", &body, Duration::from_secs(60));

        assert_eq!(store.get_item("inspire_cache_a").unwrap(), None);
        assert_eq!(store.get_item("inspire_cache_b").unwrap(), None);
        assert_eq!(cache.get::<String>("inspire_cache_c"), Some(body));
        assert_eq!(cache.index().keys, vec!["inspire_cache_c".to_string()]);
    }

    #[test]
    fn write_that_never_fits_is_dropped_silently() {
        let (cache, _, _) = setup_with(MemoryStore::with_quota(200), CacheConfig::default());
        let key = cache_key!("search", "kuwo", "huge", 20);

        cache.set(&key, &"w".repeat(500), Duration::from_secs(60));

        assert_eq!(cache.get::<String>(&key), None);
        assert!(!cache.index().contains(&key));
    }

    #[test]
    fn clear_all_spares_foreign_slots() {
        let (cache, store, _) = setup();
        store.set_item("inspire-favs", "[\"song\"]").unwrap();
        cache.set(&cache_key!("toplists", "netease"), &vec!["a"], DAY);
        cache.set(&cache_key!("toplists", "kuwo"), &vec!["b"], DAY);

        cache.clear_all();

        assert_eq!(store.keys().unwrap(), vec!["inspire-favs".to_string()]);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn explicit_evict_trims_to_the_floor() {
        let config = CacheConfig {
            max_size_bytes: 10_000,
            cleanup_threshold_bytes: 600,
            ..CacheConfig::default()
        };
        let (cache, store, clock) = setup_with(MemoryStore::new(), config);
        let keys: Vec<String> = (0..4).map(|i| cache_key!("songinfo", "qq", i)).collect();
        for key in &keys {
            cache.set(key, &"s".repeat(200), DAY);
            clock.advance(Duration::from_secs(1));
        }

        let report = cache.evict();

        assert_eq!(report.evicted, 2);
        assert!(report.remaining_size <= 600);
        assert_eq!(cache.index().keys, keys[2..].to_vec());
        assert_eq!(store.get_item(&keys[0]).unwrap(), None);
    }

    #[test]
    fn stats_survive_extreme_timestamps() {
        let (cache, store, _) = setup();
        let ancient = cache_key!("song", "qq", "1");
        let future = cache_key!("song", "qq", "2");
        cache.set(&ancient, &1, Duration::from_secs(60));
        cache.set(&future, &2, Duration::from_secs(60));
        store
            .set_item(&ancient, r#"{"data":1,"timestamp":-9223372036854775808,"ttl":1000}"#)
            .unwrap();
        store
            .set_item(&future, r#"{"data":2,"timestamp":9223372036854775807,"ttl":1000}"#)
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.count, 2);
        let age = |key: &str| {
            let short = key.strip_prefix(CACHE_PREFIX).unwrap();
            stats.items.iter().find(|item| item.key == short).unwrap().age_minutes
        };
        assert!(age(&ancient) > 0);
        assert!(age(&future) < 0);
    }

    #[test]
    fn wrong_type_reads_miss_and_drop_the_slot() {
        let (cache, store, _) = setup();
        let key = cache_key!("lyric", "netease", "7");
        cache.set(&key, "[00:01.00]line", DAY);

        assert_eq!(cache.get::<Vec<u32>>(&key), None);
        assert_eq!(store.get_item(&key).unwrap(), None);
        assert!(cache.index().keys.is_empty());
    }

    #[test]
    fn long_keys_work_over_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::storage::JsonFileStore::open(dir.path()).unwrap());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = ResponseCache::with_clock(store.clone(), clock, CacheConfig::default());
        let keyword = "我".repeat(40);
        let key = cache_key!("search", "netease", keyword.as_str(), 20);

        cache.set(&key, &payload(&keyword), DAY);
        assert_eq!(cache.get::<Payload>(&key), Some(payload(&keyword)));

        let report = cache.cleanup_expired();
        assert_eq!(report.retained, 1);
        assert_eq!(cache.index().keys, vec![key.clone()]);

        cache.clear_all();
        assert_eq!(store.get_item(&key).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn startup_sweep_runs_after_delay() {
        let (cache, store, clock) = setup();
        let key = cache_key!("search", "netease", "old", 20);
        cache.set(&key, "stale", Duration::from_secs(600));
        clock.advance(Duration::from_secs(3_600));

        let cache = Arc::new(cache);
        let handle = spawn_startup_cleanup(cache.clone());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(store.get_item(&key).unwrap().is_some());

        handle.await.unwrap();
        assert_eq!(store.get_item(&key).unwrap(), None);
        assert!(cache.index().keys.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_startup_sweep_runs_inline_on_exit() {
        let (cache, store, clock) = setup();
        let stale = cache_key!("search", "netease", "old", 20);
        let fresh = cache_key!("search", "netease", "new", 20);
        cache.set(&stale, "stale", Duration::from_secs(600));
        clock.advance(Duration::from_secs(3_600));
        cache.set(&fresh, "fresh", Duration::from_secs(600));

        let cache = Arc::new(cache);
        let handle = spawn_startup_cleanup(cache.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;

        finish_startup_cleanup(&cache, handle).await;
        assert_eq!(store.get_item(&stale).unwrap(), None);
        assert_eq!(cache.index().keys, vec![fresh]);
    }
}

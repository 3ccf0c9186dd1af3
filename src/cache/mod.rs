//! # Cache Module
//!
//! Size-bounded, TTL-based response cache layered over a persistent
//! [`KeyValueStore`](crate::storage::KeyValueStore).
//!
//! Every gateway response the client fetches is stored as a JSON
//! envelope in its own storage slot, and a single index slot tracks the
//! known keys plus an approximate aggregate size.
//!
//! ## Features
//!
//! - **TTL Support**: per-operation time-to-live, expired entries read as absent
//! - **Size Bounded**: oldest-first eviction once a write would cross the ceiling
//! - **Hysteresis**: eviction frees space down to a lower floor so it does not
//!   re-trigger on the next write
//! - **Self Healing**: corrupted slots are dropped, a reconciling sweep fixes
//!   size drift
//!
//! ## TTL Table
//!
//! | Operation | TTL |
//! |---|---|
//! | toplists listing | 6 hours |
//! | toplist songs | 1 hour |
//! | lyrics | 7 days |
//! | song info | 24 hours |
//! | playlist | 1 hour |
//! | search / aggregate search | 10 minutes |
//!
//! ## Configuration
//!
//! ```env
//! MAX_CACHE_SIZE_BYTES=5242880     # eviction ceiling
//! CLEANUP_THRESHOLD_BYTES=4194304  # eviction floor
//! STARTUP_CLEANUP_DELAY=5s         # delay before the startup sweep
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use inspire_music::cache::{CacheConfig, CacheTtl, ResponseCache};
//! use inspire_music::storage::MemoryStore;
//!
//! let cache = ResponseCache::new(MemoryStore::new(), CacheConfig::default());
//! let key = inspire_music::cache_key!("search", "netease", "abc", 20);
//!
//! cache.set(&key, &vec!["song"], CacheTtl::SEARCH);
//! let hit: Option<Vec<String>> = cache.get(&key);
//! assert!(hit.is_some());
//! ```

pub mod clock;
pub mod engine;
pub mod entry;
pub mod eviction;

use std::fmt;
use std::time::Duration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{finish_startup_cleanup, spawn_startup_cleanup, CacheItemStats, CacheStats, ResponseCache, SweepReport};
pub use entry::{CacheEntry, CacheIndex};
pub use eviction::{plan_eviction, EvictionCandidate, EvictionPlan, EvictionReport};

/// Namespace shared by every cache slot.
pub const CACHE_PREFIX: &str = "inspire_cache_";
/// Slot holding the serialised [`CacheIndex`].
pub const CACHE_INDEX_KEY: &str = "inspire_cache_index";

/// Default eviction ceiling (5 MB).
pub const MAX_CACHE_SIZE_BYTES: usize = 5 * 1024 * 1024;
/// Default eviction floor (4 MB).
pub const CLEANUP_THRESHOLD_BYTES: usize = 4 * 1024 * 1024;
pub const STARTUP_CLEANUP_DELAY: Duration = Duration::from_secs(5);

/// Tiempos de expiración por tipo de operación
pub struct CacheTtl;

impl CacheTtl {
    pub const TOPLISTS: Duration = Duration::from_secs(6 * 60 * 60);
    pub const TOPLIST_SONGS: Duration = Duration::from_secs(60 * 60);
    pub const LYRICS: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    pub const SONG_INFO: Duration = Duration::from_secs(24 * 60 * 60);
    pub const PLAYLIST: Duration = Duration::from_secs(60 * 60);
    pub const SEARCH: Duration = Duration::from_secs(10 * 60);
}

/// Gateway operations that go through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Search,
    AggregateSearch,
    SongInfo,
    Lyrics,
    Playlist,
    Toplists,
    ToplistSongs,
}

impl Operation {
    /// Tag placed right after the namespace prefix in the cache key.
    pub fn key_tag(&self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::AggregateSearch => "aggsearch",
            Operation::SongInfo => "songinfo",
            Operation::Lyrics => "lyrics",
            Operation::Playlist => "playlist",
            Operation::Toplists => "toplists",
            Operation::ToplistSongs => "toplistsongs",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            Operation::Search | Operation::AggregateSearch => CacheTtl::SEARCH,
            Operation::SongInfo => CacheTtl::SONG_INFO,
            Operation::Lyrics => CacheTtl::LYRICS,
            Operation::Playlist => CacheTtl::PLAYLIST,
            Operation::Toplists => CacheTtl::TOPLISTS,
            Operation::ToplistSongs => CacheTtl::TOPLIST_SONGS,
        }
    }

    pub fn key(&self, params: &[KeyPart]) -> String {
        generate_key(self.key_tag(), params)
    }
}

/// Límites de tamaño y temporización del caché
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_size_bytes: usize,
    pub cleanup_threshold_bytes: usize,
    pub startup_cleanup_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: MAX_CACHE_SIZE_BYTES,
            cleanup_threshold_bytes: CLEANUP_THRESHOLD_BYTES,
            startup_cleanup_delay: STARTUP_CLEANUP_DELAY,
        }
    }
}

/// Size in bytes of a serialised payload (UTF-8 length).
pub fn estimate_size(serialized: &str) -> usize {
    serialized.len()
}

/// One primitive parameter of a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPart(String);

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart(value.clone())
    }
}

macro_rules! key_part_from_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for KeyPart {
            fn from(value: $ty) -> Self {
                KeyPart(value.to_string())
            }
        })*
    };
}

key_part_from_number!(u32, u64, usize, i32, i64);

/// Builds `<prefix><kind>_<p1>_<p2>...`.
///
/// Parameters containing `_` can collide; that is an accepted limitation.
pub fn generate_key(kind: &str, params: &[KeyPart]) -> String {
    let joined = params
        .iter()
        .map(|p| p.0.as_str())
        .collect::<Vec<_>>()
        .join("_");
    format!("{}{}_{}", CACHE_PREFIX, kind, joined)
}

/// Variadic form of [`generate_key`].
#[macro_export]
macro_rules! cache_key {
    ($kind:expr $(, $param:expr)* $(,)?) => {
        $crate::cache::generate_key(
            $kind,
            &[$($crate::cache::KeyPart::from($param)),*],
        )
    };
}

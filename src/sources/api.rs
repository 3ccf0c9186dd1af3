use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use super::gateway::MusicGateway;
use super::{
    Platform, PlaylistData, RawPlaylistData, RawSearchData, RawToplistData, SearchResult, SongInfo, ToplistSongs,
    ToplistSummary,
};
use crate::cache::{CacheStats, Clock, KeyPart, Operation, ResponseCache, SweepReport, SystemClock};
use crate::error::ApiResult;
use crate::storage::KeyValueStore;

/// Fachada con caché sobre el gateway de música
///
/// Each operation derives its cache key, answers from the cache on a hit
/// and otherwise fetches, normalises and stores the result with the
/// operation's TTL. Failed fetches are never cached.
pub struct MusicApi<G, S, C = SystemClock> {
    gateway: G,
    cache: Arc<ResponseCache<S, C>>,
}

impl<G, S, C> MusicApi<G, S, C>
where
    G: MusicGateway,
    S: KeyValueStore,
    C: Clock,
{
    pub fn new(gateway: G, cache: Arc<ResponseCache<S, C>>) -> Self {
        Self { gateway, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache<S, C>> {
        &self.cache
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    async fn cached<T, F, Fut>(&self, operation: Operation, params: &[KeyPart], fetch: F) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let key = operation.key(params);
        if let Some(hit) = self.cache.get::<T>(&key) {
            debug!("✅ {} servido desde caché", key);
            return Ok(hit);
        }

        let value = fetch().await?;
        self.cache.set(&key, &value, operation.ttl());
        Ok(value)
    }

    /// Busca canciones en una plataforma
    pub async fn search(&self, source: Platform, keyword: &str, limit: u32) -> ApiResult<SearchResult> {
        info!("🔍 Buscando en {}: {}", source, keyword);
        self.cached(
            Operation::Search,
            &[source.into(), keyword.into(), limit.into()],
            || async move {
                let raw = self.gateway.search(source, keyword, limit).await?;
                Ok(normalize_search(raw, source))
            },
        )
        .await
    }

    /// Búsqueda agregada en todas las plataformas
    pub async fn aggregate_search(&self, keyword: &str) -> ApiResult<SearchResult> {
        info!("🔍 Búsqueda agregada: {}", keyword);
        self.cached(Operation::AggregateSearch, &[keyword.into()], || async move {
            let raw = self.gateway.aggregate_search(keyword).await?;
            // aggregate results without a platform come from NetEase
            Ok(SearchResult {
                total: None,
                ..normalize_search(raw, Platform::Netease)
            })
        })
        .await
    }

    pub async fn song_info(&self, source: Platform, id: &str) -> ApiResult<SongInfo> {
        self.cached(Operation::SongInfo, &[source.into(), id.into()], || {
            self.gateway.song_info(source, id)
        })
        .await
    }

    pub async fn lyrics(&self, source: Platform, id: &str) -> ApiResult<String> {
        self.cached(Operation::Lyrics, &[source.into(), id.into()], || self.gateway.lyrics(source, id))
            .await
    }

    pub async fn playlist(&self, source: Platform, id: &str) -> ApiResult<PlaylistData> {
        self.cached(Operation::Playlist, &[source.into(), id.into()], || async move {
            let raw = self.gateway.playlist(source, id).await?;
            Ok(normalize_playlist(raw, source))
        })
        .await
    }

    pub async fn toplists(&self, source: Platform) -> ApiResult<Vec<ToplistSummary>> {
        self.cached(Operation::Toplists, &[source.into()], || async move {
            let raw = self.gateway.toplists(source).await?;
            Ok(raw.list.unwrap_or_default())
        })
        .await
    }

    pub async fn toplist_songs(&self, source: Platform, id: &str) -> ApiResult<ToplistSongs> {
        self.cached(Operation::ToplistSongs, &[source.into(), id.into()], || async move {
            let raw = self.gateway.toplist_songs(source, id).await?;
            Ok(normalize_toplist(raw, source))
        })
        .await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear_all()
    }

    pub fn cleanup_cache(&self) -> SweepReport {
        self.cache.cleanup_expired()
    }
}

/// Songs keep their upstream platform, defaulting to `source`.
pub fn normalize_search(raw: RawSearchData, source: Platform) -> SearchResult {
    SearchResult {
        keyword: raw.keyword,
        total: raw.total,
        results: raw
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|song| song.with_default_platform(source))
            .collect(),
    }
}

/// Every item is tagged with the platform the playlist was requested from.
pub fn normalize_playlist(raw: RawPlaylistData, source: Platform) -> PlaylistData {
    PlaylistData {
        list: raw
            .list
            .unwrap_or_default()
            .into_iter()
            .map(|song| song.with_platform(source))
            .collect(),
        info: raw.info.unwrap_or_default(),
        source: raw.source,
    }
}

/// The upstream source wins over the requested one, for the list and every song.
pub fn normalize_toplist(raw: RawToplistData, source: Platform) -> ToplistSongs {
    let source = raw.source.unwrap_or(source);
    ToplistSongs {
        list: raw
            .list
            .unwrap_or_default()
            .into_iter()
            .map(|song| song.with_platform(source))
            .collect(),
        source,
    }
}

//! Favourites and user playlists, persisted next to the response cache.
//!
//! Library slots live outside the `inspire_cache_` namespace, so cache
//! eviction and [`ResponseCache::clear_all`](crate::cache::ResponseCache::clear_all)
//! never touch them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{Clock, SystemClock};
use crate::sources::{build_file_url, FileKind, Platform, PlaylistData, Song};
use crate::storage::{load_json, save_json, KeyValueStore};

pub const FAVORITES_KEY: &str = "inspire-favs";
pub const PLAYLISTS_KEY: &str = "inspire-playlists";

/// Id of the synthetic favourites playlist.
pub const FAVORITES_ID: &str = "favorites";
pub const FAVORITES_NAME: &str = "我喜欢的音乐";
pub const IMPORTED_PLAYLIST_NAME: &str = "导入歌单";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub songs: Vec<Song>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Platform>,
    /// Author of the upstream playlist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl LocalPlaylist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            songs: Vec::new(),
            source: None,
            origin: None,
            pic: None,
            desc: None,
            url: None,
        }
    }

    pub fn contains(&self, song: &Song) -> bool {
        self.songs.iter().any(|s| s.same_as(song))
    }
}

/// Fallbacks used when converting gateway playlist data.
///
/// Non-empty upstream info wins over these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub id: String,
    pub name: String,
    pub source: Platform,
    pub origin: Option<String>,
    pub pic: Option<String>,
    pub desc: Option<String>,
    pub url: Option<String>,
}

impl ImportOptions {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: Platform) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source,
            origin: None,
            pic: None,
            desc: None,
            url: None,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub fn to_local_playlist(data: PlaylistData, options: ImportOptions) -> LocalPlaylist {
    let info = data.info;
    LocalPlaylist {
        id: options.id,
        name: non_empty(&info.name).unwrap_or(options.name),
        songs: data.list,
        source: data.source.or(Some(options.source)),
        origin: non_empty(&info.author).or(options.origin),
        pic: info.pic.filter(|p| !p.is_empty()).or(options.pic),
        desc: info.desc.filter(|d| !d.is_empty()).or(options.desc),
        url: options.url,
    }
}

/// Explicit cover, else the first song's picture, else the gateway cover URL.
pub fn playlist_cover(playlist: &LocalPlaylist, base_url: &str) -> Option<String> {
    if let Some(pic) = playlist.pic.as_ref().filter(|p| !p.is_empty()) {
        return Some(pic.clone());
    }
    let first = playlist.songs.first()?;
    match first.pic.as_ref().filter(|p| !p.is_empty()) {
        Some(pic) => Some(pic.clone()),
        None => Some(build_file_url(base_url, first.platform, &first.id, FileKind::Pic, None)),
    }
}

/// Biblioteca local: favoritos y listas del usuario
pub struct Library<S, C = SystemClock> {
    store: S,
    clock: C,
    base_url: String,
    favorites: Vec<Song>,
    playlists: Vec<LocalPlaylist>,
}

impl<S: KeyValueStore> Library<S, SystemClock> {
    pub fn load(store: S, base_url: impl Into<String>) -> Self {
        Self::with_clock(store, SystemClock, base_url)
    }
}

impl<S: KeyValueStore, C: Clock> Library<S, C> {
    pub fn with_clock(store: S, clock: C, base_url: impl Into<String>) -> Self {
        let favorites: Vec<Song> = load_json(&store, FAVORITES_KEY, Vec::new());
        let playlists: Vec<LocalPlaylist> = load_json(&store, PLAYLISTS_KEY, Vec::new());
        info!(
            "📚 Biblioteca cargada: {} favoritos, {} listas",
            favorites.len(),
            playlists.len()
        );

        Self {
            store,
            clock,
            base_url: base_url.into(),
            favorites,
            playlists,
        }
    }

    pub fn favorites(&self) -> &[Song] {
        &self.favorites
    }

    pub fn playlists(&self) -> &[LocalPlaylist] {
        &self.playlists
    }

    pub fn playlist(&self, id: &str) -> Option<&LocalPlaylist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    pub fn is_favorite(&self, song: &Song) -> bool {
        self.favorites.iter().any(|s| s.same_as(song))
    }

    /// Adds or removes a favourite. Returns whether the song is now a favourite.
    pub fn toggle_favorite(&mut self, song: Song) -> Result<bool> {
        let mut favorites = self.favorites.clone();
        let now_favorite = match favorites.iter().position(|s| s.same_as(&song)) {
            Some(index) => {
                favorites.remove(index);
                false
            }
            None => {
                favorites.push(song);
                true
            }
        };
        save_json(&self.store, FAVORITES_KEY, &favorites)?;
        if now_favorite {
            if let Some(song) = favorites.last() {
                info!("❤️ Favorito: {}", song.name);
            }
        }
        self.favorites = favorites;
        Ok(now_favorite)
    }

    pub fn favorites_playlist(&self) -> LocalPlaylist {
        LocalPlaylist {
            songs: self.favorites.clone(),
            ..LocalPlaylist::new(FAVORITES_ID, FAVORITES_NAME)
        }
    }

    /// Creates an empty playlist at the front of the list.
    pub fn create_playlist(&mut self, name: &str) -> Result<&LocalPlaylist> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("El nombre de la lista no puede estar vacío");
        }

        let id = self.unique_id("pl");
        let mut playlists = self.playlists.clone();
        playlists.insert(0, LocalPlaylist::new(id, name));
        self.commit_playlists(playlists)?;
        info!("📝 Lista creada: {}", name);
        Ok(&self.playlists[0])
    }

    pub fn rename_playlist(&mut self, id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("El nombre de la lista no puede estar vacío");
        }
        let mut playlists = self.playlists.clone();
        find_mut(&mut playlists, id)?.name = name.to_string();
        self.commit_playlists(playlists)
    }

    pub fn delete_playlist(&mut self, id: &str) -> Result<LocalPlaylist> {
        let index = self
            .playlists
            .iter()
            .position(|p| p.id == id)
            .with_context(|| format!("Lista no encontrada: {}", id))?;
        let mut playlists = self.playlists.clone();
        let removed = playlists.remove(index);
        self.commit_playlists(playlists)?;
        info!("🗑️ Lista eliminada: {}", removed.name);
        Ok(removed)
    }

    /// Appends a song unless the playlist already has it. Returns whether it was added.
    pub fn add_to_playlist(&mut self, id: &str, song: Song) -> Result<bool> {
        if id == FAVORITES_ID {
            if self.is_favorite(&song) {
                return Ok(false);
            }
            return self.toggle_favorite(song);
        }

        let mut playlists = self.playlists.clone();
        let playlist = find_mut(&mut playlists, id)?;
        if playlist.contains(&song) {
            debug!("Canción ya presente en '{}'", playlist.name);
            return Ok(false);
        }
        playlist.songs.push(song);
        self.commit_playlists(playlists)?;
        Ok(true)
    }

    /// Adds the song if missing, removes it otherwise. `favorites` routes to
    /// [`Library::toggle_favorite`]. Returns whether the song is now present.
    pub fn toggle_in_playlist(&mut self, id: &str, song: Song) -> Result<bool> {
        if id == FAVORITES_ID {
            return self.toggle_favorite(song);
        }

        let mut playlists = self.playlists.clone();
        let playlist = find_mut(&mut playlists, id)?;
        let present = match playlist.songs.iter().position(|s| s.same_as(&song)) {
            Some(index) => {
                playlist.songs.remove(index);
                false
            }
            None => {
                playlist.songs.push(song);
                true
            }
        };
        self.commit_playlists(playlists)?;
        Ok(present)
    }

    /// Stores a gateway playlist as a local one.
    ///
    /// Songs without a cover get the gateway cover URL.
    pub fn import_playlist(&mut self, source: Platform, mut data: PlaylistData) -> Result<&LocalPlaylist> {
        for song in &mut data.list {
            if song.pic.as_deref().map_or(true, str::is_empty) {
                song.pic = Some(build_file_url(&self.base_url, song.platform, &song.id, FileKind::Pic, None));
            }
        }

        let id = self.unique_id(&format!("import-{}", source));
        let playlist = to_local_playlist(data, ImportOptions::new(id, IMPORTED_PLAYLIST_NAME, source));
        let (name, count) = (playlist.name.clone(), playlist.songs.len());

        let mut playlists = self.playlists.clone();
        playlists.insert(0, playlist);
        self.commit_playlists(playlists)?;
        info!("📥 Lista importada: {} ({} canciones)", name, count);
        Ok(&self.playlists[0])
    }

    pub fn cover(&self, playlist: &LocalPlaylist) -> Option<String> {
        playlist_cover(playlist, &self.base_url)
    }

    fn unique_id(&self, prefix: &str) -> String {
        let mut stamp = self.clock.now_millis();
        loop {
            let id = format!("{}-{}", prefix, stamp);
            if self.playlist(&id).is_none() {
                return id;
            }
            stamp += 1;
        }
    }

    /// Persists `playlists` and only then replaces the in-memory list.
    fn commit_playlists(&mut self, playlists: Vec<LocalPlaylist>) -> Result<()> {
        save_json(&self.store, PLAYLISTS_KEY, &playlists)?;
        self.playlists = playlists;
        Ok(())
    }
}

fn find_mut<'a>(playlists: &'a mut [LocalPlaylist], id: &str) -> Result<&'a mut LocalPlaylist> {
    playlists
        .iter_mut()
        .find(|p| p.id == id)
        .with_context(|| format!("Lista no encontrada: {}", id))
}

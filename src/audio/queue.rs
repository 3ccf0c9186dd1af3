use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::sources::Song;

/// Modo de reproducción
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Recorre la lista y vuelve al principio
    #[default]
    List,
    Shuffle,
    /// Repite la canción actual al terminar
    Single,
}

impl PlayMode {
    pub fn next_mode(self) -> Self {
        match self {
            PlayMode::List => PlayMode::Shuffle,
            PlayMode::Shuffle => PlayMode::Single,
            PlayMode::Single => PlayMode::List,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlayMode::List => "列表循环",
            PlayMode::Shuffle => "随机播放",
            PlayMode::Single => "单曲循环",
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resultado de terminar una pista
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEnd {
    pub song: Song,
    /// `true` cuando la misma canción debe reiniciarse desde 0
    pub restart: bool,
}

/// Cola de reproducción con índice actual
///
/// Songs are identified by `(id, platform)`; the RNG used for shuffle is
/// injectable so behaviour can be reproduced.
#[derive(Debug)]
pub struct PlayQueue<R = StdRng> {
    items: Vec<Song>,
    current: Option<usize>,
    mode: PlayMode,
    rng: R,
}

impl PlayQueue<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for PlayQueue<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> PlayQueue<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            items: Vec::new(),
            current: None,
            mode: PlayMode::default(),
            rng,
        }
    }

    /// Reemplaza la cola completa y empieza en `index` (acotado)
    pub fn set_queue(&mut self, songs: Vec<Song>, index: usize) -> Option<&Song> {
        if songs.is_empty() {
            debug!("📭 Cola vacía ignorada");
            return self.current();
        }

        let bounded = index.min(songs.len() - 1);
        info!("📋 Cola reemplazada: {} canciones, empezando en {}", songs.len(), bounded);
        self.items = songs;
        self.current = Some(bounded);
        self.current()
    }

    /// Reproduce una canción, reutilizando su posición si ya está en la cola
    pub fn play_song(&mut self, song: Song) -> &Song {
        let index = match self.items.iter().position(|s| s.same_as(&song)) {
            Some(index) => index,
            None => {
                info!("➕ Agregado a la cola: {}", song.name);
                self.items.push(song);
                self.items.len() - 1
            }
        };
        self.current = Some(index);
        &self.items[index]
    }

    /// Salta a una posición concreta
    pub fn select(&mut self, index: usize) -> Result<&Song> {
        if index >= self.items.len() {
            anyhow::bail!("Índice fuera de rango: {} (cola de {})", index, self.items.len());
        }
        self.current = Some(index);
        Ok(&self.items[index])
    }

    pub fn next(&mut self) -> Option<&Song> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }

        let index = if self.mode == PlayMode::Shuffle {
            let mut candidate = self.rng.gen_range(0..len);
            while len > 1 && Some(candidate) == self.current {
                candidate = self.rng.gen_range(0..len);
            }
            debug!("🔀 Seleccionado aleatoriamente: {}", candidate);
            candidate
        } else {
            self.current.map_or(0, |current| (current + 1) % len)
        };

        self.current = Some(index);
        self.items.get(index)
    }

    pub fn previous(&mut self) -> Option<&Song> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }

        let index = if self.mode == PlayMode::Shuffle {
            self.rng.gen_range(0..len)
        } else {
            self.current.map_or(len - 1, |current| (current + len - 1) % len)
        };

        self.current = Some(index);
        self.items.get(index)
    }

    /// La pista actual terminó: repetir en `Single`, avanzar en los demás modos
    pub fn on_track_ended(&mut self) -> Option<TrackEnd> {
        if self.mode == PlayMode::Single {
            if let Some(song) = self.current() {
                info!("🔂 Repitiendo: {}", song.name);
                return Some(TrackEnd {
                    song: song.clone(),
                    restart: true,
                });
            }
        }

        self.next().cloned().map(|song| TrackEnd { song, restart: false })
    }

    pub fn cycle_mode(&mut self) -> PlayMode {
        self.set_mode(self.mode.next_mode());
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
        match mode {
            PlayMode::List => info!("🔁 Modo lista activado"),
            PlayMode::Shuffle => info!("🔀 Modo aleatorio activado"),
            PlayMode::Single => info!("🔂 Repetir canción activado"),
        }
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    /// Elimina la canción en `index`, ajustando la posición actual
    pub fn remove(&mut self, index: usize) -> Result<Song> {
        if index >= self.items.len() {
            anyhow::bail!("Índice fuera de rango: {} (cola de {})", index, self.items.len());
        }

        let removed = self.items.remove(index);
        self.current = match self.current {
            Some(current) if index < current => Some(current - 1),
            Some(current) if index == current => {
                if self.items.is_empty() {
                    None
                } else {
                    Some(index.min(self.items.len() - 1))
                }
            }
            other => other,
        };

        debug!("❌ Eliminada de la cola: {}", removed.name);
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current = None;
        info!("🗑️ Cola limpiada");
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.and_then(|index| self.items.get(index))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn songs(&self) -> &[Song] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

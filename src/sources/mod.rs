//! # Sources Module
//!
//! Access to the music gateway that fronts NetEase Cloud Music, Kuwo and
//! QQ Music.
//!
//! - [`gateway`]: raw HTTP calls ([`GatewayClient`]) behind the
//!   [`MusicGateway`] trait
//! - [`api`]: [`MusicApi`], the cached facade used by the rest of the app
//!
//! Types in this module are the normalised shapes handed to callers.
//! `Raw*` types mirror what the gateway returns before normalisation.

pub mod api;
pub mod gateway;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::cache::KeyPart;

pub use api::MusicApi;
pub use gateway::{build_file_url, GatewayClient, MusicGateway};

/// Plataformas de música soportadas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Netease,
    Kuwo,
    Qq,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Netease, Platform::Kuwo, Platform::Qq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Netease => "netease",
            Platform::Kuwo => "kuwo",
            Platform::Qq => "qq",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Platform::Netease => "网易云",
            Platform::Kuwo => "酷我",
            Platform::Qq => "QQ",
        }
    }

    pub fn long_label(&self) -> &'static str {
        match self {
            Platform::Netease => "网易云音乐",
            Platform::Kuwo => "酷我音乐",
            Platform::Qq => "QQ音乐",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown platform '{0}' (expected netease, kuwo or qq)")]
pub struct ParsePlatformError(String);

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "netease" => Ok(Platform::Netease),
            "kuwo" => Ok(Platform::Kuwo),
            "qq" => Ok(Platform::Qq),
            other => Err(ParsePlatformError(other.to_string())),
        }
    }
}

impl From<Platform> for KeyPart {
    fn from(value: Platform) -> Self {
        KeyPart::from(value.as_str())
    }
}

/// Calidad de audio solicitada al gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "128k")]
    Standard,
    #[serde(rename = "320k")]
    High,
    #[serde(rename = "flac")]
    Lossless,
    #[serde(rename = "flac24bit")]
    HiRes,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Standard => "128k",
            Quality::High => "320k",
            Quality::Lossless => "flac",
            Quality::HiRes => "flac24bit",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "128k" => Ok(Quality::Standard),
            "320k" => Ok(Quality::High),
            "flac" => Ok(Quality::Lossless),
            "flac24bit" => Ok(Quality::HiRes),
            other => Err(format!("unknown quality '{}'", other)),
        }
    }
}

/// File resources served directly by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Url,
    Pic,
    Lrc,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Url => "url",
            FileKind::Pic => "pic",
            FileKind::Lrc => "lrc",
        }
    }
}

/// Kuwo and QQ hand out numeric ids; everything is kept as a string.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Representa una canción normalizada
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
}

impl Song {
    /// Identity across platforms: the same id on two platforms is two songs.
    pub fn same_as(&self, other: &Song) -> bool {
        self.id == other.id && self.platform == other.platform
    }
}

/// Song as returned upstream, platform possibly missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSong {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub pic: Option<String>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
}

impl RawSong {
    /// Keeps the upstream platform, falling back to `default`.
    pub fn with_default_platform(self, default: Platform) -> Song {
        let platform = self.platform.unwrap_or(default);
        self.with_platform(platform)
    }

    /// Overrides whatever platform upstream reported.
    pub fn with_platform(self, platform: Platform) -> Song {
        Song {
            id: self.id,
            name: self.name,
            artist: self.artist,
            album: self.album,
            platform,
            pic: self.pic,
            types: self.types,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pic: String,
    #[serde(default)]
    pub lrc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub results: Vec<Song>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawSearchData {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub results: Option<Vec<RawSong>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistData {
    pub list: Vec<Song>,
    pub info: PlaylistInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Platform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawPlaylistData {
    #[serde(default)]
    pub list: Option<Vec<RawSong>>,
    #[serde(default)]
    pub info: Option<PlaylistInfo>,
    #[serde(default)]
    pub source: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToplistSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawToplists {
    #[serde(default)]
    pub list: Option<Vec<ToplistSummary>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToplistSongs {
    pub list: Vec<Song>,
    pub source: Platform,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawToplistData {
    #[serde(default)]
    pub list: Option<Vec<RawSong>>,
    #[serde(default)]
    pub source: Option<Platform>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn platform_parsing_and_labels() {
        assert_eq!("NetEase".parse::<Platform>().unwrap(), Platform::Netease);
        assert_eq!(" qq ".parse::<Platform>().unwrap(), Platform::Qq);
        assert!("spotify".parse::<Platform>().is_err());
        assert_eq!(Platform::Kuwo.to_string(), "kuwo");
        assert_eq!(Platform::Kuwo.long_label(), "酷我音乐");
        assert_eq!(serde_json::to_value(Platform::Qq).unwrap(), json!("qq"));
    }

    #[test]
    fn raw_songs_accept_numeric_ids_and_missing_platform() {
        let raw: RawSong = serde_json::from_value(json!({
            "id": 123456,
            "name": "晴天",
            "artist": "周杰伦"
        }))
        .unwrap();
        assert_eq!(raw.id, "123456");
        assert_eq!(raw.platform, None);

        let song = raw.clone().with_default_platform(Platform::Kuwo);
        assert_eq!(song.platform, Platform::Kuwo);

        let tagged = RawSong {
            platform: Some(Platform::Qq),
            ..raw
        };
        assert_eq!(tagged.clone().with_default_platform(Platform::Kuwo).platform, Platform::Qq);
        assert_eq!(tagged.with_platform(Platform::Netease).platform, Platform::Netease);
    }

    #[test]
    fn quality_wire_names() {
        assert_eq!(serde_json::to_value(Quality::HiRes).unwrap(), json!("flac24bit"));
        assert_eq!("128k".parse::<Quality>().unwrap(), Quality::Standard);
        assert_eq!(Quality::High.as_str(), "320k");
    }
}

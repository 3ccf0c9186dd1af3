//! # Inspire Music
//!
//! Client-side core of a multi-platform music player: a size-bounded,
//! TTL-based response cache over persistent key/value storage, the
//! gateway access layer that sits on top of it, lyric synchronisation,
//! the play queue and the local library.
//!
//! ## Modules
//!
//! - [`cache`]: response cache engine, key derivation, eviction
//! - [`storage`]: key/value backends with quota accounting
//! - [`sources`]: gateway client and the cached [`sources::MusicApi`]
//! - [`lyrics`]: LRC parsing and translation alignment
//! - [`audio`]: play queue and play modes
//! - [`library`]: favourites and local playlists
//! - [`config`]: environment-driven configuration

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod library;
pub mod lyrics;
pub mod sources;
pub mod storage;

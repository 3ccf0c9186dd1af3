//! # Audio Module
//!
//! Playback state that lives next to the audio element: the play queue
//! and its play modes.
//!
//! ### [`queue`] - Queue Management
//! - List, shuffle and single-track repeat modes
//! - Songs identified by `(id, platform)`, so the same id from two
//!   platforms can sit in one queue
//! - Injectable RNG for shuffle
//!
//! ## Example Usage
//!
//! ```rust
//! use inspire_music::audio::queue::{PlayMode, PlayQueue};
//! use inspire_music::sources::{Platform, Song};
//!
//! let song = |id: &str| Song {
//!     id: id.to_string(),
//!     name: id.to_string(),
//!     artist: None,
//!     album: None,
//!     platform: Platform::Netease,
//!     pic: None,
//!     types: None,
//! };
//!
//! let mut queue = PlayQueue::new();
//! queue.set_queue(vec![song("1"), song("2")], 0);
//! assert_eq!(queue.next().map(|s| s.id.as_str()), Some("2"));
//! assert_eq!(queue.cycle_mode(), PlayMode::Shuffle);
//! ```

pub mod queue;

pub use queue::{PlayMode, PlayQueue, TrackEnd};

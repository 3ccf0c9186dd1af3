//! Command-line surface for `inspire-music`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use inspire_music::sources::{Platform, Quality};

#[derive(Parser, Debug)]
#[command(name = "inspire-music", version, about = "Cached music gateway client", long_about = None)]
pub struct Cli {
    /// Root of the persistent store (overrides DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Gateway base URL (overrides API_BASE_URL)
    #[arg(long, global = true)]
    pub api_base_url: Option<String>,

    /// Let the startup cache sweep wait out its delay instead of running it on exit
    #[arg(long, global = true, default_value_t = false)]
    pub wait_sweep: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search one platform
    Search {
        keyword: String,
        #[arg(long, short, default_value_t = Platform::Netease)]
        source: Platform,
        /// Page size (defaults to DEFAULT_SEARCH_LIMIT)
        #[arg(long, short)]
        limit: Option<u32>,
    },
    /// Search every platform at once
    Aggregate { keyword: String },
    /// Song metadata
    Info { source: Platform, id: String },
    /// Lyrics for a song
    Lyrics {
        source: Platform,
        id: String,
        /// Print parsed lines with translations instead of raw LRC
        #[arg(long, default_value_t = false)]
        parsed: bool,
    },
    /// Direct stream URL for a song
    Url {
        source: Platform,
        id: String,
        /// 128k, 320k, flac or flac24bit (defaults to DEFAULT_QUALITY)
        #[arg(long, short)]
        quality: Option<Quality>,
    },
    /// Playlist contents
    Playlist { source: Platform, id: String },
    /// Charts available on a platform
    Toplists { source: Platform },
    /// Songs of one chart
    Toplist { source: Platform, id: String },
    /// Response cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheCmd,
    },
    /// Favourites and local playlists
    Library {
        #[command(subcommand)]
        action: LibraryCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCmd {
    /// Entry count, total size and per-entry ages
    Stats,
    /// Drop every cached response
    Clear,
    /// Remove expired and corrupted entries now
    Cleanup,
}

#[derive(Subcommand, Debug)]
pub enum LibraryCmd {
    /// List favourites and playlists
    List,
    /// Import a gateway playlist as a local one
    Import { source: Platform, id: String },
    /// Create an empty playlist
    Create { name: String },
    /// Delete a local playlist
    Delete { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_with_defaults() {
        let cli = Cli::try_parse_from(["inspire-music", "search", "晴天"]).unwrap();
        match cli.command {
            Commands::Search { keyword, source, limit } => {
                assert_eq!(keyword, "晴天");
                assert_eq!(source, Platform::Netease);
                assert_eq!(limit, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_platform() {
        assert!(Cli::try_parse_from(["inspire-music", "info", "spotify", "1"]).is_err());
        let cli = Cli::try_parse_from(["inspire-music", "--data-dir", "/tmp/x", "url", "qq", "7", "-q", "flac"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(
            cli.command,
            Commands::Url {
                quality: Some(Quality::Lossless),
                ..
            }
        ));
    }
}

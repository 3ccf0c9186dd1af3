use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

mod cli;

use crate::cli::{CacheCmd, Cli, Commands, LibraryCmd};
use inspire_music::cache::{finish_startup_cleanup, spawn_startup_cleanup, ResponseCache};
use inspire_music::config::Config;
use inspire_music::library::Library;
use inspire_music::lyrics::parse_lyrics;
use inspire_music::sources::{FileKind, GatewayClient, MusicApi};
use inspire_music::storage::{JsonFileStore, KeyValueStore, MemoryStore};

type Store = Arc<dyn KeyValueStore>;
type Api = MusicApi<GatewayClient, Store>;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging (stdout queda libre para la salida JSON)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inspire_music=debug".parse()?)
                .add_directive("reqwest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("🎵 Iniciando Inspire Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let mut config = Config::load()?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    if let Some(url) = cli.api_base_url.clone() {
        config.api_base_url = url;
        config.validate()?;
    }
    debug!("{}", config.summary());

    let store = open_store(&config);
    let cache = Arc::new(ResponseCache::new(store.clone(), config.cache_config()));
    let sweep = spawn_startup_cleanup(cache.clone());

    let gateway = GatewayClient::new(&config.api_base_url, config.request_timeout)?;
    let api: Api = MusicApi::new(gateway, cache.clone());

    let outcome = run(cli.command, &api, &config, store).await;

    if cli.wait_sweep {
        if let Err(e) = sweep.await {
            warn!("⚠️ Limpieza inicial interrumpida: {}", e);
        }
    } else {
        finish_startup_cleanup(&cache, sweep).await;
    }

    if let Err(e) = &outcome {
        error!("❌ {:#}", e);
    }
    outcome
}

/// Abre el almacenamiento persistente, con memoria como respaldo
fn open_store(config: &Config) -> Store {
    match JsonFileStore::open(&config.data_dir) {
        Ok(store) => {
            info!("💾 Almacenamiento en {}", config.data_dir.display());
            Arc::new(store)
        }
        Err(e) => {
            warn!("⚠️ No se pudo abrir {}: {}. Usando memoria", config.data_dir.display(), e);
            Arc::new(MemoryStore::new())
        }
    }
}

async fn run(command: Commands, api: &Api, config: &Config, store: Store) -> Result<()> {
    match command {
        Commands::Search { keyword, source, limit } => {
            let limit = limit.unwrap_or(config.default_search_limit);
            print_json(&api.search(source, &keyword, limit).await?)
        }
        Commands::Aggregate { keyword } => print_json(&api.aggregate_search(&keyword).await?),
        Commands::Info { source, id } => print_json(&api.song_info(source, &id).await?),
        Commands::Lyrics { source, id, parsed } => {
            let lrc = api.lyrics(source, &id).await?;
            if parsed {
                print_json(&parse_lyrics(&lrc))
            } else {
                println!("{}", lrc);
                Ok(())
            }
        }
        Commands::Url { source, id, quality } => {
            let quality = quality.unwrap_or(config.default_quality);
            println!("{}", api.gateway().file_url(source, &id, FileKind::Url, Some(quality)));
            Ok(())
        }
        Commands::Playlist { source, id } => print_json(&api.playlist(source, &id).await?),
        Commands::Toplists { source } => print_json(&api.toplists(source).await?),
        Commands::Toplist { source, id } => print_json(&api.toplist_songs(source, &id).await?),
        Commands::Cache { action } => match action {
            CacheCmd::Stats => {
                let stats = api.cache_stats();
                info!("{}", stats);
                print_json(&stats)
            }
            CacheCmd::Clear => {
                api.clear_cache();
                info!("🧹 Caché vaciado");
                Ok(())
            }
            CacheCmd::Cleanup => print_json(&api.cleanup_cache()),
        },
        Commands::Library { action } => {
            let mut library = Library::load(store, config.api_base_url.clone());
            match action {
                LibraryCmd::List => {
                    let mut playlists = vec![library.favorites_playlist()];
                    playlists.extend(library.playlists().iter().cloned());
                    let listing: Vec<_> = playlists
                        .iter()
                        .map(|p| {
                            serde_json::json!({
                                "id": p.id,
                                "name": p.name,
                                "songs": p.songs.len(),
                                "cover": library.cover(p),
                            })
                        })
                        .collect();
                    print_json(&listing)
                }
                LibraryCmd::Import { source, id } => {
                    let data = api.playlist(source, &id).await?;
                    print_json(library.import_playlist(source, data)?)
                }
                LibraryCmd::Create { name } => print_json(library.create_playlist(&name)?),
                LibraryCmd::Delete { id } => print_json(&library.delete_playlist(&id)?),
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use std::env;
use std::path::PathBuf;

use library::{CacheConfig, Indexer, IndexerOptions, MetadataCache, WatchOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let library_root = args
        .next()
        .or_else(|| env::var("LIBRARY_ROOT").ok())
        .ok_or("LIBRARY_ROOT not set and no path argument")?;
    let query = args.collect::<Vec<_>>().join(" ");
    let cache_path = env::var("CACHE_PATH")
        .unwrap_or_else(|_| "cache/metadata-store.json".to_string());

    let cache = MetadataCache::new(CacheConfig {
        store_path: Some(PathBuf::from(&cache_path)),
        ..CacheConfig::default()
    });
    let indexer = Indexer::new(
        cache,
        IndexerOptions {
            watch: WatchOptions {
                enabled: false,
                ..WatchOptions::default()
            },
            debug_perf: env::var("DEBUG_PERF").is_ok(),
            ..IndexerOptions::default()
        },
    );

    let root = PathBuf::from(&library_root);
    let playlists = indexer.scan_playlists(&root).await?;
    let videos = indexer.scan_all_videos(&root).await?;
    println!(
        "Indexed: {} playlists, {} videos",
        playlists.len(),
        videos.len()
    );

    if !query.trim().is_empty() {
        let results = library::search::search(&videos, &query);
        println!("{} matches for {:?}", results.len(), query);
        for video in results.iter().take(20) {
            println!(
                "  {}  {}  {}",
                video.upload_date.as_deref().unwrap_or("--------"),
                video.title,
                video.path.display()
            );
        }
    }

    let stats = indexer.cache().stats();
    info!(
        "Cache: {} entries, {} hits, {} sidecar reads",
        stats.entries, stats.hits, stats.reads
    );
    indexer.shutdown().await;
    Ok(())
}

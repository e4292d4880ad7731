mod gate;
mod indexer;
pub mod search;
mod watch;

use std::path::PathBuf;

pub use gate::{IoGate, DEFAULT_CONCURRENCY};
pub use indexer::{sort_videos, Indexer, IndexerOptions};
pub use metadata::{CacheConfig, MetadataCache};
pub use watch::{
    apply_event, FileWatcher, WatchEvent, WatchOptions, DEFAULT_STABILITY, DEFAULT_WATCH_DEPTH,
};

#[derive(Debug)]
pub enum IndexerError {
    DirectoryNotFound(PathBuf),
    Io(std::io::Error),
}

impl std::fmt::Display for IndexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexerError::DirectoryNotFound(path) => {
                write!(f, "directory not found: {}", path.display())
            }
            IndexerError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for IndexerError {}

impl From<std::io::Error> for IndexerError {
    fn from(err: std::io::Error) -> Self {
        IndexerError::Io(err)
    }
}

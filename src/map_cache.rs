use crate::config::Config;
use crate::fingerprint::{CacheFingerprint, CacheFingerprintGuard, RENDERER_VERSION};
use crate::tile_change::TileChangeDetector;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_map::{CacheIoError, ChunkSource, HashingStats, RegionHashIndex, RegionIndexError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapCacheError {
    #[error("failed to serialize settings for the cache fingerprint: {0}")]
    Fingerprint(#[from] ron::Error),
    #[error(transparent)]
    Io(#[from] CacheIoError),
    #[error(transparent)]
    Protocol(#[from] RegionIndexError),
}

/// The on-disk cache of one layer, opened in the only safe order: fingerprint check first, then the chunk hash index.
///
/// With `cache.use_cache` off, the fingerprint file and tile digests are left alone and every tile is reported as
/// changed. The chunk hash index is still rebuilt, since it is only valid for one run anyway.
pub struct MapCache {
    dir: PathBuf,
    reused: bool,
    config: Config,
    chunk_hashes: Arc<RegionHashIndex>,
    detector: Arc<TileChangeDetector>,
}

impl MapCache {
    pub fn open(dir: &Path, config: &Config) -> Result<Self, MapCacheError> {
        let reused = if config.cache.use_cache {
            let fingerprint =
                CacheFingerprint::compute(RENDERER_VERSION, &config.fingerprint_text()?, config.hash_algorithm);
            CacheFingerprintGuard::validate_or_reset(dir, &fingerprint)?
        } else {
            log::info!("tile cache disabled, every visible tile will be rendered");
            false
        };
        let chunk_hashes = Arc::new(RegionHashIndex::create(dir, config.cache.region_hashes)?);
        let detector = if config.cache.use_cache {
            TileChangeDetector::new(dir.to_owned(), chunk_hashes.clone(), config.hash_algorithm)
        } else {
            TileChangeDetector::disabled(dir.to_owned(), chunk_hashes.clone(), config.hash_algorithm)
        };
        let detector = Arc::new(detector);
        Ok(Self {
            dir: dir.to_owned(),
            reused,
            config: config.clone(),
            chunk_hashes,
            detector,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the previous run's tile digests survived the fingerprint check.
    pub fn reused(&self) -> bool {
        self.reused
    }

    pub fn chunk_hashes(&self) -> &Arc<RegionHashIndex> {
        &self.chunk_hashes
    }

    pub fn detector(&self) -> &Arc<TileChangeDetector> {
        &self.detector
    }

    /// Hashes every chunk of `source` that the configured subset accepts. Must finish before any staleness check.
    pub fn hash_world<S: ChunkSource + ?Sized>(&self, source: &S) -> Result<HashingStats, MapCacheError> {
        Ok(self
            .chunk_hashes
            .hashing_pass(source, &self.config.map.subset, &self.config.hash_algorithm)?)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

use std::path::Path;
use strata_map::{read_digest_file, recreate_dir, write_digest_file, CacheIoError, ChunkHash, HashAlgorithm};

/// Bump whenever a renderer change makes every previously cached digest meaningless.
pub const RENDERER_VERSION: u32 = 14;

/// Name of the fingerprint file at the root of a cache directory.
pub const MASTER_CACHE_FILE: &str = "tiles.cache";

/// Everything that invalidates a cache directory when it changes: the renderer version, the hash algorithm, and the
/// rendering configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheFingerprint {
    text: String,
    algo: HashAlgorithm,
}

impl CacheFingerprint {
    pub fn compute(version: u32, config_text: &str, algo: HashAlgorithm) -> Self {
        let text = format!("{}\n{}\n{}\n", version, algo.id(), config_text);
        Self { text, algo }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The bytes stored in the fingerprint file.
    pub fn digest(&self) -> ChunkHash {
        self.algo.digest(self.text.as_bytes())
    }

    /// Whether a stored fingerprint file describes the same cache.
    pub fn matches(&self, stored: &[u8]) -> bool {
        stored == self.digest().as_bytes()
    }
}

/// Gatekeeper for a cache directory. Must run before anything else reads or writes below `dir`, because no other cache
/// file carries a version of its own.
pub struct CacheFingerprintGuard;

impl CacheFingerprintGuard {
    /// Returns `Ok(true)` when the existing cache in `dir` was built with the same fingerprint and can be reused.
    /// Otherwise wipes `dir`, writes the new fingerprint and returns `Ok(false)`.
    pub fn validate_or_reset(dir: &Path, fingerprint: &CacheFingerprint) -> Result<bool, CacheIoError> {
        let master = dir.join(MASTER_CACHE_FILE);
        let stored = match read_digest_file(&master) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        };
        if let Some(stored) = stored {
            if fingerprint.matches(&stored) {
                log::info!("cache at {} is valid, reusing it", dir.display());
                return Ok(true);
            }
        }

        log::info!("settings changed, wiping cache at {}", dir.display());
        recreate_dir(dir)?;
        write_digest_file(&master, fingerprint.digest().as_bytes())?;
        Ok(false)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

use itertools::Itertools;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::SmallKeyHashMap;
use strata_map::{
    read_digest_file, write_digest_file, CacheIoError, ChunkCoord, ChunkHash, HashAlgorithm, RegionHashIndex,
    SignEntity, TileCoord,
};
use thiserror::Error;

/// Bump whenever the view renderer changes in a way that invalidates rendered views.
pub const VIEW_RENDERER_VERSION: u32 = 6;

/// An output image whose inputs are tracked by a digest file.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum DigestTarget {
    Tile(TileCoord),
    /// A perspective view placed by a sign in the world. The sign text configures the view, so it is part of the digest.
    View {
        x: i32,
        y: i32,
        z: i32,
        text: [String; 4],
    },
}

impl DigestTarget {
    pub fn view(sign: &SignEntity) -> Self {
        DigestTarget::View {
            x: sign.x,
            y: sign.y,
            z: sign.z,
            text: sign.text.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            DigestTarget::Tile(tile) => format!("tile_{}_{}.cache", tile.x, tile.y),
            DigestTarget::View { x, y, z, .. } => format!("view_{}_{}_{}.cache", x, y, z),
        }
    }

    fn feed_prefix(&self, hasher: &mut blake3::Hasher) {
        if let DigestTarget::View { text, .. } = self {
            hasher.update(&VIEW_RENDERER_VERSION.to_be_bytes());
            for line in text {
                hasher.update(line.as_bytes());
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("no pending digest for {0:?}")]
    NoPendingDigest(DigestTarget),
    #[error(transparent)]
    Io(#[from] CacheIoError),
}

/// Decides which output images must be re-rendered by comparing a digest of their contributing chunks against the digest
/// stored when the image was last written.
///
/// Digests of stale targets are held in memory until [`commit`](TileChangeDetector::commit) is called after the image
/// has been written. A run that dies in between leaves the old digest on disk, so the target is found stale again.
pub struct TileChangeDetector {
    dir: PathBuf,
    chunk_hashes: Arc<RegionHashIndex>,
    algo: HashAlgorithm,
    persistent: bool,
    pending: Mutex<SmallKeyHashMap<DigestTarget, ChunkHash>>,
}

impl TileChangeDetector {
    /// Digest files live directly in `dir`, next to the fingerprint file.
    pub fn new(dir: PathBuf, chunk_hashes: Arc<RegionHashIndex>, algo: HashAlgorithm) -> Self {
        Self {
            dir,
            chunk_hashes,
            algo,
            persistent: true,
            pending: Mutex::new(SmallKeyHashMap::default()),
        }
    }

    /// A detector for runs with caching turned off. Every target is stale, and nothing is read from or written to `dir`.
    pub fn disabled(dir: PathBuf, chunk_hashes: Arc<RegionHashIndex>, algo: HashAlgorithm) -> Self {
        Self {
            persistent: false,
            ..Self::new(dir, chunk_hashes, algo)
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether digests are stored across runs.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn digest_file(&self, target: &DigestTarget) -> PathBuf {
        self.dir.join(target.file_name())
    }

    /// Combines the hashes of `contributing` in canonical chunk order. Chunks without a hash are skipped.
    pub fn compute_digest(&self, target: &DigestTarget, contributing: &[ChunkCoord]) -> ChunkHash {
        let mut hasher = self.algo.hasher();
        target.feed_prefix(&mut hasher);
        for coord in contributing.iter().copied().sorted() {
            if let Some(hash) = self.chunk_hashes.get_chunk_hash(coord) {
                hasher.update(hash.as_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// Returns whether `target` must be re-rendered, along with its fresh digest.
    ///
    /// A missing image is always stale. An existing image with no contributing chunks never is. Otherwise the target is
    /// stale unless its stored digest equals the fresh one; a missing or unreadable digest file counts as stale.
    pub fn is_stale(
        &self,
        target: &DigestTarget,
        contributing: &[ChunkCoord],
        output_image_exists: bool,
    ) -> (bool, ChunkHash) {
        let digest = self.compute_digest(target, contributing);
        if !self.persistent || !output_image_exists {
            return (true, digest);
        }
        if contributing.is_empty() {
            return (false, digest);
        }
        let stale = match read_digest_file(&self.digest_file(target)) {
            Ok(Some(stored)) => stored != digest.as_bytes(),
            Ok(None) => true,
            Err(e) => {
                log::warn!("{}", e);
                true
            }
        };
        (stale, digest)
    }

    /// [`is_stale`](Self::is_stale), remembering the digest of a stale target for a later
    /// [`commit`](Self::commit).
    pub fn check(&self, target: &DigestTarget, contributing: &[ChunkCoord], output_image_exists: bool) -> bool {
        let (stale, digest) = self.is_stale(target, contributing, output_image_exists);
        if stale && self.persistent {
            self.pending.lock().insert(target.clone(), digest);
        }
        stale
    }

    /// Checks every target in order and returns the stale ones.
    pub fn find_changed<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a DigestTarget>,
        mut visible_chunks: impl FnMut(&DigestTarget) -> Vec<ChunkCoord>,
        mut image_exists: impl FnMut(&DigestTarget) -> bool,
    ) -> Vec<DigestTarget> {
        let mut checked = 0;
        let changed: Vec<_> = targets
            .into_iter()
            .inspect(|_| checked += 1)
            .filter(|&target| self.check(target, &visible_chunks(target), image_exists(target)))
            .cloned()
            .collect();
        log::info!("{} of {} targets changed", changed.len(), checked);
        changed
    }

    /// Persists the pending digest of `target`. Call only after its image has been written. Does nothing when the
    /// detector is [`disabled`](Self::disabled).
    pub fn commit(&self, target: &DigestTarget) -> Result<(), CommitError> {
        if !self.persistent {
            return Ok(());
        }
        let digest = self
            .pending
            .lock()
            .remove(target)
            .ok_or_else(|| CommitError::NoPendingDigest(target.clone()))?;
        write_digest_file(&self.digest_file(target), digest.as_bytes())?;
        Ok(())
    }

    pub fn num_pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Forgets all pending digests.
    pub fn reset(&self) {
        self.pending.lock().clear();
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

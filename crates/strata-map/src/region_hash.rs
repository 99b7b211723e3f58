//! Persisted, region-partitioned index of chunk digests.
//!
//! Each region that was hashed gets one file, `r-{x}-{z}.hashes`, in the `hashStore` directory of the cache:
//!
//! ```text
//! u32 magic (0xCAFEBABE)
//! u32 count
//! count x { u32 entry magic (0xFEEFEE), i64 chunk x, i64 chunk z, u32 hash length, hash bytes }
//! ```
//!
//! All integers are big-endian. Writing is a single-writer protocol: one [`RegionHandle`] may be open at a time, and the
//! batch it collects becomes visible to readers once [`RegionHashIndex::end_region`] persists it.

use crate::cache_io::{recreate_dir, CacheIoError};
use crate::coordinates::{ChunkCoord, RegionCoord};
use crate::hasher::{hash_chunk, ChunkHash, HashAlgorithm, CHUNK_HASH_LEN};
use crate::loader::read_masked_chunk;
use crate::region_file::ChunkSource;
use crate::subset::WorldSubset;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use strata_core::LruList;
use thiserror::Error;

pub const REGION_HASH_MAGIC: u32 = 0xCAFE_BABE;
pub const REGION_HASH_ENTRY_MAGIC: u32 = 0x00FE_EFEE;
pub const HASH_STORE_DIR: &str = "hashStore";

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RegionHashConfig {
    /// Regions cached beyond this count get evicted.
    pub max_cached_regions: usize,
    /// Eviction never brings the cache below this many regions.
    pub min_cached_regions: usize,
}

impl Default for RegionHashConfig {
    fn default() -> Self {
        Self {
            max_cached_regions: 32,
            min_cached_regions: 16,
        }
    }
}

/// Misuse of the single-writer region protocol. Not recoverable.
#[derive(Debug, Eq, Error, PartialEq)]
pub enum RegionIndexError {
    #[error("region {active} is already being written")]
    AlreadyActive { active: RegionCoord },
    #[error("handle for region {0} is not the active writer")]
    WrongHandle(RegionCoord),
}

/// The chunk digests of one region.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegionHashBatch {
    pub region: RegionCoord,
    pub hashes: BTreeMap<ChunkCoord, ChunkHash>,
}

impl RegionHashBatch {
    pub fn new(region: RegionCoord) -> Self {
        Self {
            region,
            hashes: BTreeMap::new(),
        }
    }

    pub fn get(&self, coord: &ChunkCoord) -> Option<ChunkHash> {
        self.hashes.get(coord).copied()
    }

    pub fn write_to(&self, mut out: impl Write) -> io::Result<()> {
        out.write_u32::<BigEndian>(REGION_HASH_MAGIC)?;
        out.write_u32::<BigEndian>(self.hashes.len() as u32)?;
        for (coord, hash) in &self.hashes {
            out.write_u32::<BigEndian>(REGION_HASH_ENTRY_MAGIC)?;
            out.write_i64::<BigEndian>(coord.x)?;
            out.write_i64::<BigEndian>(coord.z)?;
            out.write_u32::<BigEndian>(hash.as_bytes().len() as u32)?;
            out.write_all(hash.as_bytes())?;
        }
        out.flush()
    }

    /// Reads a batch. Entries whose digest has an unexpected length are dropped, which makes the affected tiles stale.
    pub fn read_from(region: RegionCoord, mut input: impl Read) -> io::Result<Self> {
        if input.read_u32::<BigEndian>()? != REGION_HASH_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad region hash magic"));
        }
        let count = input.read_u32::<BigEndian>()?;
        let mut batch = Self::new(region);
        for _ in 0..count {
            if input.read_u32::<BigEndian>()? != REGION_HASH_ENTRY_MAGIC {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "bad region hash entry magic"));
            }
            let x = input.read_i64::<BigEndian>()?;
            let z = input.read_i64::<BigEndian>()?;
            let len = u64::from(input.read_u32::<BigEndian>()?);
            if len != CHUNK_HASH_LEN as u64 {
                // Never buffer a length taken from the file.
                let skipped = io::copy(&mut (&mut input).take(len), &mut io::sink())?;
                if skipped < len {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated region hash entry"));
                }
                log::debug!("{}: dropping {}-byte digest for ({}, {})", region, len, x, z);
                continue;
            }
            let mut buf = [0; CHUNK_HASH_LEN];
            input.read_exact(&mut buf)?;
            batch.hashes.insert(ChunkCoord::new(x, z), ChunkHash::from_bytes(buf));
        }
        Ok(batch)
    }
}

/// Proof of being the one writer of a region. Obtained from [`RegionHashIndex::begin_region`] and consumed by
/// [`RegionHashIndex::end_region`].
#[derive(Debug)]
pub struct RegionHandle {
    region: RegionCoord,
    serial: u32,
}

impl RegionHandle {
    pub fn region(&self) -> RegionCoord {
        self.region
    }
}

struct ActiveRegion {
    serial: u32,
    batch: RegionHashBatch,
}

/// Counts from one pass over every region.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HashingStats {
    pub regions: usize,
    pub chunks: usize,
    /// Chunks that were present but not hashed: filtered out or undecodable.
    pub skipped: usize,
}

pub struct RegionHashIndex {
    dir: PathBuf,
    config: RegionHashConfig,
    next_serial: AtomicU32,
    active: Mutex<Option<ActiveRegion>>,
    cache: Mutex<LruList<RegionCoord, Arc<RegionHashBatch>>>,
}

impl RegionHashIndex {
    /// Opens the index in `<cache_dir>/hashStore`, wiping anything a previous run left there. Chunk digests are always
    /// recomputed by [`Self::hashing_pass`]; only tile digests carry state across runs.
    pub fn create(cache_dir: &Path, config: RegionHashConfig) -> Result<Self, CacheIoError> {
        let dir = cache_dir.join(HASH_STORE_DIR);
        recreate_dir(&dir)?;
        Ok(Self::open_existing(dir, config))
    }

    /// Opens an index directory as is.
    pub fn open_existing(dir: PathBuf, config: RegionHashConfig) -> Self {
        Self {
            dir,
            config,
            next_serial: AtomicU32::new(1),
            active: Mutex::new(None),
            cache: Mutex::new(LruList::with_capacity(config.max_cached_regions + 1)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region_file(&self, region: RegionCoord) -> PathBuf {
        self.dir.join(format!("r-{}-{}.hashes", region.x, region.z))
    }

    pub fn begin_region(&self, region: RegionCoord) -> Result<RegionHandle, RegionIndexError> {
        let mut active = self.active.lock();
        if let Some(open) = active.as_ref() {
            return Err(RegionIndexError::AlreadyActive {
                active: open.batch.region,
            });
        }
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        *active = Some(ActiveRegion {
            serial,
            batch: RegionHashBatch::new(region),
        });
        Ok(RegionHandle { region, serial })
    }

    /// Adds one chunk digest to the open batch. `None` means the chunk was not hashed and is ignored.
    pub fn record(
        &self,
        handle: &RegionHandle,
        chunk: ChunkCoord,
        hash: Option<ChunkHash>,
    ) -> Result<(), RegionIndexError> {
        let mut active = self.active.lock();
        let open = match active.as_mut() {
            Some(open) if open.serial == handle.serial => open,
            _ => return Err(RegionIndexError::WrongHandle(handle.region)),
        };
        if let Some(hash) = hash {
            if !handle.region.contains(chunk) {
                log::warn!("chunk {} recorded into foreign region {}", chunk, handle.region);
            }
            open.batch.hashes.insert(chunk, hash);
        }
        Ok(())
    }

    /// Persists the open batch and makes it readable. A failed write is logged; the batch still serves reads for the rest
    /// of this run.
    pub fn end_region(&self, handle: RegionHandle) -> Result<(), RegionIndexError> {
        let batch = {
            let mut active = self.active.lock();
            match active.take() {
                Some(open) if open.serial == handle.serial => open.batch,
                other => {
                    *active = other;
                    return Err(RegionIndexError::WrongHandle(handle.region));
                }
            }
        };

        let path = self.region_file(batch.region);
        if let Err(e) = write_batch(&path, &batch) {
            log::warn!("{}", CacheIoError::new(path, e));
        }
        self.insert_cached(Arc::new(batch), true);
        Ok(())
    }

    /// Looks up the digest of `chunk`. Regions are read from disk on first use. `None` means the chunk was never hashed:
    /// either it does not exist, it was filtered out, or its region file is missing or unreadable.
    pub fn get_chunk_hash(&self, chunk: ChunkCoord) -> Option<ChunkHash> {
        let region = chunk.region();
        if let Some(batch) = self.cache.lock().get(&region) {
            return batch.get(&chunk);
        }

        // Load outside of the lock so that lookups in other regions are not blocked on this read.
        let loaded = Arc::new(self.load_region(region)?);
        self.insert_cached(loaded, false).get(&chunk)
    }

    /// Number of regions currently held in memory.
    pub fn num_cached_regions(&self) -> usize {
        self.cache.lock().len()
    }

    fn load_region(&self, region: RegionCoord) -> Option<RegionHashBatch> {
        let path = self.region_file(region);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("{}", CacheIoError::new(path, e));
                return None;
            }
        };
        match RegionHashBatch::read_from(region, BufReader::new(file)) {
            Ok(batch) => {
                log::debug!("loaded {} chunk hashes for {}", batch.hashes.len(), region);
                Some(batch)
            }
            Err(e) => {
                log::warn!("{}", CacheIoError::new(path, e));
                None
            }
        }
    }

    /// Caches `batch`. A batch read from disk yields to one another thread cached first; a batch that was just written
    /// always replaces the cached copy. Returns whichever batch ends up cached.
    fn insert_cached(&self, batch: Arc<RegionHashBatch>, replace: bool) -> Arc<RegionHashBatch> {
        let mut cache = self.cache.lock();
        let region = batch.region;
        let existing = if replace {
            None
        } else {
            cache.get(&region).cloned()
        };
        let cached = match existing {
            Some(existing) => existing,
            None => {
                cache.insert(region, batch.clone());
                batch
            }
        };

        let RegionHashConfig {
            max_cached_regions,
            min_cached_regions,
        } = self.config;
        while cache.len() > max_cached_regions && cache.len() > min_cached_regions {
            if let Some((evicted, _)) = cache.pop_least_recent() {
                log::debug!("evicted hashes for {}", evicted);
            }
        }
        cached
    }

    /// The pre-render pass: hashes every chunk in every region of `source` that `subset` accepts, one region at a time.
    pub fn hashing_pass<S: ChunkSource + ?Sized>(
        &self,
        source: &S,
        subset: &WorldSubset,
        algo: &HashAlgorithm,
    ) -> Result<HashingStats, RegionIndexError> {
        let mut stats = HashingStats::default();
        for region in source.regions() {
            let chunks = match source.contained_chunks(region) {
                Ok(chunks) => chunks,
                Err(e) => {
                    log::warn!("skipping region {}: {}", region, e);
                    continue;
                }
            };
            let handle = self.begin_region(region)?;
            for coord in chunks {
                let hash = if subset.contains(coord) {
                    load_and_hash(source, subset, coord, algo)
                } else {
                    None
                };
                match hash {
                    Some(_) => stats.chunks += 1,
                    None => stats.skipped += 1,
                }
                self.record(&handle, coord, hash)?;
            }
            self.end_region(handle)?;
            stats.regions += 1;
        }
        log::info!(
            "hashed {} chunks in {} regions ({} skipped)",
            stats.chunks,
            stats.regions,
            stats.skipped
        );
        Ok(stats)
    }
}

fn load_and_hash<S: ChunkSource + ?Sized>(
    source: &S,
    subset: &WorldSubset,
    coord: ChunkCoord,
    algo: &HashAlgorithm,
) -> Option<ChunkHash> {
    read_masked_chunk(source, subset, coord).map(|chunk| hash_chunk(&chunk, algo))
}

fn write_batch(path: &Path, batch: &RegionHashBatch) -> io::Result<()> {
    let file = fs::File::create(path)?;
    let mut out = BufWriter::new(file);
    batch.write_to(&mut out)?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

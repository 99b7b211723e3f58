//! Reading chunk blobs out of region container files.
//!
//! A region file starts with 1024 big-endian `u32` locations, one per chunk, each `sector offset << 8 | sector count`
//! in 4 KiB sectors (zero means "no chunk"). A chunk record is a `u32` byte length, a one-byte compression tag, and the
//! compressed NBT payload.

use crate::codec::{Compression, DecodeError};
use crate::coordinates::{ChunkCoord, RegionCoord, REGION_EDGE};

use byteorder::{BigEndian, ReadBytesExt};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::LruList;
use thiserror::Error;

pub const SECTOR_SIZE: usize = 4096;
pub const CHUNKS_PER_REGION: usize = (REGION_EDGE * REGION_EDGE) as usize;
const HEADER_LEN: usize = CHUNKS_PER_REGION * 4;

/// Supplies raw chunk blobs.
pub trait ChunkSource: Send + Sync {
    /// Every region that may contain chunks, in canonical order.
    fn regions(&self) -> Vec<RegionCoord>;

    /// The chunks present in `region`, in canonical order.
    fn contained_chunks(&self, region: RegionCoord) -> Result<Vec<ChunkCoord>, RegionFileError>;

    /// The compressed blob of one chunk, or `None` if the chunk does not exist.
    fn read_chunk(&self, coord: ChunkCoord) -> Result<Option<(Vec<u8>, Compression)>, RegionFileError>;
}

#[derive(Debug, Error)]
pub enum RegionFileError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is shorter than a region header", .0.display())]
    ShortHeader(PathBuf),
    #[error("chunk {coord} lies outside of {}", .path.display())]
    BadOffset { coord: ChunkCoord, path: PathBuf },
    #[error(transparent)]
    Compression(#[from] DecodeError),
}

/// The two region container generations. They differ only in the chunk layout they hold.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SaveFormat {
    McRegion,
    Anvil,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::McRegion => "mcr",
            SaveFormat::Anvil => "mca",
        }
    }
}

/// Parses `r.{x}.{z}.mca` / `r.{x}.{z}.mcr`.
pub fn parse_region_file_name(name: &str) -> Option<(RegionCoord, SaveFormat)> {
    let (x, z, ext) = name.strip_prefix("r.")?.split('.').collect_tuple()?;
    let format = match ext {
        "mca" => SaveFormat::Anvil,
        "mcr" => SaveFormat::McRegion,
        _ => return None,
    };
    Some((RegionCoord::new(x.parse().ok()?, z.parse().ok()?), format))
}

/// One region container, read fully into memory.
pub struct RegionFile {
    region: RegionCoord,
    path: PathBuf,
    locations: Vec<u32>,
    bytes: Vec<u8>,
}

impl RegionFile {
    pub fn open(region: RegionCoord, path: &Path) -> Result<Self, RegionFileError> {
        let bytes = fs::read(path).map_err(|source| RegionFileError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_bytes(region, path.to_owned(), bytes)
    }

    pub fn from_bytes(region: RegionCoord, path: PathBuf, bytes: Vec<u8>) -> Result<Self, RegionFileError> {
        if bytes.len() < HEADER_LEN {
            return Err(RegionFileError::ShortHeader(path));
        }
        let locations = bytes[..HEADER_LEN]
            .chunks_exact(4)
            .map(|mut b| b.read_u32::<BigEndian>().unwrap_or(0))
            .collect();
        Ok(Self {
            region,
            path,
            locations,
            bytes,
        })
    }

    pub fn region(&self) -> RegionCoord {
        self.region
    }

    fn location(&self, coord: ChunkCoord) -> Option<u32> {
        if !self.region.contains(coord) {
            return None;
        }
        let index = (coord.x & (REGION_EDGE - 1)) + (coord.z & (REGION_EDGE - 1)) * REGION_EDGE;
        let loc = self.locations[index as usize];
        (loc >> 8 != 0 && loc & 0xFF != 0).then(|| loc)
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.location(coord).is_some()
    }

    pub fn contained_chunks(&self) -> Vec<ChunkCoord> {
        self.region.chunks().filter(|c| self.contains(*c)).collect()
    }

    pub fn read_chunk(&self, coord: ChunkCoord) -> Result<Option<(Vec<u8>, Compression)>, RegionFileError> {
        let loc = match self.location(coord) {
            Some(loc) => loc,
            None => return Ok(None),
        };
        let bad_offset = || RegionFileError::BadOffset {
            coord,
            path: self.path.clone(),
        };

        let start = (loc >> 8) as usize * SECTOR_SIZE;
        let mut record = self.bytes.get(start..).ok_or_else(bad_offset)?;
        let length = record.read_u32::<BigEndian>().map_err(|_| bad_offset())? as usize;
        let tag = record.read_u8().map_err(|_| bad_offset())?;
        let compression = Compression::from_tag(tag)?;
        // The length counts the compression tag.
        let payload = length
            .checked_sub(1)
            .and_then(|n| record.get(..n))
            .ok_or_else(bad_offset)?;
        Ok(Some((payload.to_vec(), compression)))
    }
}

/// All region files of one world dimension.
pub struct RegionDirectory {
    regions: BTreeMap<RegionCoord, PathBuf>,
    open_files: Mutex<LruList<RegionCoord, Arc<RegionFile>>>,
    max_open_files: usize,
}

impl RegionDirectory {
    /// Scans `dir` for region files. Where a region exists in both generations, the newer one wins.
    pub fn open(dir: &Path, max_open_files: usize) -> Result<Self, RegionFileError> {
        let io_err = |source| RegionFileError::Io {
            path: dir.to_owned(),
            source,
        };
        let mut found: BTreeMap<RegionCoord, (SaveFormat, PathBuf)> = BTreeMap::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let parsed = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_region_file_name);
            if let Some((region, format)) = parsed {
                let newer = found.get(&region).map_or(true, |(f, _)| format > *f);
                if newer {
                    found.insert(region, (format, path));
                }
            }
        }
        log::info!("found {} region files in {}", found.len(), dir.display());

        Ok(Self {
            regions: found.into_iter().map(|(r, (_, p))| (r, p)).collect(),
            open_files: Mutex::new(LruList::new()),
            max_open_files: max_open_files.max(1),
        })
    }

    fn region_file(&self, region: RegionCoord) -> Result<Option<Arc<RegionFile>>, RegionFileError> {
        let path = match self.regions.get(&region) {
            Some(path) => path,
            None => return Ok(None),
        };
        if let Some(file) = self.open_files.lock().get(&region) {
            return Ok(Some(file.clone()));
        }

        let file = Arc::new(RegionFile::open(region, path)?);
        let mut open_files = self.open_files.lock();
        open_files.insert(region, file.clone());
        while open_files.len() > self.max_open_files {
            open_files.pop_least_recent();
        }
        Ok(Some(file))
    }
}

impl ChunkSource for RegionDirectory {
    fn regions(&self) -> Vec<RegionCoord> {
        self.regions.keys().copied().collect()
    }

    fn contained_chunks(&self, region: RegionCoord) -> Result<Vec<ChunkCoord>, RegionFileError> {
        Ok(self
            .region_file(region)?
            .map(|f| f.contained_chunks())
            .unwrap_or_default())
    }

    fn read_chunk(&self, coord: ChunkCoord) -> Result<Option<(Vec<u8>, Compression)>, RegionFileError> {
        match self.region_file(coord.region())? {
            Some(file) => file.read_chunk(coord),
            None => Ok(None),
        }
    }
}

/// Chunk blobs held in memory, e.g. for tools that receive chunks from somewhere other than a save directory.
#[derive(Default)]
pub struct MemoryChunkSource {
    chunks: RwLock<BTreeMap<ChunkCoord, (Vec<u8>, Compression)>>,
}

impl MemoryChunkSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, coord: ChunkCoord, bytes: Vec<u8>, compression: Compression) {
        self.chunks.write().insert(coord, (bytes, compression));
    }

    pub fn remove(&self, coord: ChunkCoord) {
        self.chunks.write().remove(&coord);
    }
}

impl ChunkSource for MemoryChunkSource {
    fn regions(&self) -> Vec<RegionCoord> {
        self.chunks.read().keys().map(|c| c.region()).sorted().dedup().collect()
    }

    fn contained_chunks(&self, region: RegionCoord) -> Result<Vec<ChunkCoord>, RegionFileError> {
        Ok(self
            .chunks
            .read()
            .keys()
            .copied()
            .filter(|c| region.contains(*c))
            .collect())
    }

    fn read_chunk(&self, coord: ChunkCoord) -> Result<Option<(Vec<u8>, Compression)>, RegionFileError> {
        Ok(self.chunks.read().get(&coord).cloned())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache_io::test::unique_test_dir;
    use crate::codec::{decode_chunk, test::encode, test::sectioned_root};

    /// Lays out `chunks` in a region container, one chunk per run of sectors after the header.
    fn build_region(chunks: &[(ChunkCoord, Vec<u8>, Compression)]) -> Vec<u8> {
        let mut bytes = vec![0u8; 2 * SECTOR_SIZE];
        for (coord, payload, compression) in chunks {
            let sector = bytes.len() / SECTOR_SIZE;
            let mut record = ((payload.len() + 1) as u32).to_be_bytes().to_vec();
            record.push(compression.tag());
            record.extend_from_slice(payload);
            let sectors = (record.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
            record.resize(sectors * SECTOR_SIZE, 0);
            bytes.extend_from_slice(&record);

            let index = ((coord.x & 31) + (coord.z & 31) * 32) as usize;
            let loc = ((sector as u32) << 8) | sectors as u32;
            bytes[index * 4..index * 4 + 4].copy_from_slice(&loc.to_be_bytes());
        }
        bytes
    }

    fn blob(coord: ChunkCoord, id: u16) -> Vec<u8> {
        encode(&sectioned_root(coord, 0, (0, 0, 0), id, 0), Compression::Zlib)
    }

    #[test]
    fn region_file_names() {
        assert_eq!(
            parse_region_file_name("r.-1.2.mca"),
            Some((RegionCoord::new(-1, 2), SaveFormat::Anvil))
        );
        assert_eq!(
            parse_region_file_name("r.0.0.mcr"),
            Some((RegionCoord::new(0, 0), SaveFormat::McRegion))
        );
        assert_eq!(parse_region_file_name("r.0.0.mca.bak"), None);
        assert_eq!(parse_region_file_name("level.dat"), None);
        assert_eq!(parse_region_file_name("r.a.0.mca"), None);
    }

    #[test]
    fn reads_chunks_from_container() {
        let region = RegionCoord::new(-1, 0);
        let a = ChunkCoord::new(-32, 0);
        let b = ChunkCoord::new(-1, 31);
        let bytes = build_region(&[
            (b, blob(b, 2), Compression::Zlib),
            (a, blob(a, 1), Compression::Zlib),
        ]);
        let file = RegionFile::from_bytes(region, PathBuf::from("r.-1.0.mca"), bytes).unwrap();

        assert_eq!(file.contained_chunks(), vec![a, b]);
        assert!(!file.contains(ChunkCoord::new(-2, 0)));
        assert!(!file.contains(ChunkCoord::new(0, 0)));

        let (payload, compression) = file.read_chunk(b).unwrap().unwrap();
        assert_eq!(compression, Compression::Zlib);
        let chunk = decode_chunk(&payload, compression).unwrap();
        assert_eq!(chunk.coord, b);
        assert_eq!(file.read_chunk(ChunkCoord::new(-3, 3)).unwrap(), None);
    }

    #[test]
    fn bad_offsets_are_errors() {
        let region = RegionCoord::new(0, 0);
        let mut bytes = vec![0u8; 2 * SECTOR_SIZE];
        // Chunk (0, 0) claims sector 9, which does not exist.
        bytes[..4].copy_from_slice(&((9u32 << 8) | 1).to_be_bytes());
        let file = RegionFile::from_bytes(region, PathBuf::from("r.0.0.mca"), bytes).unwrap();
        assert!(matches!(
            file.read_chunk(ChunkCoord::new(0, 0)),
            Err(RegionFileError::BadOffset { .. })
        ));
        assert!(matches!(
            RegionFile::from_bytes(region, PathBuf::from("short"), vec![0; 10]),
            Err(RegionFileError::ShortHeader(_))
        ));
    }

    #[test]
    fn directory_prefers_newer_format() {
        let dir = unique_test_dir("regions");
        fs::create_dir_all(&dir).unwrap();
        let c = ChunkCoord::new(0, 0);
        fs::write(dir.join("r.0.0.mcr"), build_region(&[])).unwrap();
        fs::write(dir.join("r.0.0.mca"), build_region(&[(c, blob(c, 3), Compression::Zlib)])).unwrap();
        fs::write(dir.join("r.1.0.mca"), build_region(&[])).unwrap();
        fs::write(dir.join("notes.txt"), b"hi").unwrap();

        let source = RegionDirectory::open(&dir, 1).unwrap();
        assert_eq!(source.regions(), vec![RegionCoord::new(0, 0), RegionCoord::new(1, 0)]);
        assert_eq!(source.contained_chunks(RegionCoord::new(0, 0)).unwrap(), vec![c]);
        assert!(source.contained_chunks(RegionCoord::new(1, 0)).unwrap().is_empty());
        // Switching regions with one open file slot reopens transparently.
        assert!(source.read_chunk(c).unwrap().is_some());
        assert_eq!(source.read_chunk(ChunkCoord::new(99, 99)).unwrap(), None);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn memory_source_groups_by_region() {
        let source = MemoryChunkSource::new();
        for c in [ChunkCoord::new(0, 0), ChunkCoord::new(33, 0), ChunkCoord::new(0, 1)] {
            source.insert(c, vec![], Compression::Uncompressed);
        }
        assert_eq!(source.regions(), vec![RegionCoord::new(0, 0), RegionCoord::new(1, 0)]);
        assert_eq!(
            source.contained_chunks(RegionCoord::new(0, 0)).unwrap(),
            vec![ChunkCoord::new(0, 0), ChunkCoord::new(0, 1)]
        );
        source.remove(ChunkCoord::new(33, 0));
        assert_eq!(source.read_chunk(ChunkCoord::new(33, 0)).unwrap(), None);
    }
}

use quartz_nbt::io::{write_nbt, Flavor};
use quartz_nbt::{NbtCompound, NbtList, NbtTag};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use strata_map::ChunkCoord;

/// A fresh directory path under the system temp dir. Not created.
pub fn unique_test_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "strata-root-{}-{}-{}-{}",
        label,
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

/// A sectioned chunk with a single non-air block and a single non-zero biome column.
#[derive(Clone, Copy, Debug)]
pub struct ChunkSpec {
    pub coord: ChunkCoord,
    /// World-independent `(x, y, z)` inside the chunk, `y` in `0..256`.
    pub block: (usize, usize, usize),
    pub block_id: u8,
    pub block_data: u8,
    pub biome: u8,
}

impl Default for ChunkSpec {
    fn default() -> Self {
        Self {
            coord: ChunkCoord::new(0, 0),
            block: (0, 0, 0),
            block_id: 1,
            block_data: 0,
            biome: 0,
        }
    }
}

/// Encodes `spec` as an uncompressed NBT chunk.
pub fn encode_chunk(spec: &ChunkSpec) -> Vec<u8> {
    let (x, y, z) = spec.block;
    let i = x + z * 16 + (y % 16) * 256;

    let mut blocks = vec![0i8; 4096];
    blocks[i] = spec.block_id as i8;
    let mut data = vec![0i8; 2048];
    let shift = if x % 2 == 1 { 4 } else { 0 };
    data[i / 2] = ((spec.block_data & 0xF) << shift) as i8;

    let mut section = NbtCompound::new();
    section.insert("Y", NbtTag::Byte((y / 16) as i8));
    section.insert("Blocks", NbtTag::ByteArray(blocks));
    section.insert("Data", NbtTag::ByteArray(data));

    let mut biomes = vec![0i32; 256];
    biomes[x * 16 + z] = spec.biome as i32;

    let mut level = NbtCompound::new();
    level.insert("xPos", NbtTag::Int(spec.coord.x as i32));
    level.insert("zPos", NbtTag::Int(spec.coord.z as i32));
    level.insert("Sections", NbtTag::List(NbtList::from(vec![NbtTag::Compound(section)])));
    level.insert("Biomes", NbtTag::IntArray(biomes));

    let mut root = NbtCompound::new();
    root.insert("Level", NbtTag::Compound(level));

    let mut bytes = Vec::new();
    write_nbt(&mut bytes, None, &root, Flavor::Uncompressed).expect("in-memory write");
    bytes
}

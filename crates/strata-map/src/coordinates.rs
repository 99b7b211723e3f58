use crate::chunk::{CHUNK_EDGE, CHUNK_EDGE_LOG2, CHUNK_HEIGHT};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of chunks along one edge of a region.
pub const REGION_EDGE: i64 = 32;

/// Identifies a 16 x H x 16 column of blocks.
///
/// The derived ordering (x major, z minor) is the canonical chunk order. Anything that combines chunk digests must visit
/// chunks in this order so the result does not depend on traversal or thread scheduling.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ChunkCoord {
    pub x: i64,
    pub z: i64,
}

impl ChunkCoord {
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }

    /// The chunk containing the block at world `(x, z)`.
    pub const fn from_block(x: i64, z: i64) -> Self {
        Self::new(x >> CHUNK_EDGE_LOG2, z >> CHUNK_EDGE_LOG2)
    }

    pub const fn region(self) -> RegionCoord {
        RegionCoord::new(
            self.x.div_euclid(REGION_EDGE),
            self.z.div_euclid(REGION_EDGE),
        )
    }

    /// World coordinates of the block at local `(0, 0)`.
    pub const fn min_block(self) -> (i64, i64) {
        (self.x << CHUNK_EDGE_LOG2, self.z << CHUNK_EDGE_LOG2)
    }

    /// Resolves a local offset that may lie outside `0..16` into the chunk that actually contains it.
    pub fn resolve_local(self, local_x: i64, y: i32, local_z: i64) -> (ChunkCoord, LocalPos) {
        let (min_x, min_z) = self.min_block();
        BlockPos::new(min_x + local_x, y, min_z + local_z).split()
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Identifies one on-disk region: a 32 x 32 grid of chunks.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RegionCoord {
    pub x: i64,
    pub z: i64,
}

impl RegionCoord {
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }

    pub const fn min_chunk(self) -> ChunkCoord {
        ChunkCoord::new(self.x * REGION_EDGE, self.z * REGION_EDGE)
    }

    pub fn contains(self, chunk: ChunkCoord) -> bool {
        chunk.region() == self
    }

    /// All chunk coordinates in this region, in canonical order.
    pub fn chunks(self) -> impl Iterator<Item = ChunkCoord> {
        let min = self.min_chunk();
        (0..REGION_EDGE)
            .flat_map(move |dx| (0..REGION_EDGE).map(move |dz| ChunkCoord::new(min.x + dx, min.z + dz)))
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r({}, {})", self.x, self.z)
    }
}

/// One output image at the closest zoom level.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
}

impl TileCoord {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Morton order of the tile, used to walk tiles with good spatial locality. Only the low 32 bits of each axis
    /// participate.
    pub fn z_order(self) -> u64 {
        spread_bits(self.x as u32) | (spread_bits(self.y as u32) << 1)
    }

    /// The tile one zoom level out that covers this one.
    pub fn parent(self) -> TileCoord {
        TileCoord::new(self.x.div_euclid(2), self.y.div_euclid(2))
    }
}

fn spread_bits(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// A block position in world space.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct BlockPos {
    pub x: i64,
    pub y: i32,
    pub z: i64,
}

impl BlockPos {
    pub const fn new(x: i64, y: i32, z: i64) -> Self {
        Self { x, y, z }
    }

    pub const fn chunk(self) -> ChunkCoord {
        ChunkCoord::from_block(self.x, self.z)
    }

    /// Splits into the containing chunk and the offset inside it.
    pub fn split(self) -> (ChunkCoord, LocalPos) {
        let local = LocalPos {
            x: self.x.rem_euclid(CHUNK_EDGE as i64) as usize,
            y: self.y,
            z: self.z.rem_euclid(CHUNK_EDGE as i64) as usize,
        };
        (self.chunk(), local)
    }
}

/// Offset of a block inside its chunk. [`BlockPos::split`] always yields `x` and `z` in `0..16`; chunk queries treat
/// anything else, and any `y` outside `0..256`, as outside the chunk.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct LocalPos {
    pub x: usize,
    pub y: i32,
    pub z: usize,
}

impl LocalPos {
    pub fn in_chunk(self) -> bool {
        self.x < CHUNK_EDGE && self.z < CHUNK_EDGE && (0..CHUNK_HEIGHT).contains(&self.y)
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

    #[test]
    fn chunk_order_is_x_major() {
        let mut coords = vec![
            ChunkCoord::new(1, -5),
            ChunkCoord::new(0, 1),
            ChunkCoord::new(0, 0),
            ChunkCoord::new(-1, 9),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                ChunkCoord::new(-1, 9),
                ChunkCoord::new(0, 0),
                ChunkCoord::new(0, 1),
                ChunkCoord::new(1, -5),
            ]
        );
    }

    #[test]
    fn negative_coordinates_floor() {
        assert_eq!(ChunkCoord::from_block(-1, 15), ChunkCoord::new(-1, 0));
        assert_eq!(ChunkCoord::from_block(-16, -17), ChunkCoord::new(-1, -2));
        assert_eq!(ChunkCoord::new(-1, 31).region(), RegionCoord::new(-1, 0));
        assert_eq!(ChunkCoord::new(-33, 32).region(), RegionCoord::new(-2, 1));
    }

    #[test]
    fn local_offsets_wrap_into_neighbours() {
        let origin = ChunkCoord::new(2, 3);
        let (chunk, local) = origin.resolve_local(-1, 70, 16);
        assert_eq!(chunk, ChunkCoord::new(1, 4));
        assert_eq!((local.x, local.y, local.z), (15, 70, 0));

        let (chunk, local) = origin.resolve_local(5, 1, 5);
        assert_eq!(chunk, origin);
        assert_eq!((local.x, local.z), (5, 5));
    }

    #[test]
    fn region_chunks_cover_region_in_order() {
        let region = RegionCoord::new(-1, 2);
        let chunks: Vec<_> = region.chunks().collect();
        assert_eq!(chunks.len(), 1024);
        assert!(chunks.windows(2).all(|w| w[0] < w[1]));
        assert!(chunks.iter().all(|c| region.contains(*c)));
        assert_eq!(chunks[0], ChunkCoord::new(-32, 64));
    }

    #[test]
    fn z_order_interleaves_axes() {
        assert_eq!(TileCoord::new(0, 0).z_order(), 0);
        assert_eq!(TileCoord::new(1, 0).z_order(), 1);
        assert_eq!(TileCoord::new(0, 1).z_order(), 2);
        assert_eq!(TileCoord::new(3, 3).z_order(), 15);
        assert_eq!(TileCoord::new(-3, 5).parent(), TileCoord::new(-2, 2));
    }
}

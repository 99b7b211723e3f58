use crate::chunk::{column_index, Chunk, CHUNK_EDGE, COLUMN_COUNT};
use crate::coordinates::ChunkCoord;

use serde::{Deserialize, Serialize};

/// Which part of the world gets rendered.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum WorldSubset {
    Full,
    /// Blocks within `radius` of `(origin_x, origin_z)`.
    Circular {
        origin_x: i64,
        origin_z: i64,
        radius: i64,
    },
}

impl Default for WorldSubset {
    fn default() -> Self {
        WorldSubset::Full
    }
}

/// A chunk within this many blocks of the radius is still loaded so that the masked edge renders with its neighbours.
const CIRCULAR_CHUNK_MARGIN: i64 = 3 * CHUNK_EDGE as i64;

impl WorldSubset {
    /// Whether the chunk should be decoded at all.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        match *self {
            WorldSubset::Full => true,
            WorldSubset::Circular {
                origin_x,
                origin_z,
                radius,
            } => {
                let (min_x, min_z) = coord.min_block();
                let half = CHUNK_EDGE as i64 / 2;
                distance(min_x + half, min_z + half, origin_x, origin_z) <= radius + CIRCULAR_CHUNK_MARGIN
            }
        }
    }

    /// Columns of `coord` that belong to the subset, or `None` if all of them do.
    pub fn column_mask(&self, coord: ChunkCoord) -> Option<BlockColumnMask> {
        match *self {
            WorldSubset::Full => None,
            WorldSubset::Circular {
                origin_x,
                origin_z,
                radius,
            } => {
                let (min_x, min_z) = coord.min_block();
                let mut mask = BlockColumnMask::all();
                for x in 0..CHUNK_EDGE {
                    for z in 0..CHUNK_EDGE {
                        let d = distance(min_x + x as i64, min_z + z as i64, origin_x, origin_z);
                        mask.set(x, z, d <= radius);
                    }
                }
                (!mask.is_full()).then(|| mask)
            }
        }
    }

    /// Clears the columns of `chunk` that fall outside of the subset.
    pub fn mask_chunk(&self, chunk: &mut Chunk) {
        if let Some(mask) = self.column_mask(chunk.coord) {
            mask.apply(chunk);
        }
    }

    /// Stable text that identifies the subset in cache fingerprints.
    pub fn description(&self) -> String {
        match self {
            WorldSubset::Full => "full world".to_owned(),
            WorldSubset::Circular {
                origin_x,
                origin_z,
                radius,
            } => format!("circular ({}, {}) {}", origin_x, origin_z, radius),
        }
    }
}

/// Truncated Euclidean distance in the horizontal plane.
fn distance(x: i64, z: i64, origin_x: i64, origin_z: i64) -> i64 {
    let dx = (x - origin_x) as f64;
    let dz = (z - origin_z) as f64;
    (dx * dx + dz * dz).sqrt() as i64
}

/// Per-column allow list for one chunk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockColumnMask {
    allowed: [bool; COLUMN_COUNT],
}

impl BlockColumnMask {
    pub fn all() -> Self {
        Self {
            allowed: [true; COLUMN_COUNT],
        }
    }

    pub fn allows(&self, x: usize, z: usize) -> bool {
        self.allowed[column_index(x, z)]
    }

    pub fn set(&mut self, x: usize, z: usize, allow: bool) {
        self.allowed[column_index(x, z)] = allow;
    }

    pub fn is_full(&self) -> bool {
        self.allowed.iter().all(|&a| a)
    }

    pub fn apply(&self, chunk: &mut Chunk) {
        for x in 0..CHUNK_EDGE {
            for z in 0..CHUNK_EDGE {
                if !self.allows(x, z) {
                    chunk.clear_column(x, z);
                }
            }
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

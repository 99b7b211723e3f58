use crate::coordinates::{ChunkCoord, LocalPos};

use bytemuck::Zeroable;
use ndshape::{ConstShape, ConstShape2u32, ConstShape3u32};
use static_assertions::const_assert_eq;
use std::mem;

pub const CHUNK_EDGE: usize = 16;
pub const CHUNK_EDGE_LOG2: u32 = 4;
/// Height of a chunk in blocks.
pub const CHUNK_HEIGHT: i32 = 256;
pub const SECTIONS_PER_CHUNK: usize = 16;

/// Shape of a section, indexed `[z, y, x]` so that `x` is the slowest axis and `z` the fastest. This matches the order
/// in which section arrays are fed to the chunk digest.
pub type SectionShape = ConstShape3u32<16, 16, 16>;
pub const SECTION_SIZE: usize = SectionShape::SIZE as usize;
const_assert_eq!(SECTION_SIZE, 16 * 16 * 16);

/// Shape of the per-column biome grid, indexed `[z, x]`.
pub type ColumnShape = ConstShape2u32<16, 16>;
pub const COLUMN_COUNT: usize = ColumnShape::SIZE as usize;

pub const MAX_LIGHT: u8 = 15;
pub const AIR: u16 = 0;

#[inline]
pub fn section_index(x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < CHUNK_EDGE && y < CHUNK_EDGE && z < CHUNK_EDGE);
    SectionShape::linearize([z as u32, y as u32, x as u32]) as usize
}

#[inline]
pub fn column_index(x: usize, z: usize) -> usize {
    debug_assert!(x < CHUNK_EDGE && z < CHUNK_EDGE);
    ColumnShape::linearize([z as u32, x as u32]) as usize
}

/// A 16 x 16 x 16 cube of block data. Nibble-valued fields are stored unpacked, one value per byte.
#[derive(Clone, Eq, PartialEq)]
#[repr(C)]
pub struct Section {
    pub block_ids: [u16; SECTION_SIZE],
    pub block_data: [u8; SECTION_SIZE],
    pub sky_light: [u8; SECTION_SIZE],
    pub block_light: [u8; SECTION_SIZE],
}

unsafe impl Zeroable for Section {}

const_assert_eq!(mem::size_of::<Section>(), 5 * SECTION_SIZE);

impl Section {
    /// An all-air section with no light. Allocated directly on the heap; a `Section` is too big to want on the stack.
    pub fn new_boxed() -> Box<Section> {
        bytemuck::allocation::zeroed_box()
    }
}

impl std::fmt::Debug for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let solid = self.block_ids.iter().filter(|&&id| id != AIR).count();
        f.debug_struct("Section").field("solid_blocks", &solid).finish()
    }
}

/// A sign tile entity. Signs participate in the chunk digest because map markers are derived from them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignEntity {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub text: [String; 4],
}

/// One decoded chunk column.
///
/// Sections that were never populated stay `None` and read as air with full sky light.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    pub coord: ChunkCoord,
    sections: [Option<Box<Section>>; SECTIONS_PER_CHUNK],
    pub biomes: [u8; COLUMN_COUNT],
    pub signs: Vec<SignEntity>,
}

impl Chunk {
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            sections: Default::default(),
            biomes: [0; COLUMN_COUNT],
            signs: Vec::new(),
        }
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)?.as_deref()
    }

    /// Returns the section at `index`, materializing an empty one if necessary.
    pub fn section_or_insert(&mut self, index: usize) -> &mut Section {
        self.sections[index].get_or_insert_with(Section::new_boxed)
    }

    pub fn sections(&self) -> &[Option<Box<Section>>; SECTIONS_PER_CHUNK] {
        &self.sections
    }

    pub fn num_populated_sections(&self) -> usize {
        self.sections.iter().filter(|s| s.is_some()).count()
    }

    fn locate(&self, p: LocalPos) -> Option<(&Section, usize)> {
        if !p.in_chunk() {
            return None;
        }
        let y = p.y as usize;
        let section = self.section(y / CHUNK_EDGE)?;
        Some((section, section_index(p.x, y % CHUNK_EDGE, p.z)))
    }

    pub fn block_id(&self, p: LocalPos) -> u16 {
        self.locate(p).map_or(AIR, |(s, i)| s.block_ids[i])
    }

    pub fn block_data(&self, p: LocalPos) -> u8 {
        self.locate(p).map_or(0, |(s, i)| s.block_data[i])
    }

    pub fn sky_light(&self, p: LocalPos) -> u8 {
        self.locate(p).map_or(MAX_LIGHT, |(s, i)| s.sky_light[i])
    }

    pub fn block_light(&self, p: LocalPos) -> u8 {
        self.locate(p).map_or(0, |(s, i)| s.block_light[i])
    }

    /// Columns outside the chunk read as biome 0.
    pub fn biome(&self, x: usize, z: usize) -> u8 {
        if x >= CHUNK_EDGE || z >= CHUNK_EDGE {
            return 0;
        }
        self.biomes[column_index(x, z)]
    }

    /// Sets a block, materializing its section. Positions outside the chunk are ignored.
    pub fn set_block(&mut self, p: LocalPos, id: u16, data: u8) {
        if !p.in_chunk() {
            return;
        }
        let y = p.y as usize;
        let i = section_index(p.x, y % CHUNK_EDGE, p.z);
        let section = self.section_or_insert(y / CHUNK_EDGE);
        section.block_ids[i] = id;
        section.block_data[i] = data & 0xF;
    }

    /// Replaces every block in the `(x, z)` column with air. Light is left untouched.
    pub fn clear_column(&mut self, x: usize, z: usize) {
        if x >= CHUNK_EDGE || z >= CHUNK_EDGE {
            return;
        }
        for section in self.sections.iter_mut().flatten() {
            for y in 0..CHUNK_EDGE {
                let i = section_index(x, y, z);
                section.block_ids[i] = AIR;
                section.block_data[i] = 0;
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

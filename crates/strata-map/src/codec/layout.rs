use super::{checked_len, int_value, DecodeError};
use crate::chunk::{section_index, Chunk, CHUNK_EDGE, MAX_LIGHT, SECTIONS_PER_CHUNK};

use quartz_nbt::{NbtCompound, NbtList, NbtTag};

/// The two on-disk block layouts. They disagree on both the flat index formula and on which axis selects the upper
/// half of a packed nibble, so each keeps its own formulas.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SectionLayout {
    /// One 128-block-high array per chunk.
    Legacy,
    /// A list of 16-block-high sections.
    Sectioned,
}

impl SectionLayout {
    /// Height in blocks of one stored block array.
    pub const fn array_height(self) -> usize {
        match self {
            SectionLayout::Legacy => 128,
            SectionLayout::Sectioned => CHUNK_EDGE,
        }
    }

    pub const fn block_count(self) -> usize {
        CHUNK_EDGE * CHUNK_EDGE * self.array_height()
    }

    pub const fn nibble_count(self) -> usize {
        self.block_count() / 2
    }

    /// Flat index of `(x, y, z)` in one stored array, `y` relative to the bottom of that array.
    pub const fn block_index(self, x: usize, y: usize, z: usize) -> usize {
        match self {
            SectionLayout::Legacy => y + z * 128 + x * 128 * CHUNK_EDGE,
            SectionLayout::Sectioned => x + z * CHUNK_EDGE + y * CHUNK_EDGE * CHUNK_EDGE,
        }
    }

    /// Reads the 4-bit value at `(x, y, z)` from a packed nibble array.
    ///
    /// Legacy arrays keep odd `y` in the upper half of each byte, sectioned arrays keep odd `x` there.
    pub fn nibble(self, packed: &[i8], x: usize, y: usize, z: usize) -> u8 {
        let byte = packed[self.block_index(x, y, z) / 2] as u8;
        let upper = match self {
            SectionLayout::Legacy => y % 2 == 1,
            SectionLayout::Sectioned => x % 2 == 1,
        };
        if upper {
            (byte >> 4) & 0xF
        } else {
            byte & 0xF
        }
    }
}

pub(super) fn decode_sectioned(sections: &NbtList, chunk: &mut Chunk) -> Result<(), DecodeError> {
    let layout = SectionLayout::Sectioned;
    for tag in sections.iter() {
        let section = match tag {
            NbtTag::Compound(section) => section,
            _ => continue,
        };
        let section_y = match section.inner().get("Y").and_then(int_value) {
            Some(y) if (0..SECTIONS_PER_CHUNK as i64).contains(&y) => y as usize,
            other => {
                log::debug!("{}: skipping section with Y = {:?}", chunk.coord, other);
                continue;
            }
        };
        let blocks = match checked_len(section, "Blocks", layout.block_count())? {
            Some(blocks) => blocks,
            None => continue,
        };
        let add = checked_len(section, "Add", layout.nibble_count())?;
        let data = checked_len(section, "Data", layout.nibble_count())?;
        let sky = checked_len(section, "SkyLight", layout.nibble_count())?;
        let light = checked_len(section, "BlockLight", layout.nibble_count())?;

        let dst = chunk.section_or_insert(section_y);
        for x in 0..CHUNK_EDGE {
            for y in 0..CHUNK_EDGE {
                for z in 0..CHUNK_EDGE {
                    let src = layout.block_index(x, y, z);
                    let i = section_index(x, y, z);
                    let high = add.map_or(0, |a| layout.nibble(a, x, y, z) as u16);
                    dst.block_ids[i] = (blocks[src] as u8 as u16) | (high << 8);
                    dst.block_data[i] = data.map_or(0, |d| layout.nibble(d, x, y, z));
                    dst.sky_light[i] = sky.map_or(MAX_LIGHT, |s| layout.nibble(s, x, y, z));
                    dst.block_light[i] = light.map_or(0, |l| layout.nibble(l, x, y, z));
                }
            }
        }
    }
    Ok(())
}

pub(super) fn decode_legacy(level: &NbtCompound, chunk: &mut Chunk) -> Result<(), DecodeError> {
    let layout = SectionLayout::Legacy;
    let blocks = checked_len(level, "Blocks", layout.block_count())?;
    let data = checked_len(level, "Data", layout.nibble_count())?;
    let sky = checked_len(level, "SkyLight", layout.nibble_count())?;
    let light = checked_len(level, "BlockLight", layout.nibble_count())?;

    let num_sections = layout.array_height() / CHUNK_EDGE;
    for s in 0..num_sections {
        chunk.section_or_insert(s);
    }

    for x in 0..CHUNK_EDGE {
        for z in 0..CHUNK_EDGE {
            for y in 0..layout.array_height() {
                let src = layout.block_index(x, y, z);
                let i = section_index(x, y % CHUNK_EDGE, z);
                let dst = chunk.section_or_insert(y / CHUNK_EDGE);
                dst.block_ids[i] = blocks.map_or(0, |b| b[src] as u8 as u16);
                dst.block_data[i] = data.map_or(0, |d| layout.nibble(d, x, y, z));
                dst.sky_light[i] = sky.map_or(MAX_LIGHT, |s| layout.nibble(s, x, y, z));
                dst.block_light[i] = light.map_or(0, |l| layout.nibble(l, x, y, z));
            }
        }
    }
    Ok(())
}

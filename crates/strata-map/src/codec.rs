//! Decoding of raw chunk blobs into [`Chunk`] values.
//!
//! A blob is an optionally compressed NBT document whose root holds a "Level" compound. Two block layouts exist on disk;
//! the presence of a "Sections" list selects [`SectionLayout::Sectioned`], its absence [`SectionLayout::Legacy`].

mod layout;
mod tile_entity;

pub use layout::SectionLayout;
pub use tile_entity::plain_text;

use crate::chunk::{column_index, Chunk, CHUNK_EDGE, COLUMN_COUNT};
use crate::coordinates::ChunkCoord;

use flate2::read::{GzDecoder, ZlibDecoder};
use quartz_nbt::io::{read_nbt, Flavor, NbtIoError};
use quartz_nbt::{NbtCompound, NbtTag};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{self, Cursor, Read};
use thiserror::Error;

/// How a chunk blob is compressed. Region containers store this as a single tag byte.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Compression {
    Gzip,
    Zlib,
    Uncompressed,
}

impl Compression {
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Zlib),
            3 => Ok(Compression::Uncompressed),
            other => Err(DecodeError::UnknownCompression(other)),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Compression::Gzip => 1,
            Compression::Zlib => 2,
            Compression::Uncompressed => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("chunk root has no Level compound or position")]
    BadRoot,
    #[error("{field} holds {actual} values, expected {expected}")]
    Truncated {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unknown compression tag {0}")]
    UnknownCompression(u8),
    #[error("malformed NBT: {0}")]
    Nbt(#[from] NbtIoError),
    #[error("failed to decompress chunk: {0}")]
    Io(#[from] io::Error),
}

/// Decodes one chunk blob.
pub fn decode_chunk(bytes: &[u8], format_hint: Compression) -> Result<Chunk, DecodeError> {
    let raw = decompress(bytes, format_hint)?;
    let (root, _root_name) = read_nbt(&mut Cursor::new(raw.as_ref()), Flavor::Uncompressed)?;
    decode_root(&root)
}

/// Decodes an already parsed chunk document.
pub fn decode_root(root: &NbtCompound) -> Result<Chunk, DecodeError> {
    let level = match root.inner().get("Level") {
        Some(NbtTag::Compound(level)) => level,
        _ => return Err(DecodeError::BadRoot),
    };
    let position = |name: &str| level.inner().get(name).and_then(int_value);
    let coord = match (position("xPos"), position("zPos")) {
        (Some(x), Some(z)) => ChunkCoord::new(x, z),
        _ => return Err(DecodeError::BadRoot),
    };

    let mut chunk = Chunk::new(coord);
    match level.inner().get("Sections") {
        Some(NbtTag::List(sections)) => {
            layout::decode_sectioned(sections, &mut chunk)?;
            decode_biomes(level, &mut chunk)?;
        }
        _ => layout::decode_legacy(level, &mut chunk)?,
    }
    chunk.signs = tile_entity::decode_signs(level);

    Ok(chunk)
}

/// Determines which layout a parsed chunk document uses without decoding it.
pub fn detect_layout(root: &NbtCompound) -> Option<SectionLayout> {
    match root.inner().get("Level") {
        Some(NbtTag::Compound(level)) => Some(match level.inner().get("Sections") {
            Some(NbtTag::List(_)) => SectionLayout::Sectioned,
            _ => SectionLayout::Legacy,
        }),
        _ => None,
    }
}

fn decompress(bytes: &[u8], compression: Compression) -> Result<Cow<'_, [u8]>, DecodeError> {
    let mut out = Vec::new();
    match compression {
        Compression::Uncompressed => return Ok(Cow::Borrowed(bytes)),
        Compression::Gzip => GzDecoder::new(bytes).read_to_end(&mut out)?,
        Compression::Zlib => ZlibDecoder::new(bytes).read_to_end(&mut out)?,
    };
    Ok(Cow::Owned(out))
}

fn decode_biomes(level: &NbtCompound, chunk: &mut Chunk) -> Result<(), DecodeError> {
    // Stored x major, unlike the z major grid in `Chunk`.
    let stored_index = |x: usize, z: usize| x * CHUNK_EDGE + z;
    match level.inner().get("Biomes") {
        Some(NbtTag::ByteArray(bytes)) => {
            require_len("Biomes", bytes.len(), COLUMN_COUNT)?;
            for x in 0..CHUNK_EDGE {
                for z in 0..CHUNK_EDGE {
                    chunk.biomes[column_index(x, z)] = bytes[stored_index(x, z)] as u8;
                }
            }
        }
        Some(NbtTag::IntArray(ints)) => {
            require_len("Biomes", ints.len(), COLUMN_COUNT)?;
            for x in 0..CHUNK_EDGE {
                for z in 0..CHUNK_EDGE {
                    chunk.biomes[column_index(x, z)] = ints[stored_index(x, z)] as u8;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn require_len(field: &'static str, actual: usize, expected: usize) -> Result<(), DecodeError> {
    if actual < expected {
        return Err(DecodeError::Truncated {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Looks up an optional byte array, failing if it is present but too short.
fn checked_len<'a>(
    compound: &'a NbtCompound,
    field: &'static str,
    expected: usize,
) -> Result<Option<&'a [i8]>, DecodeError> {
    match compound.inner().get(field) {
        Some(NbtTag::ByteArray(bytes)) => {
            require_len(field, bytes.len(), expected)?;
            Ok(Some(bytes.as_slice()))
        }
        _ => Ok(None),
    }
}

/// Integer tags are not always written with the same width.
fn int_value(tag: &NbtTag) -> Option<i64> {
    match *tag {
        NbtTag::Byte(v) => Some(v as i64),
        NbtTag::Short(v) => Some(v as i64),
        NbtTag::Int(v) => Some(v as i64),
        NbtTag::Long(v) => Some(v),
        _ => None,
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::chunk::{MAX_LIGHT, SECTION_SIZE};
    use crate::coordinates::LocalPos;

    use flate2::write::{GzEncoder, ZlibEncoder};
    use quartz_nbt::io::write_nbt;
    use quartz_nbt::NbtList;
    use std::io::Write;

    fn local(x: usize, y: i32, z: usize) -> LocalPos {
        LocalPos { x, y, z }
    }

    fn set_nibble(packed: &mut [i8], index: usize, upper: bool, value: u8) {
        let byte = packed[index / 2] as u8;
        let byte = if upper {
            (byte & 0x0F) | (value << 4)
        } else {
            (byte & 0xF0) | (value & 0xF)
        };
        packed[index / 2] = byte as i8;
    }

    fn sign_tag(x: i32, y: i32, z: i32, id: &str, lines: [&str; 4]) -> NbtTag {
        let mut sign = NbtCompound::new();
        sign.insert("id", NbtTag::String(id.to_owned()));
        sign.insert("x", NbtTag::Int(x));
        sign.insert("y", NbtTag::Int(y));
        sign.insert("z", NbtTag::Int(z));
        for (key, line) in ["Text1", "Text2", "Text3", "Text4"].iter().zip(lines) {
            sign.insert(*key, NbtTag::String(line.to_owned()));
        }
        NbtTag::Compound(sign)
    }

    fn wrap_level(level: NbtCompound) -> NbtCompound {
        let mut root = NbtCompound::new();
        root.insert("Level", NbtTag::Compound(level));
        root
    }

    /// A sectioned chunk at `coord` with one section at `section_y` holding a single block at local `(x, y, z)`.
    pub(crate) fn sectioned_root(
        coord: ChunkCoord,
        section_y: i8,
        (x, y, z): (usize, usize, usize),
        block_id: u16,
        block_data: u8,
    ) -> NbtCompound {
        let layout = SectionLayout::Sectioned;
        let i = layout.block_index(x, y, z);
        let upper = x % 2 == 1;

        let mut blocks = vec![0i8; layout.block_count()];
        blocks[i] = (block_id & 0xFF) as u8 as i8;
        let mut add = vec![0i8; layout.nibble_count()];
        set_nibble(&mut add, i, upper, (block_id >> 8) as u8);
        let mut data = vec![0i8; layout.nibble_count()];
        set_nibble(&mut data, i, upper, block_data);
        let sky = vec![0xFFu8 as i8; layout.nibble_count()];
        let mut light = vec![0i8; layout.nibble_count()];
        set_nibble(&mut light, i, upper, 9);

        let mut section = NbtCompound::new();
        section.insert("Y", NbtTag::Byte(section_y));
        section.insert("Blocks", NbtTag::ByteArray(blocks));
        section.insert("Add", NbtTag::ByteArray(add));
        section.insert("Data", NbtTag::ByteArray(data));
        section.insert("SkyLight", NbtTag::ByteArray(sky));
        section.insert("BlockLight", NbtTag::ByteArray(light));

        let mut level = NbtCompound::new();
        level.insert("xPos", NbtTag::Int(coord.x as i32));
        level.insert("zPos", NbtTag::Int(coord.z as i32));
        level.insert(
            "Sections",
            NbtTag::List(NbtList::from(vec![NbtTag::Compound(section)])),
        );
        let mut biomes = vec![0i8; COLUMN_COUNT];
        // Column (x = 1, z = 2), stored x major.
        biomes[CHUNK_EDGE + 2] = 7;
        level.insert("Biomes", NbtTag::ByteArray(biomes));
        wrap_level(level)
    }

    pub(crate) fn encode(root: &NbtCompound, compression: Compression) -> Vec<u8> {
        let mut raw = Vec::new();
        write_nbt(&mut raw, None, root, Flavor::Uncompressed).unwrap();
        match compression {
            Compression::Uncompressed => raw,
            Compression::Zlib => {
                let mut e = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                e.write_all(&raw).unwrap();
                e.finish().unwrap()
            }
            Compression::Gzip => {
                let mut e = GzEncoder::new(Vec::new(), flate2::Compression::default());
                e.write_all(&raw).unwrap();
                e.finish().unwrap()
            }
        }
    }

    #[test]
    fn decodes_sectioned_layout() {
        let root = sectioned_root(ChunkCoord::new(3, -2), 4, (3, 5, 7), 0x1A2, 6);
        let bytes = encode(&root, Compression::Zlib);
        let chunk = decode_chunk(&bytes, Compression::Zlib).unwrap();

        assert_eq!(chunk.coord, ChunkCoord::new(3, -2));
        assert_eq!(chunk.num_populated_sections(), 1);
        let p = local(3, 4 * 16 + 5, 7);
        assert_eq!(chunk.block_id(p), 0x1A2);
        assert_eq!(chunk.block_data(p), 6);
        assert_eq!(chunk.block_light(p), 9);
        assert_eq!(chunk.sky_light(p), MAX_LIGHT);
        // The neighbour sharing the packed byte is untouched.
        assert_eq!(chunk.block_data(local(2, 4 * 16 + 5, 7)), 0);
        assert_eq!(chunk.block_id(local(3, 5, 7)), 0);
        assert_eq!(chunk.biome(1, 2), 7);
        assert_eq!(chunk.biome(2, 1), 0);
    }

    #[test]
    fn every_compression_decodes_identically() {
        let root = sectioned_root(ChunkCoord::new(0, 0), 0, (1, 1, 1), 5, 1);
        let expected = decode_root(&root).unwrap();
        for compression in [Compression::Gzip, Compression::Zlib, Compression::Uncompressed] {
            let bytes = encode(&root, compression);
            assert_eq!(decode_chunk(&bytes, compression).unwrap(), expected);
        }
    }

    #[test]
    fn decodes_legacy_layout_with_y_parity_nibbles() {
        let layout = SectionLayout::Legacy;
        let mut blocks = vec![0i8; layout.block_count()];
        let mut data = vec![0i8; layout.nibble_count()];
        let mut sky = vec![0i8; layout.nibble_count()];

        // (x = 2, y = 65, z = 4): odd y, so the upper nibble.
        let i = layout.block_index(2, 65, 4);
        blocks[i] = 200u8 as i8;
        set_nibble(&mut data, i, true, 3);
        set_nibble(&mut sky, i, true, 12);
        // (x = 2, y = 64, z = 4) shares the byte through the lower nibble.
        let j = layout.block_index(2, 64, 4);
        assert_eq!(i / 2, j / 2);
        blocks[j] = 1;
        set_nibble(&mut data, j, false, 5);

        let mut level = NbtCompound::new();
        level.insert("xPos", NbtTag::Int(-1));
        level.insert("zPos", NbtTag::Int(1));
        level.insert("Blocks", NbtTag::ByteArray(blocks));
        level.insert("Data", NbtTag::ByteArray(data));
        level.insert("SkyLight", NbtTag::ByteArray(sky));
        let root = wrap_level(level);
        assert_eq!(detect_layout(&root), Some(SectionLayout::Legacy));

        let chunk = decode_root(&root).unwrap();
        assert_eq!(chunk.num_populated_sections(), 8);
        assert!(chunk.section(8).is_none());
        assert_eq!(chunk.block_id(local(2, 65, 4)), 200);
        assert_eq!(chunk.block_data(local(2, 65, 4)), 3);
        assert_eq!(chunk.sky_light(local(2, 65, 4)), 12);
        assert_eq!(chunk.block_id(local(2, 64, 4)), 1);
        assert_eq!(chunk.block_data(local(2, 64, 4)), 5);
        // Block light was absent.
        assert_eq!(chunk.block_light(local(2, 65, 4)), 0);
    }

    #[test]
    fn layouts_disagree_on_nibble_parity() {
        let packed = [0x21u8 as i8; 16];
        // Even x, odd y: legacy reads upper, sectioned reads lower.
        assert_eq!(SectionLayout::Legacy.nibble(&packed, 0, 1, 0), 2);
        // Odd x, even y: sectioned reads upper.
        assert_eq!(SectionLayout::Sectioned.nibble(&packed, 1, 0, 0), 2);
        assert_eq!(SectionLayout::Sectioned.nibble(&packed, 0, 0, 0), 1);
    }

    #[test]
    fn missing_level_is_bad_root() {
        let mut root = NbtCompound::new();
        root.insert("DataVersion", NbtTag::Int(1));
        assert!(matches!(decode_root(&root), Err(DecodeError::BadRoot)));

        let mut level = NbtCompound::new();
        level.insert("xPos", NbtTag::Int(0));
        assert!(matches!(decode_root(&wrap_level(level)), Err(DecodeError::BadRoot)));
    }

    #[test]
    fn short_arrays_are_truncated() {
        let mut root = sectioned_root(ChunkCoord::new(0, 0), 0, (0, 0, 0), 1, 0);
        if let Some(NbtTag::Compound(level)) = root.inner_mut().get_mut("Level") {
            if let Some(NbtTag::List(sections)) = level.inner_mut().get_mut("Sections") {
                let mut section = NbtCompound::new();
                section.insert("Y", NbtTag::Byte(1));
                section.insert("Blocks", NbtTag::ByteArray(vec![0; SECTION_SIZE - 1]));
                sections.push(NbtTag::Compound(section));
            }
        }
        match decode_root(&root) {
            Err(DecodeError::Truncated {
                field,
                expected,
                actual,
            }) => {
                assert_eq!(field, "Blocks");
                assert_eq!(expected, SECTION_SIZE);
                assert_eq!(actual, SECTION_SIZE - 1);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn garbage_bytes_are_errors_not_panics() {
        assert!(decode_chunk(&[1, 2, 3, 4], Compression::Uncompressed).is_err());
        assert!(decode_chunk(&[1, 2, 3, 4], Compression::Zlib).is_err());
        assert!(decode_chunk(&[], Compression::Gzip).is_err());
        assert!(matches!(
            Compression::from_tag(9),
            Err(DecodeError::UnknownCompression(9))
        ));
    }

    #[test]
    fn signs_decode_and_unknown_entities_are_skipped() {
        let mut root = sectioned_root(ChunkCoord::new(0, 0), 0, (0, 0, 0), 1, 0);
        let entities = vec![
            sign_tag(1, 64, 2, "Sign", ["Home", "", r#"{"text":"x"}"#, "y"]),
            sign_tag(3, 70, 4, "Chest", ["", "", "", ""]),
            NbtTag::Int(5),
            sign_tag(5, 71, 6, "minecraft:sign", ["a", "b", "c", "d"]),
        ];
        if let Some(NbtTag::Compound(level)) = root.inner_mut().get_mut("Level") {
            level.insert("TileEntities", NbtTag::List(NbtList::from(entities)));
        }

        let chunk = decode_root(&root).unwrap();
        assert_eq!(chunk.signs.len(), 2);
        assert_eq!((chunk.signs[0].x, chunk.signs[0].y, chunk.signs[0].z), (1, 64, 2));
        assert_eq!(chunk.signs[0].text, ["Home", "", "x", "y"].map(String::from));
        assert_eq!(chunk.signs[1].text, ["a", "b", "c", "d"].map(String::from));
    }

    #[test]
    fn out_of_range_sections_are_skipped() {
        let root = sectioned_root(ChunkCoord::new(0, 0), 16, (0, 0, 0), 1, 0);
        let chunk = decode_root(&root).unwrap();
        assert_eq!(chunk.num_populated_sections(), 0);
    }
}

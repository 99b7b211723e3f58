use crate::chunk::Chunk;

use serde::{Deserialize, Serialize};
use std::fmt;

pub const CHUNK_HASH_LEN: usize = blake3::OUT_LEN;

/// A content digest. Immutable once computed.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChunkHash([u8; CHUNK_HASH_LEN]);

impl ChunkHash {
    pub const fn from_bytes(bytes: [u8; CHUNK_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns `None` when `bytes` is not exactly one digest long, e.g. when read back from a file written by some other
    /// algorithm.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let mut out = [0; CHUNK_HASH_LEN];
        if bytes.len() != CHUNK_HASH_LEN {
            return None;
        }
        out.copy_from_slice(bytes);
        Some(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; CHUNK_HASH_LEN] {
        &self.0
    }
}

impl From<blake3::Hash> for ChunkHash {
    fn from(h: blake3::Hash) -> Self {
        Self(*h.as_bytes())
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", self)
    }
}

/// The digest used for every chunk, tile and fingerprint hash in one cache.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum HashAlgorithm {
    Blake3,
    /// BLAKE3 in keyed mode. Different keys never share cache entries.
    KeyedBlake3([u8; 32]),
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Blake3
    }
}

impl HashAlgorithm {
    pub fn hasher(&self) -> blake3::Hasher {
        match self {
            HashAlgorithm::Blake3 => blake3::Hasher::new(),
            HashAlgorithm::KeyedBlake3(key) => blake3::Hasher::new_keyed(key),
        }
    }

    /// A stable name for this algorithm that can be mixed into fingerprints. Keys are identified by their own digest so
    /// that they never appear in cache files.
    pub fn id(&self) -> String {
        match self {
            HashAlgorithm::Blake3 => "blake3".to_owned(),
            HashAlgorithm::KeyedBlake3(key) => format!("blake3-keyed-{}", blake3::hash(key).to_hex()),
        }
    }

    pub fn digest(&self, bytes: &[u8]) -> ChunkHash {
        let mut hasher = self.hasher();
        hasher.update(bytes);
        hasher.finalize().into()
    }
}

/// Stands in for an unpopulated section so that chunks with different numbers of populated sections never collide.
const ABSENT_SECTION: [u8; 1] = [0];

/// Computes the content digest of `chunk`.
///
/// Field order: for each of the 16 sections, bottom to top, the block ids (4 little-endian bytes each), block data, sky
/// light and block light, all in `x, y, z` order with `z` fastest. Then, for each sign in entity order, its position as
/// decimal text followed by its four lines.
pub fn hash_chunk(chunk: &Chunk, algo: &HashAlgorithm) -> ChunkHash {
    let mut hasher = algo.hasher();
    let mut id_bytes = Vec::new();
    for section in chunk.sections() {
        match section {
            Some(section) => {
                id_bytes.clear();
                id_bytes.extend(
                    section
                        .block_ids
                        .iter()
                        .flat_map(|&id| (id as u32).to_le_bytes()),
                );
                hasher.update(&id_bytes);
                hasher.update(&section.block_data);
                hasher.update(&section.sky_light);
                hasher.update(&section.block_light);
            }
            None => {
                hasher.update(&ABSENT_SECTION);
            }
        }
    }
    for sign in &chunk.signs {
        hasher.update(sign.x.to_string().as_bytes());
        hasher.update(sign.y.to_string().as_bytes());
        hasher.update(sign.z.to_string().as_bytes());
        for line in &sign.text {
            hasher.update(line.as_bytes());
        }
    }
    hasher.finalize().into()
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
    use crate::chunk::SignEntity;
    use crate::codec::{decode_root, test::sectioned_root};
    use crate::coordinates::{ChunkCoord, LocalPos};

    fn sample_chunk() -> Chunk {
        let mut chunk = Chunk::new(ChunkCoord::new(4, 4));
        chunk.set_block(LocalPos { x: 1, y: 10, z: 2 }, 17, 3);
        chunk.set_block(LocalPos { x: 9, y: 100, z: 0 }, 400, 0);
        chunk.signs.push(SignEntity {
            x: 65,
            y: 11,
            z: 66,
            text: ["a".into(), "b".into(), "".into(), "d".into()],
        });
        chunk
    }

    #[test]
    fn hashing_is_deterministic() {
        let chunk = sample_chunk();
        let algo = HashAlgorithm::Blake3;
        assert_eq!(hash_chunk(&chunk, &algo), hash_chunk(&chunk, &algo));
        assert_eq!(hash_chunk(&chunk, &algo), hash_chunk(&chunk.clone(), &algo));
    }

    #[test]
    fn decode_order_does_not_matter() {
        let algo = HashAlgorithm::Blake3;
        let a = decode_root(&sectioned_root(ChunkCoord::new(0, 0), 2, (1, 2, 3), 9, 1)).unwrap();
        let b = decode_root(&sectioned_root(ChunkCoord::new(0, 0), 2, (1, 2, 3), 9, 1)).unwrap();
        let hashes = crossbeam::scope(|s| {
            let ha = s.spawn(|_| hash_chunk(&a, &algo));
            let hb = s.spawn(|_| hash_chunk(&b, &algo));
            (ha.join().unwrap(), hb.join().unwrap())
        })
        .unwrap();
        assert_eq!(hashes.0, hashes.1);
    }

    #[test]
    fn single_bit_change_changes_hash() {
        let algo = HashAlgorithm::Blake3;
        let chunk = sample_chunk();
        let mut changed = chunk.clone();
        changed.set_block(LocalPos { x: 1, y: 10, z: 2 }, 17, 2);
        assert_ne!(hash_chunk(&chunk, &algo), hash_chunk(&changed, &algo));

        let mut relit = chunk.clone();
        relit.section_or_insert(0).sky_light[0] ^= 1;
        assert_ne!(hash_chunk(&chunk, &algo), hash_chunk(&relit, &algo));
    }

    #[test]
    fn signs_participate() {
        let algo = HashAlgorithm::Blake3;
        let chunk = sample_chunk();
        let mut edited = chunk.clone();
        edited.signs[0].text[2] = "c".into();
        assert_ne!(hash_chunk(&chunk, &algo), hash_chunk(&edited, &algo));

        let mut moved = chunk.clone();
        moved.signs[0].y = 12;
        assert_ne!(hash_chunk(&chunk, &algo), hash_chunk(&moved, &algo));
    }

    #[test]
    fn empty_sections_are_not_the_same_as_no_sections() {
        let algo = HashAlgorithm::Blake3;
        let empty = Chunk::new(ChunkCoord::new(0, 0));
        let mut one_empty_section = empty.clone();
        one_empty_section.section_or_insert(3);
        assert_ne!(hash_chunk(&empty, &algo), hash_chunk(&one_empty_section, &algo));
    }

    #[test]
    fn algorithms_do_not_collide() {
        let chunk = sample_chunk();
        let plain = hash_chunk(&chunk, &HashAlgorithm::Blake3);
        let keyed = hash_chunk(&chunk, &HashAlgorithm::KeyedBlake3([7; 32]));
        assert_ne!(plain, keyed);
        assert_ne!(HashAlgorithm::Blake3.id(), HashAlgorithm::KeyedBlake3([7; 32]).id());
    }

    #[test]
    fn hash_slices_must_be_exact() {
        let h = HashAlgorithm::Blake3.digest(b"abc");
        assert_eq!(ChunkHash::from_slice(h.as_bytes()), Some(h));
        assert_eq!(ChunkHash::from_slice(&h.as_bytes()[1..]), None);
        assert_eq!(h.to_string().len(), 2 * CHUNK_HASH_LEN);
    }
}

//! The strata map data model and its content-addressed caches.
//!
//! # Chunks
//!
//! The world is partitioned into 16x16 block columns called [`Chunk`](crate::Chunk)s, stored 32x32 at a time in region
//! containers. A chunk is decoded from one of two on-disk layouts (see [`SectionLayout`](crate::SectionLayout)) into a
//! single canonical form, so everything downstream is layout-agnostic.
//!
//! # Hashes
//!
//! Every decoded chunk has a [`ChunkHash`](crate::ChunkHash). Hashes are persisted per region by the
//! [`RegionHashIndex`](crate::RegionHashIndex) and compared against the previous run to decide what needs re-rendering.
//!
//! # Memory Caches
//!
//! Decoded chunks and the geometry built from them are held in bounded [`ChunkMemoryCache`](crate::ChunkMemoryCache)s.
//! Evicted values are queued for their owner to release rather than dropped in place.

mod cache_io;
mod chunk;
mod codec;
mod coordinates;
mod hasher;
mod loader;
mod memory_cache;
mod region_file;
mod region_hash;
mod subset;

pub use cache_io::*;
pub use chunk::*;
pub use codec::*;
pub use coordinates::*;
pub use hasher::*;
pub use loader::*;
pub use memory_cache::*;
pub use region_file::*;
pub use region_hash::*;
pub use subset::*;

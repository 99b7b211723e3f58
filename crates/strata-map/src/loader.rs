use crate::chunk::Chunk;
use crate::codec::decode_chunk;
use crate::coordinates::ChunkCoord;
use crate::memory_cache::{ChunkLoader, ChunkMemoryCache};
use crate::region_file::ChunkSource;
use crate::subset::WorldSubset;

use std::sync::Arc;

/// Reads, decodes and masks one chunk. Failures are logged and treated as an absent chunk.
pub fn read_masked_chunk<S: ChunkSource + ?Sized>(
    source: &S,
    subset: &WorldSubset,
    coord: ChunkCoord,
) -> Option<Chunk> {
    let (bytes, compression) = match source.read_chunk(coord) {
        Ok(Some(blob)) => blob,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("failed to read chunk {}: {}", coord, e);
            return None;
        }
    };
    match decode_chunk(&bytes, compression) {
        Ok(mut chunk) => {
            subset.mask_chunk(&mut chunk);
            Some(chunk)
        }
        Err(e) => {
            log::warn!("skipping undecodable chunk {}: {}", coord, e);
            None
        }
    }
}

/// Loads decoded chunks for the raw cache. Chunks outside of the subset are never read.
pub struct RawChunkLoader<S: ?Sized> {
    subset: WorldSubset,
    source: Arc<S>,
}

impl<S: ChunkSource + ?Sized> RawChunkLoader<S> {
    pub fn new(source: Arc<S>, subset: WorldSubset) -> Self {
        Self { subset, source }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn subset(&self) -> &WorldSubset {
        &self.subset
    }
}

impl<S: ChunkSource + ?Sized> ChunkLoader for RawChunkLoader<S> {
    type Output = Chunk;

    fn load(&self, coord: ChunkCoord) -> Option<Chunk> {
        if !self.subset.contains(coord) {
            return None;
        }
        read_masked_chunk(&*self.source, &self.subset, coord)
    }
}

pub type RawChunkCache<S> = ChunkMemoryCache<RawChunkLoader<S>>;

/// Turns a decoded chunk into render geometry.
pub trait GeometryBuilder: Send + Sync {
    /// Block shapes and whatever else the builder needs besides the chunk itself.
    type Registry: Send + Sync;
    type Geometry: Send + Sync;

    fn build(&self, chunk: &Chunk, registry: &Self::Registry) -> Self::Geometry;

    /// Frees any external resources owned by `geometry`. Called once per built value, after it has left the cache for
    /// good.
    fn release(&self, _coord: ChunkCoord, _geometry: &Self::Geometry) {}
}

/// Builds geometry from chunks read through the raw cache, so a chunk is always fully decoded before any geometry is
/// built from it.
pub struct GeometryLoader<S: ChunkSource + ?Sized, B: GeometryBuilder> {
    raw: Arc<RawChunkCache<S>>,
    builder: B,
    registry: Arc<B::Registry>,
}

impl<S, B> GeometryLoader<S, B>
where
    S: ChunkSource + ?Sized,
    B: GeometryBuilder,
{
    pub fn new(raw: Arc<RawChunkCache<S>>, builder: B, registry: Arc<B::Registry>) -> Self {
        Self { raw, builder, registry }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn raw(&self) -> &Arc<RawChunkCache<S>> {
        &self.raw
    }
}

impl<S, B> ChunkLoader for GeometryLoader<S, B>
where
    S: ChunkSource + ?Sized,
    B: GeometryBuilder,
{
    type Output = B::Geometry;

    fn load(&self, coord: ChunkCoord) -> Option<B::Geometry> {
        let chunk = self.raw.get(coord)?;
        Some(self.builder.build(&chunk, &self.registry))
    }
}

pub type GeometryCache<S, B> = ChunkMemoryCache<GeometryLoader<S, B>>;

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

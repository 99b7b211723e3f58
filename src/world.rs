use crate::config::CacheConfig;

use std::sync::Arc;
use strata_map::{
    BlockPos, Chunk, ChunkCoord, ChunkSource, GeometryBuilder, GeometryCache, GeometryLoader, LocalPos,
    RawChunkCache, RawChunkLoader, WorldSubset, AIR, MAX_LIGHT,
};

/// The decoded world as seen by the renderer: a raw chunk cache and a geometry cache that reads through it.
///
/// Both caches only queue what they evict. Call [`World::unload_evicted`] between units of work to actually release it.
pub struct World<S: ChunkSource + ?Sized, B: GeometryBuilder> {
    raw: Arc<RawChunkCache<S>>,
    geometry: GeometryCache<S, B>,
}

/// What one call to [`World::unload_evicted`] released.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UnloadStats {
    pub raw_chunks: usize,
    pub geometry: usize,
}

impl<S, B> World<S, B>
where
    S: ChunkSource + ?Sized,
    B: GeometryBuilder,
{
    pub fn new(
        source: Arc<S>,
        subset: WorldSubset,
        builder: B,
        registry: Arc<B::Registry>,
        config: &CacheConfig,
    ) -> Self {
        let raw = Arc::new(RawChunkCache::new(
            RawChunkLoader::new(source, subset),
            config.raw_chunk_cache_size,
        ));
        let geometry = GeometryCache::new(
            GeometryLoader::new(raw.clone(), builder, registry),
            config.geometry_cache_size,
        );
        Self { raw, geometry }
    }

    pub fn raw(&self) -> &RawChunkCache<S> {
        &self.raw
    }

    pub fn geometry(&self) -> &GeometryCache<S, B> {
        &self.geometry
    }

    pub fn subset(&self) -> &WorldSubset {
        self.raw.loader().subset()
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.raw.get(coord)
    }

    pub fn chunk_geometry(&self, coord: ChunkCoord) -> Option<Arc<B::Geometry>> {
        self.geometry.get(coord)
    }

    fn read_block<T>(&self, pos: BlockPos, default: T, read: impl FnOnce(&Chunk, LocalPos) -> T) -> T {
        let (coord, local) = pos.split();
        match self.chunk(coord) {
            Some(chunk) => read(&chunk, local),
            None => default,
        }
    }

    pub fn block_id(&self, pos: BlockPos) -> u16 {
        self.read_block(pos, AIR, Chunk::block_id)
    }

    pub fn block_data(&self, pos: BlockPos) -> u8 {
        self.read_block(pos, 0, Chunk::block_data)
    }

    pub fn sky_light(&self, pos: BlockPos) -> u8 {
        self.read_block(pos, MAX_LIGHT, Chunk::sky_light)
    }

    pub fn block_light(&self, pos: BlockPos) -> u8 {
        self.read_block(pos, 0, Chunk::block_light)
    }

    /// Biome id of the column at world `(x, z)`.
    pub fn biome(&self, x: i64, z: i64) -> u8 {
        self.read_block(BlockPos::new(x, 0, z), 0, |chunk, local| chunk.biome(local.x, local.z))
    }

    /// Releases everything either cache evicted since the last call. Geometry goes first, since it was built from raw
    /// chunks.
    pub fn unload_evicted(&self) -> UnloadStats {
        let builder = self.geometry.loader().builder();
        let mut stats = UnloadStats::default();
        for (coord, geometry) in self.geometry.drain_evicted() {
            builder.release(coord, &geometry);
            stats.geometry += 1;
        }
        stats.raw_chunks = self.raw.drain_evicted().count();
        if stats != UnloadStats::default() {
            log::debug!(
                "released {} geometry and {} raw chunks",
                stats.geometry,
                stats.raw_chunks
            );
        }
        stats
    }

    /// Drops every cached chunk and releases all geometry.
    pub fn unload_all(&self) -> UnloadStats {
        self.geometry.invalidate_all();
        self.raw.invalidate_all();
        self.unload_evicted()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

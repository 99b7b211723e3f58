//! Incremental map rendering on top of the strata chunk caches.
//!
//! A run opens a [`MapCache`], which validates the cache directory with [`CacheFingerprintGuard`] and hashes every
//! chunk into a [`RegionHashIndex`](strata_map::RegionHashIndex). A [`RenderPass`] then re-renders only the targets
//! whose [`TileChangeDetector`] digest moved since the previous run, listing every image it wrote in a [`ChangeFile`].

mod change_file;
mod config;
mod fingerprint;
mod map_cache;
mod render_pass;
mod tile_change;
mod world;

#[cfg(test)]
mod test_util;

pub use change_file::*;
pub use config::*;
pub use fingerprint::*;
pub use map_cache::*;
pub use render_pass::*;
pub use tile_change::*;
pub use world::*;

pub use strata_core;
pub use strata_map;

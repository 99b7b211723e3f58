use crate::coordinates::ChunkCoord;

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::LruList;

/// Produces the cached value for one chunk. Called without any cache lock held, so loads of different coordinates run
/// in parallel.
pub trait ChunkLoader: Send + Sync {
    type Output: Send + Sync;

    /// `None` means there is nothing to cache for `coord`, and the next `get` will try again.
    fn load(&self, coord: ChunkCoord) -> Option<Self::Output>;
}

struct CacheState<T> {
    live: LruList<ChunkCoord, Arc<T>>,
    evicted: SmallVec<[(ChunkCoord, Arc<T>); 8]>,
}

/// A bounded, read-through cache of per-chunk values.
///
/// Evicted entries are not dropped in place. They wait in a queue until the owner calls
/// [`drain_evicted`](ChunkMemoryCache::drain_evicted), which is where any resources tied to them get released. Values are
/// handed out as `Arc`s, so a reader that still holds an evicted value keeps it alive.
pub struct ChunkMemoryCache<L: ChunkLoader> {
    loader: L,
    max_size: usize,
    state: Mutex<CacheState<L::Output>>,
    loads: AtomicU64,
}

impl<L: ChunkLoader> ChunkMemoryCache<L> {
    /// A `max_size` of zero is treated as one.
    pub fn new(loader: L, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            loader,
            max_size,
            state: Mutex::new(CacheState {
                live: LruList::with_capacity(max_size + 1),
                evicted: SmallVec::new(),
            }),
            loads: AtomicU64::new(0),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.state.lock().live.contains_key(&coord)
    }

    /// Total number of successful loads since construction.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Returns the cached value for `coord`, loading it on a miss.
    ///
    /// When two threads miss on the same coordinate at once, both load, the first to insert wins and the other's value
    /// is queued as evicted. Both callers get the winning value.
    pub fn get(&self, coord: ChunkCoord) -> Option<Arc<L::Output>> {
        if let Some(hit) = self.state.lock().live.get(&coord) {
            return Some(hit.clone());
        }

        let loaded = Arc::new(self.loader.load(coord)?);
        self.loads.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        if let Some(winner) = state.live.get(&coord).cloned() {
            state.evicted.push((coord, loaded));
            return Some(winner);
        }
        state.live.insert(coord, loaded.clone());
        while state.live.len() > self.max_size {
            match state.live.pop_least_recent() {
                Some(entry) => state.evicted.push(entry),
                None => break,
            }
        }
        Some(loaded)
    }

    /// Moves every live entry to the evicted queue.
    pub fn invalidate_all(&self) {
        let mut state = self.state.lock();
        let drained = state.live.drain();
        log::debug!("invalidating {} cached chunks", drained.len());
        state.evicted.extend(drained);
    }

    /// Takes the queue of evicted entries, least recently used first.
    ///
    /// Every value that left the cache is yielded exactly once, including one whose coordinate has been loaded again
    /// since: the reload is a separate value. Only an entry that is the very allocation still live is held back.
    pub fn drain_evicted(&self) -> impl Iterator<Item = (ChunkCoord, Arc<L::Output>)> {
        let mut state = self.state.lock();
        let evicted = std::mem::take(&mut state.evicted);
        let released: Vec<_> = evicted
            .into_iter()
            .filter(|(coord, value)| {
                !state
                    .live
                    .peek(coord)
                    .map_or(false, |current| Arc::ptr_eq(current, value))
            })
            .collect();
        released.into_iter()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

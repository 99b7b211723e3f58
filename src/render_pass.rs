use crate::change_file::ChangeFile;
use crate::config::WorkerConfig;
use crate::tile_change::{CommitError, DigestTarget, TileChangeDetector};
use crate::world::World;

use itertools::Itertools;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_core::WorkTimer;
use strata_map::{CacheIoError, ChunkCoord, ChunkSource, GeometryBuilder, TileCoord};
use thiserror::Error;
use thread_local::ThreadLocal;

/// Errors reported by the rendering collaborators.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Answers which chunks can show up in an output image.
pub trait ChunkVisibility: Sync {
    fn visible_chunks(&self, target: &DigestTarget) -> Vec<ChunkCoord>;
}

/// Renders and writes output images.
pub trait TileRenderer: Sync {
    fn image_exists(&self, target: &DigestTarget) -> bool;

    /// Returns the path of the written image.
    fn render(&self, target: &DigestTarget) -> Result<PathBuf, CollaboratorError>;
}

/// Builds the image of `tile` at zoom `level` from the four images one level closer. Level 1 is built from the
/// rendered tiles.
pub trait Downsampler: Sync {
    /// Returns the path of the written image.
    fn downsample(&self, level: u32, tile: TileCoord) -> Result<PathBuf, CollaboratorError>;
}

#[derive(Debug, Error)]
pub enum RenderPassError {
    #[error("failed to render {target:?}")]
    Render {
        target: DigestTarget,
        #[source]
        source: CollaboratorError,
    },
    #[error("failed to downsample {tile:?} at level {level}")]
    Downsample {
        level: u32,
        tile: TileCoord,
        #[source]
        source: CollaboratorError,
    },
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    ChangeFile(#[from] CacheIoError),
    #[error("a worker thread panicked")]
    WorkerPanicked,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PassStats {
    pub targets: usize,
    pub changed: usize,
    pub downsampled: usize,
    pub find_changed_time: WorkTimer,
    pub render_time: WorkTimer,
    pub downsample_time: WorkTimer,
}

/// One incremental update of a layer: find the changed targets, render them, then rebuild the zoomed out tiles above
/// them. Phases never overlap.
pub struct RenderPass {
    workers: WorkerConfig,
    zoom_levels: u32,
    detector: Arc<TileChangeDetector>,
    changes: Option<ChangeFile>,
}

impl RenderPass {
    /// `zoom_levels` counts the rendered level, so `1` disables downsampling.
    pub fn new(workers: WorkerConfig, zoom_levels: u32, detector: Arc<TileChangeDetector>) -> Self {
        Self {
            workers,
            zoom_levels,
            detector,
            changes: None,
        }
    }

    /// Lists every image this pass writes in `changes`.
    pub fn with_change_file(mut self, changes: ChangeFile) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn detector(&self) -> &TileChangeDetector {
        &self.detector
    }

    pub fn change_file(&self) -> Option<&ChangeFile> {
        self.changes.as_ref()
    }

    fn record_change(&self, image: &Path) {
        if let Some(changes) = &self.changes {
            if let Err(e) = changes.write_line(image) {
                log::warn!("{}", e);
            }
        }
    }

    pub fn run<S, B, V, R, D>(
        &self,
        targets: &[DigestTarget],
        world: &World<S, B>,
        visibility: &V,
        renderer: &R,
        downsampler: &D,
    ) -> Result<PassStats, RenderPassError>
    where
        S: ChunkSource + ?Sized,
        B: GeometryBuilder,
        V: ChunkVisibility + ?Sized,
        R: TileRenderer + ?Sized,
        D: Downsampler + ?Sized,
    {
        let mut stats = PassStats {
            targets: targets.len(),
            ..Default::default()
        };
        self.detector.reset();

        let (changed, timer) = run_phase(self.workers.find_changed, targets, |target| {
            let visible = visibility.visible_chunks(target);
            let stale = self.detector.check(target, &visible, renderer.image_exists(target));
            Ok(stale.then(|| target.clone()))
        })?;
        stats.changed = changed.len();
        stats.find_changed_time = timer;
        log::info!(
            "{} of {} targets changed ({} us per target)",
            stats.changed,
            stats.targets,
            timer.average_cpu_time_us()
        );
        world.unload_evicted();

        let (rendered, timer) = run_phase(self.workers.render, &changed, |target| {
            let image = renderer.render(target).map_err(|source| RenderPassError::Render {
                target: target.clone(),
                source,
            })?;
            self.record_change(&image);
            match self.detector.commit(target) {
                Ok(()) => {}
                // The image is written, so the worst case is rendering it again next time.
                Err(CommitError::Io(e)) => log::warn!("{}", e),
                Err(e) => return Err(e.into()),
            }
            Ok(Some(target))
        })?;
        stats.render_time = timer;
        log::info!(
            "rendered {} targets ({} us per target)",
            rendered.len(),
            timer.average_cpu_time_us()
        );
        world.unload_evicted();

        let mut tiles: Vec<TileCoord> = rendered
            .iter()
            .filter_map(|target| match target {
                DigestTarget::Tile(tile) => Some(tile.parent()),
                DigestTarget::View { .. } => None,
            })
            .unique()
            .sorted_by_key(|tile| tile.z_order())
            .collect();
        for level in 1..self.zoom_levels {
            if tiles.is_empty() {
                break;
            }
            let (done, timer) = run_phase(self.workers.downsample, &tiles, |&tile| {
                let image = downsampler
                    .downsample(level, tile)
                    .map_err(|source| RenderPassError::Downsample { level, tile, source })?;
                self.record_change(&image);
                Ok(Some(tile))
            })?;
            stats.downsampled += done.len();
            stats.downsample_time += timer;
            log::debug!("downsampled {} tiles at level {}", done.len(), level);
            tiles = done
                .into_iter()
                .map(TileCoord::parent)
                .unique()
                .sorted_by_key(|tile| tile.z_order())
                .collect();
        }
        log::info!(
            "downsampled {} tiles ({} us per tile)",
            stats.downsampled,
            stats.downsample_time.average_cpu_time_us()
        );
        if let Some(changes) = &self.changes {
            changes.flush()?;
            log::info!("listed {} changed images in {}", changes.len(), changes.path().display());
        }

        Ok(stats)
    }
}

/// Runs `work` on every item with `workers` threads pulling from a shared queue. Outputs come back in item order. The
/// first error stops the remaining workers and is returned.
fn run_phase<'a, T, R>(
    workers: usize,
    items: &'a [T],
    work: impl Fn(&'a T) -> Result<Option<R>, RenderPassError> + Sync,
) -> Result<(Vec<R>, WorkTimer), RenderPassError>
where
    T: Sync,
    R: Send,
{
    let timers: ThreadLocal<RefCell<WorkTimer>> = ThreadLocal::new();
    let failed = AtomicBool::new(false);

    let (job_tx, job_rx) = crossbeam::channel::unbounded();
    for i in 0..items.len() {
        if job_tx.send(i).is_err() {
            break;
        }
    }
    drop(job_tx);

    let (out_tx, out_rx) = crossbeam::channel::unbounded();
    let joined = crossbeam::scope(|s| {
        for _ in 0..workers.max(1) {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            let (timers, failed, work) = (&timers, &failed, &work);
            s.spawn(move |_| {
                let mut timer = timers.get_or(|| RefCell::new(WorkTimer::default())).borrow_mut();
                for i in job_rx.iter() {
                    if failed.load(Ordering::Relaxed) {
                        break;
                    }
                    let result = timer.time(|| work(&items[i]));
                    if result.is_err() {
                        failed.store(true, Ordering::Relaxed);
                    }
                    if out_tx.send((i, result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(out_tx);
    joined.map_err(|_| RenderPassError::WorkerPanicked)?;

    let mut outputs = Vec::new();
    for (_, result) in out_rx.iter().sorted_by_key(|(i, _)| *i) {
        if let Some(output) = result? {
            outputs.push(output);
        }
    }

    let mut total = WorkTimer::default();
    for timer in timers.into_iter() {
        total += timer.into_inner();
    }
    Ok((outputs, total))
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

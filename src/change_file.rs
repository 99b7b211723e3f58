use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_map::CacheIoError;

/// Name of the changed image list in the output directory.
pub const CHANGE_FILE_NAME: &str = "changed.txt";

/// The list of every image file a render pass wrote, one path per line, for tools that upload or post-process only
/// what changed.
///
/// Shared by all workers of a pass. Lines appear in completion order.
pub struct ChangeFile {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    lines: AtomicUsize,
}

impl ChangeFile {
    /// Starts a new list at `path`, replacing the one left by the previous run.
    pub fn create(path: PathBuf) -> Result<Self, CacheIoError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheIoError::new(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| CacheIoError::new(&path, e))?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            lines: AtomicUsize::new(0),
        })
    }

    /// [`create`](Self::create) with the default name inside `output_dir`.
    pub fn in_output_dir(output_dir: &Path) -> Result<Self, CacheIoError> {
        Self::create(output_dir.join(CHANGE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines written so far.
    pub fn len(&self) -> usize {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_line(&self, image: &Path) -> Result<(), CacheIoError> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", image.display()).map_err(|e| CacheIoError::new(&self.path, e))?;
        self.lines.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), CacheIoError> {
        self.writer.lock().flush().map_err(|e| CacheIoError::new(&self.path, e))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

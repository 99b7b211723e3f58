use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A read or write of a cache file failed.
#[derive(Debug, Error)]
#[error("cache I/O on {}: {source}", .path.display())]
pub struct CacheIoError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl CacheIoError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Reads a whole digest file. A missing file is `Ok(None)`, meaning "never computed".
pub fn read_digest_file(path: &Path) -> Result<Option<Vec<u8>>, CacheIoError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheIoError::new(path, e)),
    }
}

/// Writes `bytes` to `path`, replacing any previous contents, and syncs the file.
pub fn write_digest_file(path: &Path, bytes: &[u8]) -> Result<(), CacheIoError> {
    let write = || -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    };
    write().map_err(|e| CacheIoError::new(path, e))
}

/// Deletes `dir` and everything below it, then recreates it empty.
pub fn recreate_dir(dir: &Path) -> Result<(), CacheIoError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(CacheIoError::new(dir, e)),
    }
    fs::create_dir_all(dir).map_err(|e| CacheIoError::new(dir, e))
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

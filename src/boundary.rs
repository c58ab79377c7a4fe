//! The only place bytes are read from disk.
//!
//! Reads are confined twice: the target is canonicalized (all symlinks
//! resolved) and must still sit under the canonical root, and the final open
//! refuses symlinks (`O_NOFOLLOW`) and anything that is not a regular file,
//! checked on the opened handle rather than the path.

use crate::errors::{ImportError, ImportResult};
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("{path:?} not found")]
    NotFound { path: PathBuf },
    #[error("{path:?} resolves outside root {root:?}")]
    Escape { path: PathBuf, root: PathBuf },
    #[error("open {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("boundary closed")]
    Closed { root: PathBuf },
}

impl From<BoundaryError> for ImportError {
    fn from(err: BoundaryError) -> Self {
        match err {
            BoundaryError::NotFound { path } => ImportError::OpenFailure {
                path,
                source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
            },
            BoundaryError::Escape { path, root } => ImportError::OpenFailure {
                path,
                source: Arc::new(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("path escapes from root {}", root.display()),
                )),
            },
            BoundaryError::Open { path, source } => ImportError::OpenFailure { path, source: Arc::new(source) },
            BoundaryError::Read { path, source } => ImportError::ReadFailure { path, source: Arc::new(source) },
            BoundaryError::Closed { root } => ImportError::Closed { root },
        }
    }
}

#[derive(Debug)]
struct RootHandle {
    canonical: PathBuf,
    #[cfg(unix)]
    dir: File,
}

#[derive(Debug)]
pub struct Boundary {
    handle: RwLock<Option<RootHandle>>,
    root: PathBuf,
    max_file_bytes: Option<u64>,
}

impl Boundary {
    pub fn open(root_dir: &Path) -> ImportResult<Self> {
        if root_dir.as_os_str().is_empty() {
            return Err(ImportError::EmptyRoot);
        }
        let cannot_open = |source: io::Error| ImportError::CannotOpenRoot {
            root: root_dir.to_path_buf(),
            source: Arc::new(source),
        };
        let canonical = dunce::canonicalize(root_dir).map_err(cannot_open)?;
        let meta = fs::metadata(&canonical).map_err(cannot_open)?;
        if !meta.is_dir() {
            return Err(cannot_open(io::Error::new(io::ErrorKind::Other, "not a directory")));
        }
        let handle = RootHandle {
            #[cfg(unix)]
            dir: File::open(&canonical).map_err(cannot_open)?,
            canonical: canonical.clone(),
        };
        Ok(Self { handle: RwLock::new(Some(handle)), root: canonical, max_file_bytes: None })
    }

    pub fn with_max_file_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_file_bytes = limit;
        self
    }

    /// Canonical root; stays valid after close.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.handle.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    pub fn open_relative(&self, relative: &Path) -> Result<Bytes, BoundaryError> {
        let guard = self.handle.read().unwrap_or_else(PoisonError::into_inner);
        let handle = guard.as_ref().ok_or_else(|| BoundaryError::Closed { root: self.root.clone() })?;
        let escape = || BoundaryError::Escape { path: relative.to_path_buf(), root: handle.canonical.clone() };
        let open_err = |source| BoundaryError::Open { path: relative.to_path_buf(), source };

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(escape());
        }

        let resolved = match dunce::canonicalize(handle.canonical.join(relative)) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BoundaryError::NotFound { path: relative.to_path_buf() })
            }
            Err(source) => return Err(open_err(source)),
        };
        if !resolved.starts_with(&handle.canonical) {
            return Err(escape());
        }
        handle.verify_root()?;

        let file = open_no_follow(&resolved).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                BoundaryError::NotFound { path: relative.to_path_buf() }
            } else {
                open_err(source)
            }
        })?;
        let meta = file.metadata().map_err(open_err)?;
        if !meta.is_file() {
            return Err(open_err(io::Error::new(io::ErrorKind::Other, "not a regular file")));
        }
        if let Some(limit) = self.max_file_bytes {
            if meta.len() > limit {
                return Err(BoundaryError::Read {
                    path: relative.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("file is {} bytes, limit is {limit}", meta.len()),
                    ),
                });
            }
        }

        read_bounded(file, meta.len(), self.max_file_bytes)
            .map_err(|source| BoundaryError::Read { path: relative.to_path_buf(), source })
    }

    /// Releases the directory handle. Closing twice is fine.
    pub fn close(&self) -> ImportResult<()> {
        let mut guard = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(handle) => handle.release(),
            None => Ok(()),
        }
    }
}

impl RootHandle {
    /// The directory behind `canonical` must still be the one opened at
    /// construction; a swapped-in directory or symlink fails the read.
    #[cfg(unix)]
    fn verify_root(&self) -> Result<(), BoundaryError> {
        use std::os::unix::fs::MetadataExt;
        let swapped = || BoundaryError::Escape { path: PathBuf::from("."), root: self.canonical.clone() };
        let held = self
            .dir
            .metadata()
            .map_err(|source| BoundaryError::Open { path: PathBuf::from("."), source })?;
        let current = fs::symlink_metadata(&self.canonical).map_err(|_| swapped())?;
        if held.dev() != current.dev() || held.ino() != current.ino() {
            return Err(swapped());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn verify_root(&self) -> Result<(), BoundaryError> {
        Ok(())
    }

    // Dropping a File ignores close(2) errors, so close the descriptor by hand.
    #[cfg(unix)]
    fn release(self) -> ImportResult<()> {
        use std::os::unix::io::IntoRawFd;
        let fd = self.dir.into_raw_fd();
        // SAFETY: `fd` was just taken out of an owned File and is closed exactly once.
        if unsafe { libc::close(fd) } != 0 {
            return Err(ImportError::CloseFailure {
                root: self.canonical,
                source: Arc::new(io::Error::last_os_error()),
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn release(self) -> ImportResult<()> {
        Ok(())
    }
}

fn open_no_follow(path: &Path) -> io::Result<File> {
    #[cfg(unix)]
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    {
        options.custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC);
    }
    options.open(path)
}

const MAX_PREALLOC: u64 = 1 << 20;

pub(crate) fn read_bounded(file: File, size_hint: u64, limit: Option<u64>) -> io::Result<Bytes> {
    // The size is only a hint; the file may shrink or grow before the read.
    let mut buf = Vec::with_capacity(usize::try_from(size_hint.min(MAX_PREALLOC)).unwrap_or(0));
    match limit {
        Some(limit) => {
            file.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
            if buf.len() as u64 > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("file grew past limit of {limit} bytes"),
                ));
            }
        }
        None => {
            let mut file = file;
            file.read_to_end(&mut buf)?;
        }
    }
    Ok(Bytes::from(buf))
}

//! Public entry point: one importer per sandbox root.
//!
//! ```no_run
//! use rootjail::{Importer, ImporterOptions};
//!
//! let importer = Importer::new("/srv/config", &["/srv/config/lib"], ImporterOptions::new())?;
//! let main = importer.resolve("", "/srv/config/main.jsonnet")?;
//! let util = importer.resolve(&main.found_at.to_string_lossy(), "util.jsonnet")?;
//! # let _ = util;
//! importer.close()?;
//! # Ok::<(), rootjail::ImportError>(())
//! ```

use crate::boundary::{Boundary, BoundaryError};
use crate::cache::{CacheEntry, CacheKey, EntryState, ImportCache, Lookup};
use crate::errors::{ImportError, ImportResult};
use crate::resolver::{absolutize, clean, Decision, ImportRequest, PathResolver, ResolutionCandidate};
use crate::search::SearchChain;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn, Dispatch};

/// What the evaluator consumes: one call per import expression.
pub trait FileImporter {
    fn resolve(&self, imported_from: &str, imported_path: &str) -> ImportResult<Resolved>;
}

pub type DynImporter = Arc<dyn FileImporter + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub content: Bytes,
    /// Canonical absolute path; pass it back as `imported_from` for nested imports.
    pub found_at: PathBuf,
}

impl Resolved {
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImporterOptions {
    logger: Option<Dispatch>,
    working_dir: Option<PathBuf>,
    max_file_bytes: Option<u64>,
}

impl ImporterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send this importer's diagnostics to `dispatch` instead of the ambient subscriber.
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    /// Directory that initial relative imports are read against. Defaults to
    /// the process working directory at construction.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = Some(limit);
        self
    }
}

#[derive(Debug)]
pub struct Importer {
    boundary: Boundary,
    resolver: PathResolver,
    search: SearchChain,
    cache: ImportCache,
    logger: Option<Dispatch>,
}

impl Importer {
    pub fn new<S: AsRef<str>>(
        root_dir: impl AsRef<Path>,
        library_paths: &[S],
        options: ImporterOptions,
    ) -> ImportResult<Self> {
        let root_dir = root_dir.as_ref();
        let ImporterOptions { logger, working_dir, max_file_bytes } = options;

        let boundary = Boundary::open(root_dir)?.with_max_file_bytes(max_file_bytes);
        let mut cwd = None;
        let root = absolute_path(root_dir, &mut cwd)?;
        let working_dir = match working_dir {
            Some(dir) => absolute_path(&dir, &mut cwd)?,
            None => absolute_path(Path::new("."), &mut cwd)?,
        };
        let search = SearchChain::new(&root, library_paths)?;

        let importer = Self {
            boundary,
            resolver: PathResolver::new(root, working_dir),
            search,
            cache: ImportCache::new(),
            logger,
        };
        importer.traced(|| {
            info!(
                root = %importer.root().display(),
                canonical_root = %importer.boundary.root().display(),
                working_dir = %importer.resolver.working_dir().display(),
                jpaths = ?importer.search.dirs(),
                "importer ready"
            )
        });
        Ok(importer)
    }

    /// Absolute (uncanonicalized) root used for path decisions.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Validated library paths, root-relative.
    pub fn library_paths(&self) -> &[PathBuf] {
        self.search.dirs()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn is_closed(&self) -> bool {
        self.boundary.is_closed()
    }

    pub fn resolve(&self, imported_from: &str, imported_path: &str) -> ImportResult<Resolved> {
        self.traced(|| self.resolve_request(imported_from, imported_path))
    }

    /// Releases the root handle. Cached entries are left alone.
    pub fn close(&self) -> ImportResult<()> {
        self.traced(|| {
            let res = self.boundary.close();
            debug!(root = %self.root().display(), ok = res.is_ok(), "importer closed");
            res
        })
    }

    fn traced<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.logger {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    fn resolve_request(&self, imported_from: &str, imported_path: &str) -> ImportResult<Resolved> {
        let req = ImportRequest::new(imported_from, imported_path)?;
        if self.boundary.is_closed() {
            return Err(ImportError::Closed { root: self.root().to_path_buf() });
        }
        debug!(imported_from, imported_path, origin = ?req.origin(), "resolving import");

        match self.resolver.decide(&req) {
            Decision::Reject(err) => {
                warn!(imported_from, imported_path, code = err.code(), "import rejected: {err}");
                return Err(err);
            }
            Decision::Read(candidate) => {
                if let Some(found) = self.try_candidate(&candidate)? {
                    debug!(found_at = %found.found_at.display(), "resolved directly");
                    return Ok(found);
                }
                debug!(resolved = %candidate.absolute_target.display(), "not found directly, searching library paths");
            }
            Decision::Defer(candidate) => {
                debug!(
                    resolved = %candidate.absolute_target.display(),
                    "initial path outside root, searching library paths"
                );
            }
        }

        for candidate in self.search.candidates(self.root(), &req) {
            if !candidate.inside_root {
                debug!(
                    search_dir = %candidate.search_dir.display(),
                    resolved = %candidate.absolute_target.display(),
                    "skipping library candidate outside root"
                );
                continue;
            }
            if let Some(found) = self.try_candidate(&candidate)? {
                debug!(
                    search_dir = %candidate.search_dir.display(),
                    found_at = %found.found_at.display(),
                    "resolved from library path"
                );
                return Ok(found);
            }
        }

        debug!(imported_from, imported_path, "not found in any library path");
        Err(ImportError::FileNotFound {
            path: imported_path.to_string(),
            from: imported_from.to_string(),
        })
    }

    /// `Ok(None)` means "keep searching".
    fn try_candidate(&self, candidate: &ResolutionCandidate) -> ImportResult<Option<Resolved>> {
        let Some(relative) = candidate.relative_to_root.as_deref() else {
            return Ok(None);
        };
        let key = CacheKey::new(&candidate.absolute_target);
        let state = match self.cache.lookup(&key)? {
            Lookup::Hit(state) => {
                trace!(key = %key.as_path().display(), "cache hit");
                state
            }
            Lookup::Miss => {
                let state = match self.boundary.open_relative(relative) {
                    Ok(content) => EntryState::Found { content, found_at: candidate.absolute_target.clone() },
                    Err(BoundaryError::NotFound { .. }) => EntryState::NotFound,
                    // Not a property of the path; must not be remembered.
                    Err(BoundaryError::Closed { root }) => return Err(ImportError::Closed { root }),
                    Err(err) => {
                        warn!(path = %relative.display(), "read failed: {err}");
                        EntryState::Sticky(err.into())
                    }
                };
                self.cache.store(CacheEntry::new(key, state))?
            }
        };
        match state {
            EntryState::Found { content, found_at } => Ok(Some(Resolved { content, found_at })),
            EntryState::NotFound => Ok(None),
            EntryState::Sticky(err) => Err(err),
        }
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &ImportCache {
        &self.cache
    }
}

/// Absolute form of `path`. The process cwd is only looked up, once, when a
/// relative path needs it.
fn absolute_path(path: &Path, cwd: &mut Option<PathBuf>) -> ImportResult<PathBuf> {
    if path.is_absolute() {
        return Ok(clean(path));
    }
    let base = match cwd.take() {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|source| ImportError::CannotResolveAbsolutePath {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?,
    };
    let resolved = absolutize(&base, path);
    *cwd = Some(base);
    Ok(resolved)
}

impl FileImporter for Importer {
    fn resolve(&self, imported_from: &str, imported_path: &str) -> ImportResult<Resolved> {
        Importer::resolve(self, imported_from, imported_path)
    }
}

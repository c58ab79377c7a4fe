use crate::errors::{null_byte_check, ImportError, ImportResult};
use crate::resolver::{absolutize, clean, is_subpath, relative_to, ImportRequest, Origin, ResolutionCandidate};
use std::path::{Path, PathBuf};

/// Library directories, root-relative, in search order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchChain {
    dirs: Vec<PathBuf>,
}

impl SearchChain {
    /// Validates configured library paths against `root` (absolute, cleaned).
    /// Relative entries are read against the root; empty entries are skipped.
    pub fn new<S: AsRef<str>>(root: &Path, library_paths: &[S]) -> ImportResult<Self> {
        let mut dirs = Vec::with_capacity(library_paths.len());
        for jpath in library_paths.iter().map(AsRef::as_ref) {
            if jpath.is_empty() {
                continue;
            }
            null_byte_check("library path", jpath)?;
            let resolved = absolutize(root, Path::new(jpath));
            let rel = match relative_to(root, &resolved) {
                Some(rel) if is_subpath(root, &resolved) => rel,
                _ => {
                    return Err(ImportError::LibraryPathOutsideRoot {
                        path: jpath.to_string(),
                        resolved,
                        root: root.to_path_buf(),
                    })
                }
            };
            dirs.push(rel);
        }
        if dirs.is_empty() {
            dirs.push(PathBuf::from("."));
        }
        Ok(Self { dirs })
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Directories to search for this origin. Entrypoints always see the root
    /// first, unless it is already configured.
    pub fn effective_dirs(&self, origin: Origin) -> Vec<PathBuf> {
        let dot = Path::new(".");
        if origin == Origin::Initial && !self.dirs.iter().any(|d| d == dot) {
            let mut dirs = Vec::with_capacity(self.dirs.len() + 1);
            dirs.push(dot.to_path_buf());
            dirs.extend(self.dirs.iter().cloned());
            return dirs;
        }
        self.dirs.clone()
    }

    /// Fallback candidates in priority order. An absolute import names a
    /// single location and has none.
    pub fn candidates(&self, root: &Path, req: &ImportRequest<'_>) -> Vec<ResolutionCandidate> {
        if req.is_absolute() {
            return Vec::new();
        }
        self.effective_dirs(req.origin())
            .into_iter()
            .map(|dir| {
                let target = clean(&root.join(&dir).join(req.imported_path));
                ResolutionCandidate::classify(root, dir, target)
            })
            .collect()
    }
}

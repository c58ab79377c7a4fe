//! Pure path decisions: no filesystem access happens in this module.
//!
//! An import request is turned into a [`Decision`]: read a candidate inside the
//! root, reject the request outright, or defer to the library search.

use crate::errors::{null_byte_check, ImportError, ImportResult};
use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.`, fold `name/..`, and keep `..` from
/// climbing above a root component. Empty input becomes `.`.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// `sub` is `parent` or lies beneath it. Component-wise, so `/r` does not
/// contain `/root`.
pub fn is_subpath(parent: &Path, sub: &Path) -> bool {
    clean(sub).starts_with(clean(parent))
}

/// Path of `target` relative to `root`, `.` for the root itself.
pub fn relative_to(root: &Path, target: &Path) -> Option<PathBuf> {
    let rel = target.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(rel.to_path_buf())
    }
}

pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean(path)
    } else {
        clean(&base.join(path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Entrypoint load, no originating file.
    Initial,
    /// Import statement inside an already loaded file.
    Nested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest<'a> {
    pub imported_from: &'a str,
    pub imported_path: &'a str,
}

impl<'a> ImportRequest<'a> {
    pub fn new(imported_from: &'a str, imported_path: &'a str) -> ImportResult<Self> {
        null_byte_check("importedFrom", imported_from)?;
        null_byte_check("importedPath", imported_path)?;
        Ok(Self { imported_from, imported_path })
    }

    pub fn origin(&self) -> Origin {
        if self.imported_from.is_empty() {
            Origin::Initial
        } else {
            Origin::Nested
        }
    }

    pub fn is_absolute(&self) -> bool {
        Path::new(self.imported_path).is_absolute()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionCandidate {
    /// Root-relative directory the candidate was derived from.
    pub search_dir: PathBuf,
    pub absolute_target: PathBuf,
    pub inside_root: bool,
    /// What the boundary is asked to open; `None` when outside the root.
    pub relative_to_root: Option<PathBuf>,
}

impl ResolutionCandidate {
    pub fn classify(root: &Path, search_dir: PathBuf, absolute_target: PathBuf) -> Self {
        let inside_root = is_subpath(root, &absolute_target);
        let relative_to_root = if inside_root { relative_to(root, &absolute_target) } else { None };
        Self { search_dir, absolute_target, inside_root, relative_to_root }
    }
}

#[derive(Debug, Clone)]
pub enum Decision {
    /// Try this candidate; a miss continues with the library search.
    Read(ResolutionCandidate),
    /// Terminal security rejection.
    Reject(ImportError),
    /// Skip straight to the library search.
    Defer(ResolutionCandidate),
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    working_dir: PathBuf,
}

impl PathResolver {
    /// `root` must already be absolute and cleaned.
    pub fn new(root: PathBuf, working_dir: PathBuf) -> Self {
        Self { root, working_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Where the request points absent any sandboxing.
    pub fn primary_candidate(&self, req: &ImportRequest<'_>) -> ResolutionCandidate {
        let imported = Path::new(req.imported_path);
        let target = if imported.is_absolute() {
            clean(imported)
        } else {
            match req.origin() {
                Origin::Nested => clean(&self.origin_dir(req.imported_from).join(imported)),
                Origin::Initial => absolutize(&self.working_dir, imported),
            }
        };
        ResolutionCandidate::classify(&self.root, PathBuf::from("."), target)
    }

    /// Directory of the importing file; relative origins are read against the root.
    fn origin_dir(&self, imported_from: &str) -> PathBuf {
        let from = absolutize(&self.root, Path::new(imported_from));
        match from.parent() {
            Some(dir) => dir.to_path_buf(),
            None => from,
        }
    }

    pub fn decide(&self, req: &ImportRequest<'_>) -> Decision {
        let candidate = self.primary_candidate(req);
        if candidate.inside_root {
            return Decision::Read(candidate);
        }
        if req.is_absolute() {
            return Decision::Reject(ImportError::ForbiddenAbsolutePath {
                path: req.imported_path.to_string(),
                resolved: candidate.absolute_target,
                root: self.root.clone(),
            });
        }
        match req.origin() {
            Origin::Nested => Decision::Reject(ImportError::ForbiddenRelativePathTraversal {
                path: req.imported_path.to_string(),
                from: req.imported_from.to_string(),
                resolved: candidate.absolute_target,
                root: self.root.clone(),
            }),
            // The working directory does not line up with the root for this
            // path; the library search gets to interpret it instead.
            Origin::Initial => Decision::Defer(candidate),
        }
    }
}

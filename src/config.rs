use crate::importer::{Importer, ImporterOptions};
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub root: Root,
    #[serde(default)]
    pub library: Library,
    #[serde(default)]
    pub limits: Limits,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Root {
    pub root_dir: PathBuf,
    /// Context for entrypoint paths given relative; process cwd when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Library {
    #[serde(default)]
    pub jpaths: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Limits {
    #[serde(default)]
    pub max_file_kb: Option<u64>,
}

impl Config {
    pub fn for_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: Root { root_dir: root_dir.into(), working_dir: None },
            library: Library::default(),
            limits: Limits::default(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.root.root_dir.as_os_str().is_empty() {
            anyhow::bail!("root_dir must not be empty");
        }
        if !self.root.root_dir.is_dir() {
            anyhow::bail!("root_dir does not exist or is not a directory: {}", self.root.root_dir.display());
        }
        if let Some(dir) = &self.root.working_dir {
            if !dir.is_dir() {
                anyhow::bail!("working_dir does not exist or is not a directory: {}", dir.display());
            }
        }
        if self.limits.max_file_kb == Some(0) {
            anyhow::bail!("max_file_kb must be > 0");
        }
        Ok(())
    }

    pub fn options(&self) -> ImporterOptions {
        let mut options = ImporterOptions::new();
        if let Some(dir) = &self.root.working_dir {
            options = options.working_dir(dir);
        }
        if let Some(kb) = self.limits.max_file_kb {
            options = options.max_file_bytes(kb.saturating_mul(1024));
        }
        options
    }

    /// `options` usually starts from [`Config::options`].
    pub fn build_importer(&self, options: ImporterOptions) -> anyhow::Result<Importer> {
        Importer::new(&self.root.root_dir, self.library.jpaths.as_slice(), options)
            .with_context(|| format!("opening importer rooted at {}", self.root.root_dir.display()))
    }
}

//! Exemplar discovery.
//!
//! The root directory holds one subdirectory per feature category; every
//! `.c` file directly inside a category directory is an exemplar. Files at the
//! root itself (the shared `io.c` header) are not exemplars.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::fixture::{self, FixtureSource};

/// Extension of eligible exemplar sources.
pub const SOURCE_EXTENSION: &str = "c";

/// One example program used as a conformance check for a single feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemplar {
    /// Relative path from the root, `/`-separated (e.g. `tests/loop.c`).
    pub id: String,

    /// Category label (the containing directory name, verbatim).
    pub category: String,

    /// Path to the source file.
    pub source: PathBuf,

    /// Exact expected stdout; `None` means only the exit code is checked.
    #[serde(skip)]
    pub expected_stdout: Option<Vec<u8>>,

    /// Expected exit code.
    pub expected_exit: i32,
}

impl Exemplar {
    /// File stem of the source (`loop` for `tests/loop.c`).
    pub fn stem(&self) -> &str {
        self.source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(self.id.as_str())
    }

    /// Whether stdout content is checked, rather than only the exit code.
    pub fn checks_stdout(&self) -> bool {
        self.expected_stdout.is_some()
    }
}

/// Discovers exemplars under a root directory.
pub struct Registry {
    root: PathBuf,
    categories: Vec<String>,
    sources: Vec<Box<dyn FixtureSource>>,
}

impl Registry {
    /// Create a registry over `root` using the default fixture sources.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            categories: Vec::new(),
            sources: fixture::default_sources(),
        }
    }

    /// Restrict discovery to the named categories (empty = all).
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Replace the fixture sources consulted for each exemplar.
    pub fn with_fixture_sources(mut self, sources: Vec<Box<dyn FixtureSource>>) -> Self {
        self.sources = sources;
        self
    }

    /// The root directory being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily scan the root. Each call rescans from scratch.
    ///
    /// Category directories are visited in sorted order and each one is read
    /// only when the iterator reaches it.
    pub fn iter(&self) -> Result<ExemplarIter<'_>, DiscoveryError> {
        if !self.root.exists() {
            return Err(DiscoveryError::RootMissing(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(DiscoveryError::NotADirectory(self.root.clone()));
        }

        let mut categories = Vec::new();
        for entry in read_dir_sorted(&self.root)? {
            if !entry.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if !self.categories.is_empty() && !self.categories.iter().any(|c| c == name) {
                continue;
            }
            categories.push((name.to_string(), entry));
        }
        categories.reverse();

        Ok(ExemplarIter {
            registry: self,
            categories,
            pending: Vec::new(),
            failed: false,
        })
    }

    /// Scan the root and collect every exemplar.
    ///
    /// Fails if the root is missing or no eligible source file is found.
    pub fn discover(&self) -> Result<Vec<Exemplar>, DiscoveryError> {
        let exemplars = self.iter()?.collect::<Result<Vec<_>, _>>()?;
        if exemplars.is_empty() {
            return Err(DiscoveryError::NoExemplars(self.root.clone()));
        }
        debug!(
            root = %self.root.display(),
            count = exemplars.len(),
            "Discovered exemplars"
        );
        Ok(exemplars)
    }

    fn load(&self, category: &str, source: PathBuf) -> Result<Exemplar, DiscoveryError> {
        let decl = fixture::resolve(&self.sources, &source)?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Exemplar {
            id: format!("{}/{}", category, file_name),
            category: category.to_string(),
            source,
            expected_stdout: decl.expected_stdout,
            expected_exit: decl.expected_exit.unwrap_or(0),
        })
    }
}

/// Lazy, finite iterator over the exemplars of a [`Registry`].
pub struct ExemplarIter<'a> {
    registry: &'a Registry,
    /// Remaining categories, reversed so `pop` yields them in order.
    categories: Vec<(String, PathBuf)>,
    /// Remaining sources of the current category, reversed.
    pending: Vec<(String, PathBuf)>,
    failed: bool,
}

impl Iterator for ExemplarIter<'_> {
    type Item = Result<Exemplar, DiscoveryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some((category, source)) = self.pending.pop() {
                let item = self.registry.load(&category, source);
                self.failed = item.is_err();
                return Some(item);
            }

            let (category, dir) = self.categories.pop()?;
            match read_dir_sorted(&dir) {
                Ok(entries) => {
                    self.pending = entries
                        .into_iter()
                        .filter(|p| p.is_file() && is_source(p))
                        .map(|p| (category.clone(), p))
                        .rev()
                        .collect();
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn is_source(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let io_err = |e| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}

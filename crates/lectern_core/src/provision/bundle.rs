//! Name-to-resource mappings for bundled datasets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A resolved bundled resource.
#[derive(Debug, Clone)]
pub enum BundledAsset {
    File(PathBuf),
    Bytes(&'static [u8]),
}

/// Read-only source of dataset files, fixed at build or startup time.
pub trait AssetBundle: Send + Sync {
    /// Dataset names this bundle can provision, sorted.
    fn names(&self) -> Vec<String>;
    fn resolve(&self, name: &str) -> Option<BundledAsset>;

    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// Bundle backed by a read-only directory and a fixed name-to-file mapping.
#[derive(Debug, Clone, Default)]
pub struct DirectoryBundle {
    root: PathBuf,
    assets: BTreeMap<String, PathBuf>,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            assets: BTreeMap::new(),
        }
    }

    /// Registers `name` as `<root>/<file>`.
    pub fn with_asset(mut self, name: impl Into<String>, file: impl AsRef<Path>) -> Self {
        self.assets
            .insert(name.into(), self.root.join(file.as_ref()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetBundle for DirectoryBundle {
    fn names(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    fn resolve(&self, name: &str) -> Option<BundledAsset> {
        self.assets
            .get(name)
            .map(|path| BundledAsset::File(path.clone()))
    }
}

/// Bundle of datasets compiled into the binary with `include_bytes!`.
#[derive(Debug, Clone, Default)]
pub struct StaticBundle {
    assets: BTreeMap<String, &'static [u8]>,
}

impl StaticBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, name: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.assets.insert(name.into(), bytes);
        self
    }
}

impl AssetBundle for StaticBundle {
    fn names(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    fn resolve(&self, name: &str) -> Option<BundledAsset> {
        self.assets.get(name).map(|bytes| BundledAsset::Bytes(*bytes))
    }
}

//! Resource loading
//!
//! Passthrough files and blueprints are read through [`ResourceLoader`] so the
//! assembler can run against a directory or against in-memory content.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{BundleError, Result};

/// Reads a named resource from a folder
pub trait ResourceLoader: Send + Sync {
    /// Load the raw bytes of `name` inside `folder`
    fn load(&self, folder: &Path, name: &str) -> Result<Vec<u8>>;

    /// Load `name` as UTF-8 text
    fn load_string(&self, folder: &Path, name: &str) -> Result<String> {
        let bytes = self.load(folder, name)?;
        String::from_utf8(bytes)
            .map_err(|_| BundleError::ManifestComposition(format!("{} is not valid UTF-8", name)))
    }
}

/// Reject names that would escape the folder they are resolved in
fn check_relative(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(BundleError::ResourceNotFound(format!(
            "{:?} does not resolve inside the resource folder",
            name
        )));
    }
    Ok(path)
}

/// Loads resources from the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsResourceLoader;

impl FsResourceLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceLoader for FsResourceLoader {
    fn load(&self, folder: &Path, name: &str) -> Result<Vec<u8>> {
        let path = folder.join(check_relative(name)?);
        tracing::debug!("Loading resource {:?}", path);
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                BundleError::ResourceNotFound(format!("{} not found in {:?}", name, folder))
            }
            _ => BundleError::ResourceNotFound(format!("failed to read {:?}: {}", path, e)),
        })
    }
}

/// Serves resources held in memory, keyed by folder and name
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceLoader {
    resources: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `content` as `name` inside `folder`
    pub fn insert(&mut self, folder: impl AsRef<Path>, name: &str, content: impl Into<Vec<u8>>) {
        self.resources.insert(folder.as_ref().join(name), content.into());
    }

    pub fn with(mut self, folder: impl AsRef<Path>, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(folder, name, content);
        self
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn load(&self, folder: &Path, name: &str) -> Result<Vec<u8>> {
        let path = folder.join(check_relative(name)?);
        self.resources
            .get(&path)
            .cloned()
            .ok_or_else(|| BundleError::ResourceNotFound(format!("{} not found in {:?}", name, folder)))
    }
}

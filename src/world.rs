//! World provisioning: per-arena copies of a map's archived world

use crate::error::ProvisionError;
use crate::map::MapTemplate;
use crate::types::create_world_name;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Unpacks a map archive into a directory
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ProvisionError>;
}

/// Zip-backed archives
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ProvisionError> {
        let file = File::open(archive).map_err(|source| ProvisionError::ArchiveMissing {
            path: archive.to_path_buf(),
            source,
        })?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(dest)?;
        Ok(())
    }
}

/// The server's world manager
pub trait WorldHost: Send + Sync {
    /// Load the world stored at `path` under `name`. Returns false if it could not be loaded.
    fn load_world(&self, name: &str, path: &Path) -> bool;

    fn is_loaded(&self, name: &str) -> bool;

    fn unload_world(&self, name: &str);
}

/// In-process world table: a world is loadable once its directory exists
#[derive(Debug, Default)]
pub struct LocalWorlds {
    loaded: RwLock<HashSet<String>>,
}

impl LocalWorlds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<_> = self.loaded.read().iter().cloned().collect();
        names.sort();
        names
    }
}

impl WorldHost for LocalWorlds {
    fn load_world(&self, name: &str, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        self.loaded.write().insert(name.to_string());
        true
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().contains(name)
    }

    fn unload_world(&self, name: &str) {
        self.loaded.write().remove(name);
    }
}

/// A live world instance owned by exactly one arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldHandle {
    pub name: String,
    pub path: PathBuf,
}

pub struct WorldProvisioner {
    worlds_dir: PathBuf,
    host: Arc<dyn WorldHost>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl WorldProvisioner {
    pub fn new(worlds_dir: impl Into<PathBuf>, host: Arc<dyn WorldHost>) -> Self {
        Self {
            worlds_dir: worlds_dir.into(),
            host,
            extractor: Arc::new(ZipExtractor),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn host(&self) -> &Arc<dyn WorldHost> {
        &self.host
    }

    /// Handle a session's world would get, whether or not it exists
    pub fn handle_for(&self, map: &str, session_id: &str) -> WorldHandle {
        let name = create_world_name(map, session_id);
        WorldHandle {
            path: self.worlds_dir.join(&name),
            name,
        }
    }

    /// Extract `template`'s archive into a fresh world named after the session and load it.
    ///
    /// A failed attempt leaves nothing behind on disk.
    pub fn provision(
        &self,
        template: &MapTemplate,
        session_id: &str,
    ) -> Result<WorldHandle, ProvisionError> {
        let handle = self.handle_for(template.name(), session_id);
        std::fs::create_dir_all(&handle.path)?;

        if let Err(e) = self.materialize(template, &handle) {
            self.release(&handle);
            return Err(e);
        }

        info!("Provisioned world {} from {}", handle.name, template.archive().display());
        Ok(handle)
    }

    fn materialize(&self, template: &MapTemplate, handle: &WorldHandle) -> Result<(), ProvisionError> {
        self.extractor.extract(template.archive(), &handle.path)?;

        if !self.host.load_world(&handle.name, &handle.path) || !self.host.is_loaded(&handle.name) {
            return Err(ProvisionError::WorldNotResolved(handle.name.clone()));
        }
        Ok(())
    }

    /// Unload and delete a world. Unknown or already released handles are a no-op.
    pub fn release(&self, handle: &WorldHandle) {
        if self.host.is_loaded(&handle.name) {
            self.host.unload_world(&handle.name);
        }

        if handle.path.exists() {
            match std::fs::remove_dir_all(&handle.path) {
                Ok(()) => debug!("Deleted world {}", handle.name),
                Err(e) => warn!("Failed to delete world {}: {}", handle.name, e),
            }
        }
    }
}

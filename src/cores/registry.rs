//! Core discovery: load `core.json` candidates from root directories and keep
//! one locked instance per engine version.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::Deserialize;

use super::version::{EngineVersion, StyleId};
use super::DiscoveryParams;
use crate::error::{Error, Result};
use crate::{Capabilities, CoreEngine, CORE_API_VERSION};

/// File marking a directory as a core candidate.
pub const CORE_DESCRIPTOR: &str = "core.json";

/// The part of `core.json` the registry itself reads. Cores may read more
/// fields from the same file when they load.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreDescriptor {
    pub kind: String,
    pub version: EngineVersion,
}

impl CoreDescriptor {
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(CORE_DESCRIPTOR);
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| Error::InvalidManifest {
            path,
            reason: e.to_string(),
        })
    }
}

/// Creates the engine instance for a descriptor's `kind`.
pub trait CoreLoader {
    fn create(
        &self,
        descriptor: &CoreDescriptor,
        params: &DiscoveryParams,
    ) -> Result<Box<dyn CoreEngine>>;
}

/// One loaded core, exclusively owned behind its own lock.
pub struct EngineSlot {
    version: EngineVersion,
    path: Option<PathBuf>,
    capabilities: Capabilities,
    engine: Mutex<Box<dyn CoreEngine>>,
}

impl EngineSlot {
    pub fn version(&self) -> &EngineVersion {
        &self.version
    }

    /// Directory the core was loaded from; `None` for injected cores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Run one native call with the core locked.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut dyn CoreEngine) -> Result<R>) -> Result<R> {
        let mut engine = self.engine.lock();
        f(&mut **engine).map_err(|e| self.attribute(e))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn CoreEngine>> {
        self.engine.lock()
    }

    fn attribute(&self, error: Error) -> Error {
        match error {
            Error::EngineUnavailable { reason, .. } => Error::unavailable(&self.version, reason),
            other => other,
        }
    }
}

impl Drop for EngineSlot {
    fn drop(&mut self) {
        self.engine.get_mut().unload();
    }
}

impl std::fmt::Debug for EngineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSlot")
            .field("version", &self.version)
            .field("path", &self.path)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Every core loaded at startup, keyed by version. Immutable once built.
#[derive(Debug, Default)]
pub struct CoreRegistry {
    slots: BTreeMap<EngineVersion, Arc<EngineSlot>>,
}

impl CoreRegistry {
    pub fn builder() -> CoreRegistryBuilder {
        CoreRegistryBuilder::default()
    }

    /// Load every core found under `roots`.
    ///
    /// A root is a candidate itself when it holds a `core.json`; otherwise
    /// each of its sub-directories holding one is. A failing candidate is
    /// reported in the returned list and does not stop the others.
    pub fn discover(
        roots: &[PathBuf],
        params: &DiscoveryParams,
        loader: &dyn CoreLoader,
    ) -> (Self, Vec<Error>) {
        let mut builder = Self::builder();
        for root in roots {
            let candidates = match candidate_dirs(root) {
                Ok(candidates) => candidates,
                Err(e) => {
                    log::warn!("Skipping core root {}: {e}", root.display());
                    builder.failures.push(load_error(root, e.to_string()));
                    continue;
                }
            };
            for dir in candidates {
                builder.load_dir(&dir, params, loader);
            }
        }
        builder.build()
    }

    pub fn versions(&self) -> impl Iterator<Item = &EngineVersion> {
        self.slots.keys()
    }

    /// Newest loaded version, used when a caller does not pick one.
    pub fn latest_version(&self) -> Option<&EngineVersion> {
        self.slots.keys().next_back()
    }

    pub fn slot(&self, version: &EngineVersion) -> Option<&Arc<EngineSlot>> {
        self.slots.get(version)
    }

    pub fn slots(&self) -> impl Iterator<Item = &Arc<EngineSlot>> {
        self.slots.values()
    }

    pub fn capabilities(&self, version: &EngineVersion) -> Option<&Capabilities> {
        self.slot(version).map(|s| s.capabilities())
    }

    /// `(internal index, style id, display name)` in the order the core
    /// reports them.
    pub fn styles(&self, version: &EngineVersion) -> Option<Vec<(u32, StyleId, String)>> {
        self.capabilities(version).map(|caps| {
            caps.styles
                .iter()
                .map(|s| (s.index, s.id, s.name.clone()))
                .collect()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Collects validated cores; used by discovery and for injecting cores.
#[derive(Debug, Default)]
pub struct CoreRegistryBuilder {
    slots: BTreeMap<EngineVersion, Arc<EngineSlot>>,
    failures: Vec<Error>,
}

impl CoreRegistryBuilder {
    /// Register an already loaded core under `version`.
    pub fn add(
        &mut self,
        version: EngineVersion,
        engine: Box<dyn CoreEngine>,
    ) -> Result<&mut Self> {
        let path = PathBuf::from(version.as_str());
        self.insert(version, engine, None)
            .map_err(|reason| load_error(&path, reason))?;
        Ok(self)
    }

    /// Errors collected so far by [`CoreRegistry::discover`].
    pub fn failures(&self) -> &[Error] {
        &self.failures
    }

    pub fn build(self) -> (CoreRegistry, Vec<Error>) {
        (CoreRegistry { slots: self.slots }, self.failures)
    }

    fn load_dir(&mut self, dir: &Path, params: &DiscoveryParams, loader: &dyn CoreLoader) {
        let result = CoreDescriptor::read(dir)
            .and_then(|descriptor| {
                let mut engine = loader.create(&descriptor, params)?;
                engine.load(dir)?;
                Ok((descriptor, engine))
            })
            .map_err(|e| e.to_string())
            .and_then(|(descriptor, engine)| {
                self.insert(descriptor.version.clone(), engine, Some(dir.to_path_buf()))
                    .map(|_| descriptor)
            });

        match result {
            Ok(descriptor) => log::info!(
                "Loaded {} core {} from {}",
                descriptor.kind,
                descriptor.version,
                dir.display()
            ),
            Err(reason) => {
                log::warn!("Skipping core at {}: {reason}", dir.display());
                self.failures.push(load_error(dir, reason));
            }
        }
    }

    fn insert(
        &mut self,
        version: EngineVersion,
        engine: Box<dyn CoreEngine>,
        path: Option<PathBuf>,
    ) -> std::result::Result<(), String> {
        if self.slots.contains_key(&version) {
            return Err(format!("core version {version} is already loaded"));
        }
        let capabilities = engine.capabilities().map_err(|e| e.to_string())?;
        validate_capabilities(&capabilities)?;
        let slot = EngineSlot {
            version: version.clone(),
            path,
            capabilities,
            engine: Mutex::new(engine),
        };
        self.slots.insert(version, Arc::new(slot));
        Ok(())
    }
}

fn validate_capabilities(caps: &Capabilities) -> std::result::Result<(), String> {
    if caps.api_version != CORE_API_VERSION {
        return Err(format!(
            "unsupported core API version {} (expected {CORE_API_VERSION})",
            caps.api_version
        ));
    }
    if caps.sample_rate == 0 {
        return Err("sample rate must be positive".to_string());
    }
    if caps.styles.is_empty() {
        return Err("core advertises no styles".to_string());
    }
    let mut ids = HashSet::new();
    let mut indices = HashSet::new();
    for style in &caps.styles {
        if !ids.insert(style.id) {
            return Err(format!("style {} advertised twice", style.id));
        }
        if !indices.insert(style.index) {
            return Err(format!("internal style index {} used twice", style.index));
        }
    }
    Ok(())
}

fn candidate_dirs(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    if root.join(CORE_DESCRIPTOR).is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && path.join(CORE_DESCRIPTOR).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn load_error(path: &Path, reason: String) -> Error {
    Error::EngineLoad {
        path: path.to_path_buf(),
        reason,
    }
}

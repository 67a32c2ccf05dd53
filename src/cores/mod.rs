//! Core registry, style routing and the [`CoreManager`] that ties them
//! together.
//!
//! # Core Directory Layout
//!
//! ```text
//! cores/
//! ├── 0.14.0/
//! │   ├── core.json                 # {"kind": "onnx", "version": "0.14.0", ...}
//! │   ├── predict_duration.onnx
//! │   ├── predict_intonation.onnx
//! │   └── decode.onnx
//! └── mock/
//!     └── core.json                 # {"kind": "mock", "version": "0.0.1", "styles": [...]}
//! ```
//!
//! Every directory is loaded independently; a broken one is reported and
//! skipped. Style ids must be unique across all loaded versions.

pub mod registry;
pub mod router;
pub mod version;

use derive_builder::Builder;
use parking_lot::MutexGuard;

pub use registry::{CoreDescriptor, CoreLoader, CoreRegistry, CoreRegistryBuilder, EngineSlot};
pub use router::{Speaker, StyleBinding, StyleRouter};
pub use version::{EngineVersion, StyleId, StyleKind};

use crate::engines::mock::MockCore;
use crate::error::{Error, Result};
use crate::CoreEngine;
use std::path::PathBuf;

/// Version under which the fallback mock core is registered.
pub const MOCK_VERSION: &str = "mock";

/// Parameters for core discovery.
#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct DiscoveryParams {
    /// Register a built-in [`MockCore`] when no core could be loaded.
    pub enable_mock: bool,
    /// Number of CPU threads for native inference.
    /// `None` leaves the choice to the core.
    pub num_threads: Option<usize>,
}

/// Maps descriptor kinds to the cores compiled into this build.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLoader;

impl CoreLoader for BuiltinLoader {
    fn create(
        &self,
        descriptor: &CoreDescriptor,
        params: &DiscoveryParams,
    ) -> Result<Box<dyn CoreEngine>> {
        match descriptor.kind.as_str() {
            "mock" => Ok(Box::new(MockCore::new())),
            #[cfg(feature = "onnx")]
            "onnx" => Ok(Box::new(crate::engines::onnx::OnnxCore::new(
                params.num_threads,
            ))),
            other => {
                let _ = params;
                Err(Error::unavailable(
                    &descriptor.version,
                    format!("core kind {other:?} is not built into this binary"),
                ))
            }
        }
    }
}

/// Owned startup state: the loaded cores plus the router built from them.
///
/// Construct once and share it (`Arc<CoreManager>`) with every pipeline and
/// the voice-model manager.
#[derive(Debug)]
pub struct CoreManager {
    registry: CoreRegistry,
    router: StyleRouter,
}

impl CoreManager {
    /// Build the router for `registry`; fails on conflicting style ids.
    pub fn new(registry: CoreRegistry) -> Result<Self> {
        let router = StyleRouter::build(&registry)?;
        Ok(Self { registry, router })
    }

    /// Discover cores under `roots` and build the router.
    ///
    /// Returns the manager with the per-candidate load failures. Only a style
    /// id conflict is fatal.
    pub fn discover(
        roots: &[PathBuf],
        params: &DiscoveryParams,
        loader: &dyn CoreLoader,
    ) -> Result<(Self, Vec<Error>)> {
        let (mut registry, failures) = CoreRegistry::discover(roots, params, loader);
        if registry.is_empty() && params.enable_mock {
            log::info!("No core loaded, falling back to the mock core");
            let mut builder = CoreRegistry::builder();
            builder.add(MOCK_VERSION.into(), Box::new(MockCore::new()))?;
            registry = builder.build().0;
        }
        Ok((Self::new(registry)?, failures))
    }

    pub fn registry(&self) -> &CoreRegistry {
        &self.registry
    }

    pub fn router(&self) -> &StyleRouter {
        &self.router
    }

    pub fn resolve(&self, style_id: StyleId) -> Result<StyleBinding> {
        self.router.resolve(style_id)
    }

    /// Native sample rate of the core serving `style_id`.
    pub fn sample_rate(&self, style_id: StyleId) -> Result<u32> {
        let binding = self.resolve(style_id)?;
        Ok(self.slot(&binding)?.capabilities().sample_rate)
    }

    pub fn speakers(&self) -> Vec<Speaker> {
        self.router.speakers()
    }

    /// Resolve `style_id` and check that it is a `kind` style.
    pub fn resolve_kind(&self, style_id: StyleId, kind: StyleKind) -> Result<StyleBinding> {
        let binding = self.resolve(style_id)?;
        if binding.kind != kind {
            return Err(Error::StyleKindMismatch {
                style_id,
                expected: kind,
                actual: binding.kind,
            });
        }
        Ok(binding)
    }

    /// Resolve `style_id`, check its kind and run `f` with the serving core
    /// locked. The lock is held for this one call only.
    pub fn with_style<R>(
        &self,
        style_id: StyleId,
        kind: StyleKind,
        f: impl FnOnce(&mut dyn CoreEngine, u32) -> Result<R>,
    ) -> Result<R> {
        let binding = self.resolve_kind(style_id, kind)?;
        self.call_bound(&binding, f)
    }

    /// Run `f` on the core of an already resolved binding. The binding may
    /// have been evicted while the core was busy; that is only known once the
    /// core lock is held.
    fn call_bound<R>(
        &self,
        binding: &StyleBinding,
        f: impl FnOnce(&mut dyn CoreEngine, u32) -> Result<R>,
    ) -> Result<R> {
        let slot = self.slot(binding)?;
        slot.with_engine(|engine| {
            if !self.router.is_live(binding.style_id) {
                return Err(Error::UnknownStyle(binding.style_id));
            }
            f(engine, binding.index)
        })
    }

    /// Run `f` while no style of `model_id` can be resolved and no native call
    /// is in flight on a core serving one of them. Styles of other models
    /// resolve as usual.
    pub fn barrier<R>(&self, model_id: &str, f: impl FnOnce() -> R) -> R {
        let drain = self.router.drain(model_id);
        let _idle = self.lock_slots(drain.versions());
        f()
    }

    /// Invalidate every binding that depends on `model_id`, waiting for
    /// in-flight calls on the affected cores first.
    pub fn evict_model(&self, model_id: &str) -> Vec<StyleId> {
        match self.evict_model_with(model_id, || Ok(())) {
            Ok(evicted) => evicted,
            Err(_) => Vec::new(),
        }
    }

    /// Like [`evict_model`](Self::evict_model), but runs `f` once the cores
    /// are idle and invalidates only if it succeeds.
    pub fn evict_model_with(
        &self,
        model_id: &str,
        f: impl FnOnce() -> Result<()>,
    ) -> Result<Vec<StyleId>> {
        let drain = self.router.drain(model_id);
        let _idle = self.lock_slots(drain.versions());
        f()?;
        let evicted = drain.invalidate();
        if !evicted.is_empty() {
            log::info!("Evicted styles {evicted:?} of voice model {model_id}");
        }
        Ok(evicted)
    }

    fn lock_slots(&self, versions: &[EngineVersion]) -> Vec<MutexGuard<'_, Box<dyn CoreEngine>>> {
        versions
            .iter()
            .filter_map(|v| self.registry.slot(v))
            .map(|slot| slot.lock())
            .collect()
    }

    fn slot(&self, binding: &StyleBinding) -> Result<&EngineSlot> {
        self.registry
            .slot(&binding.version)
            .map(|s| s.as_ref())
            .ok_or_else(|| Error::unavailable(&binding.version, "core is not loaded"))
    }
}

//! Installed voice models and their packages.
//!
//! # Model Store Layout
//!
//! ```text
//! models/
//! ├── model-a/
//! │   ├── manifest.json      # {"manifest_version": "1.0", "id": "model-a", ...}
//! │   └── ...                # payload, read by the core serving the model
//! └── model-b/
//!     └── manifest.json
//! ```
//!
//! A package is a zip archive with `manifest.json` at its root. Styles of an
//! installed model are bound at core discovery time; installing a model does
//! not create bindings, but replacing or removing one never races with a
//! native call that uses it.

pub mod manifest;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

pub use manifest::{ModelStyle, VoiceModel, MANIFEST_FILE, SUPPORTED_MANIFEST_VERSION};

use crate::cores::{CoreManager, StyleId};
use crate::error::{Error, Result};

const STAGING_SUFFIX: &str = ".staging";

/// Installs, lists and removes voice models under one directory.
#[derive(Debug)]
pub struct VoiceModelManager {
    dir: PathBuf,
    cores: Arc<CoreManager>,
    models: Mutex<BTreeMap<String, VoiceModel>>,
}

impl VoiceModelManager {
    /// Open the model store at `dir`, creating it if needed.
    ///
    /// Directories without a valid manifest are logged and skipped.
    pub fn open(dir: &Path, cores: Arc<CoreManager>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut models = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.'));
            if !path.is_dir() || hidden {
                continue;
            }
            match VoiceModel::load(&path) {
                Ok(model) if path.ends_with(&model.id) => {
                    models.insert(model.id.clone(), model);
                }
                Ok(model) => log::warn!(
                    "Skipping voice model {} stored under {}",
                    model.id,
                    path.display()
                ),
                Err(e) => log::warn!("Skipping voice model at {}: {e}", path.display()),
            }
        }
        log::info!("Found {} voice models in {}", models.len(), dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            cores,
            models: Mutex::new(models),
        })
    }

    /// Installed models ordered by name, then id.
    pub fn list(&self) -> Vec<VoiceModel> {
        let mut models: Vec<VoiceModel> = self.models.lock().values().cloned().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        models
    }

    pub fn get(&self, model_id: &str) -> Option<VoiceModel> {
        self.models.lock().get(model_id).cloned()
    }

    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.dir.join(model_id)
    }

    /// Live styles currently served from `model_id`.
    pub fn styles_in_use(&self, model_id: &str) -> Vec<StyleId> {
        self.cores
            .router()
            .bindings_for_model(model_id)
            .into_iter()
            .map(|b| b.style_id)
            .collect()
    }

    /// Install the package at `package`, replacing any model with the same id.
    pub fn install(&self, package: &Path) -> Result<VoiceModel> {
        let mut archive = zip::ZipArchive::new(File::open(package)?)?;

        let model = {
            let mut manifest = archive.by_name(MANIFEST_FILE).map_err(|e| {
                Error::InvalidManifest {
                    path: package.to_path_buf(),
                    reason: format!("cannot read {MANIFEST_FILE}: {e}"),
                }
            })?;
            let mut json = Vec::new();
            manifest.read_to_end(&mut json)?;
            VoiceModel::from_manifest(&json, &package.join(MANIFEST_FILE))?
        };

        let staging = self.dir.join(format!(".{}{STAGING_SUFFIX}", model.id));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        if let Err(e) = extract(&mut archive, package, &staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        // Holding the models lock serializes installs and uninstalls.
        let mut models = self.models.lock();
        let target = self.model_dir(&model.id);
        let replace = || -> Result<()> {
            if target.exists() {
                std::fs::remove_dir_all(&target)?;
            }
            std::fs::rename(&staging, &target)?;
            Ok(())
        };
        if self.styles_in_use(&model.id).is_empty() {
            replace()?;
        } else {
            log::info!("Replacing voice model {} while its styles are live", model.id);
            self.cores.barrier(&model.id, replace)?;
        }
        models.insert(model.id.clone(), model.clone());
        log::info!("Installed voice model {} ({})", model.id, model.version);
        Ok(model)
    }

    /// Remove an installed model.
    ///
    /// Without `force` a model that still serves live styles is refused. With
    /// `force` the files are removed once in-flight calls on those styles
    /// have finished, and the styles are evicted; later requests for them
    /// fail with [`Error::UnknownStyle`]. If removal fails nothing is evicted
    /// and the model stays listed.
    pub fn uninstall(&self, model_id: &str, force: bool) -> Result<()> {
        let mut models = self.models.lock();
        if !models.contains_key(model_id) {
            return Err(Error::UnknownModel(model_id.to_string()));
        }

        let dir = self.model_dir(model_id);
        let remove = || -> Result<()> {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            Ok(())
        };

        let styles = self.styles_in_use(model_id);
        if styles.is_empty() {
            remove()?;
        } else if force {
            // Styles are invalidated only once the files are gone.
            self.cores.evict_model_with(model_id, remove)?;
        } else {
            return Err(Error::ModelInUse {
                model_id: model_id.to_string(),
                styles,
            });
        }
        models.remove(model_id);
        log::info!("Uninstalled voice model {model_id}");
        Ok(())
    }
}

/// Extract every entry of `archive` below `dest`, refusing entries whose
/// path would leave it.
fn extract(archive: &mut zip::ZipArchive<File>, package: &Path, dest: &Path) -> Result<()> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = entry.enclosed_name().ok_or_else(|| Error::InvalidManifest {
            path: package.to_path_buf(),
            reason: format!("entry {:?} escapes the package root", entry.name()),
        })?;
        let out = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        std::io::copy(&mut entry, &mut file)?;
    }
    Ok(())
}

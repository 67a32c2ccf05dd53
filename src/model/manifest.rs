use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cores::StyleId;
use crate::error::{Error, Result};

/// Manifest file at the root of every voice-model package.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Newest manifest layout this build understands, as `major.minor`.
pub const SUPPORTED_MANIFEST_VERSION: &str = "1.0";

/// A style a voice model provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStyle {
    pub id: StyleId,
    pub name: String,
}

/// Metadata of an installed voice model, read from its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceModel {
    pub manifest_version: String,
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub styles: Vec<ModelStyle>,
}

impl VoiceModel {
    /// Parse and validate manifest JSON; `source` names it in errors.
    pub fn from_manifest(json: &[u8], source: &Path) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidManifest {
            path: source.to_path_buf(),
            reason,
        };

        let model: VoiceModel = serde_json::from_slice(json).map_err(|e| invalid(e.to_string()))?;
        if !is_safe_id(&model.id) {
            return Err(invalid(format!("invalid model id {:?}", model.id)));
        }

        let found = parse_version(&model.manifest_version).ok_or_else(|| {
            invalid(format!(
                "malformed manifest version {:?}",
                model.manifest_version
            ))
        })?;
        let supported = parse_version(SUPPORTED_MANIFEST_VERSION).unwrap_or((1, 0));
        if found > supported {
            return Err(Error::UnsupportedManifestVersion {
                model_id: model.id,
                found: model.manifest_version,
                supported: SUPPORTED_MANIFEST_VERSION.to_string(),
            });
        }
        Ok(model)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let json = std::fs::read(&path)?;
        Self::from_manifest(&json, &path)
    }
}

/// Ids become directory names, so they must be a single plain path component.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// `major.minor[.patch]` to `(major, minor)`.
fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

//! Named sets of query scalars.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cores::StyleId;
use crate::error::{Error, Result};
use crate::prosody::query::DEFAULT_PHONEME_SILENCE;
use crate::prosody::SynthesisQuery;

fn one() -> f32 {
    1.0
}

fn silence() -> f32 {
    DEFAULT_PHONEME_SILENCE
}

/// Global scalars to start a query from, stored by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: u32,
    pub name: String,
    /// Style the preset was made for; informational only.
    #[serde(default, rename = "style_id")]
    pub style_id: Option<StyleId>,
    #[serde(default = "one")]
    pub speed_scale: f32,
    #[serde(default)]
    pub pitch_scale: f32,
    #[serde(default = "one")]
    pub intonation_scale: f32,
    #[serde(default = "one")]
    pub volume_scale: f32,
    #[serde(default = "silence")]
    pub pre_phoneme_length: f32,
    #[serde(default = "silence")]
    pub post_phoneme_length: f32,
    #[serde(default)]
    pub pause_length: Option<f32>,
    #[serde(default = "one")]
    pub pause_length_scale: f32,
}

impl Preset {
    /// Copy of `query` with this preset's scalars; the plan itself is kept.
    pub fn apply_to(&self, query: &SynthesisQuery) -> SynthesisQuery {
        SynthesisQuery {
            speed_scale: self.speed_scale,
            pitch_scale: self.pitch_scale,
            intonation_scale: self.intonation_scale,
            volume_scale: self.volume_scale,
            pre_phoneme_length: self.pre_phoneme_length,
            post_phoneme_length: self.post_phoneme_length,
            pause_length: self.pause_length,
            pause_length_scale: self.pause_length_scale,
            ..query.clone()
        }
    }
}

/// Read-only snapshot of the stored presets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetList {
    presets: Vec<Preset>,
}

impl PresetList {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self { presets }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| Error::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn get(&self, id: u32) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }
}

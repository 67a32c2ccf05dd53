//! Native core backed by three ONNX models.
//!
//! # Core Directory Layout
//!
//! ```text
//! cores/0.14.0/
//! ├── core.json                  # kind, version, sample_rate, styles
//! ├── predict_duration.onnx      # phoneme ids -> phoneme lengths (s)
//! ├── predict_intonation.onnx    # mora features -> log-F0 per mora
//! └── decode.onnx                # frame f0 + one-hot phonemes -> samples
//! ```
//!
//! Singing is not supported by this core; sing styles must come from a core
//! that implements the frame-level methods.
//!
//! Requires the `onnx` feature.

pub mod model;

use std::path::Path;

use serde::Deserialize;

use crate::cores::registry::CORE_DESCRIPTOR;
use crate::cores::EngineVersion;
use crate::error::{Error, Result};
use crate::prosody::frames::decoder_features;
use crate::{
    AccentPhrase, Capabilities, CoreEngine, StyleInfo, SynthesisOptions, SynthesisQuery,
    CORE_API_VERSION,
};

pub use model::OnnxModel;

fn default_api_version() -> u32 {
    CORE_API_VERSION
}

#[derive(Debug, Deserialize)]
struct OnnxDescriptor {
    version: EngineVersion,
    #[serde(default = "default_api_version")]
    api_version: u32,
    sample_rate: u32,
    styles: Vec<StyleInfo>,
}

/// A core whose three stages run through ONNX Runtime.
pub struct OnnxCore {
    num_threads: Option<usize>,
    descriptor: Option<OnnxDescriptor>,
    model: Option<OnnxModel>,
}

impl OnnxCore {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self {
            num_threads,
            descriptor: None,
            model: None,
        }
    }

    fn loaded(&mut self) -> Result<(&OnnxDescriptor, &mut OnnxModel)> {
        match (&self.descriptor, &mut self.model) {
            (Some(descriptor), Some(model)) => Ok((descriptor, model)),
            _ => Err(Error::unavailable(
                &EngineVersion::default(),
                "core is not loaded",
            )),
        }
    }
}

impl CoreEngine for OnnxCore {
    fn load(&mut self, path: &Path) -> Result<()> {
        let descriptor_path = path.join(CORE_DESCRIPTOR);
        let content = std::fs::read_to_string(&descriptor_path)?;
        let descriptor: OnnxDescriptor =
            serde_json::from_str(&content).map_err(|e| Error::InvalidManifest {
                path: descriptor_path,
                reason: e.to_string(),
            })?;

        let model = OnnxModel::load(path, descriptor.version.clone(), self.num_threads)?;
        log::debug!(
            "ONNX core {} ready with {} styles at {} Hz",
            descriptor.version,
            descriptor.styles.len(),
            descriptor.sample_rate
        );
        self.descriptor = Some(descriptor);
        self.model = Some(model);
        Ok(())
    }

    fn unload(&mut self) {
        if self.model.take().is_some() {
            log::debug!("Unloaded ONNX core");
        }
        self.descriptor = None;
    }

    fn capabilities(&self) -> Result<Capabilities> {
        match (&self.descriptor, &self.model) {
            (Some(descriptor), Some(_)) => Ok(Capabilities {
                api_version: descriptor.api_version,
                sample_rate: descriptor.sample_rate,
                styles: descriptor.styles.clone(),
            }),
            _ => Err(Error::unavailable(
                &EngineVersion::default(),
                "core is not loaded",
            )),
        }
    }

    fn predict(&mut self, phrases: &[AccentPhrase], style: u32) -> Result<Vec<AccentPhrase>> {
        let (_, model) = self.loaded()?;
        if phrases.is_empty() {
            return Ok(Vec::new());
        }
        model.predict(phrases, style)
    }

    fn synthesize(
        &mut self,
        query: &SynthesisQuery,
        style: u32,
        options: &SynthesisOptions,
    ) -> Result<Vec<f32>> {
        let (descriptor, model) = self.loaded()?;
        let features = decoder_features(query, descriptor.sample_rate, options);
        log::debug!(
            "Decoding {} frames for style index {style}",
            features.frame_count()
        );
        model.decode(&features, style)
    }
}

//! # vox-core
//!
//! Orchestration core of a Japanese text/score-to-speech engine.
//!
//! ## Features
//!
//! - **Multi-version cores**: discover several native synthesis cores side by
//!   side and route every style id to the core that serves it
//! - **Talk pipeline**: text → accent phrases → predicted prosody → query → waveform
//! - **Song pipeline**: score → frame phonemes → f0/volume → waveform
//! - **Query overrides**: pure transformations over a prosody plan
//! - **Voice models**: install and uninstall model packages safely while
//!   synthesis is running
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use vox_core::cores::{BuiltinLoader, CoreManager, DiscoveryParams};
//! use vox_core::tts::{TextRequest, TtsEngine};
//! use vox_core::StyleId;
//!
//! let params = DiscoveryParams {
//!     enable_mock: true,
//!     ..Default::default()
//! };
//! let (cores, failures) = CoreManager::discover(&[PathBuf::from("cores")], &params, &BuiltinLoader)?;
//! for failure in &failures {
//!     eprintln!("skipped core: {failure}");
//! }
//!
//! let tts = TtsEngine::new(Arc::new(cores));
//! let wave = tts.speak("テストです", StyleId(0), &TextRequest::default())?;
//! wave.write_wav("output.wav".as_ref())?;
//! # Ok::<(), vox_core::Error>(())
//! ```

pub mod audio;
pub mod cancel;
pub mod cores;
pub mod engines;
pub mod error;
pub mod model;
pub mod mutation;
pub mod preset;
pub mod prosody;
pub mod song;
pub mod tts;

use std::io::Cursor;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use crate::cores::{EngineVersion, StyleId, StyleKind};
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use prosody::{AccentPhrase, Mora, SynthesisOptions, SynthesisQuery};
pub use song::{FrameAudioQuery, NotePhonemes, Score, SingFrames};

/// Core API generation this build can drive.
pub const CORE_API_VERSION: u32 = 1;

/// Audio produced by one synthesis call.
///
/// Samples are f32 in `[-1, 1]`, interleaved when `channels == 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Waveform {
    fn spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let mut writer = hound::WavWriter::create(path, self.spec())?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Encode the audio as an in-memory 32-bit float WAV file.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), self.spec())?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(buffer)
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        frames as f64 / self.sample_rate as f64
    }
}

/// One style advertised by a core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleInfo {
    /// Core-internal style index.
    pub index: u32,
    pub id: StyleId,
    pub name: String,
    #[serde(default)]
    pub speaker: String,
    /// Voice model providing this style, if it comes from an installed model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub kind: StyleKind,
}

/// What a loaded core reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub api_version: u32,
    pub sample_rate: u32,
    pub styles: Vec<StyleInfo>,
}

/// Common interface of native synthesis cores.
///
/// Every core generation implements this one trait; the registry keeps one
/// instance per [`EngineVersion`] and never calls into the same instance from
/// two threads at once, so implementations need not be reentrant.
/// `style` is always the core-internal index from [`StyleInfo::index`].
pub trait CoreEngine: Send {
    /// Load the core from its directory.
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Release native resources. Later calls fail with
    /// [`Error::EngineUnavailable`].
    fn unload(&mut self);

    fn capabilities(&self) -> Result<Capabilities>;

    /// Fill consonant/vowel lengths and pitch of every mora.
    fn predict(&mut self, phrases: &[AccentPhrase], style: u32) -> Result<Vec<AccentPhrase>>;

    /// Decode a query into raw mono samples at the core's sample rate.
    fn synthesize(
        &mut self,
        query: &SynthesisQuery,
        style: u32,
        options: &SynthesisOptions,
    ) -> Result<Vec<f32>>;

    /// Consonant length in frames for every note.
    fn predict_sing_consonant_lengths(
        &mut self,
        _notes: &[NotePhonemes],
        _style: u32,
    ) -> Result<Vec<u32>> {
        Err(Error::unavailable(&EngineVersion::default(), "singing is not supported"))
    }

    /// F0 (Hz) and volume per frame.
    fn predict_sing_f0_volume(
        &mut self,
        _frames: &SingFrames,
        _style: u32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        Err(Error::unavailable(&EngineVersion::default(), "singing is not supported"))
    }

    /// Decode a frame query into raw mono samples at the core's sample rate.
    fn synthesize_frames(&mut self, _query: &FrameAudioQuery, _style: u32) -> Result<Vec<f32>> {
        Err(Error::unavailable(&EngineVersion::default(), "singing is not supported"))
    }
}

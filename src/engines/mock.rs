//! Pure-Rust stand-in core.
//!
//! Produces deterministic prosody from phoneme ids and a sine "voice" from the
//! rendered f0 track. Useful when no native core is installed and for tests:
//! output depends only on the inputs and the style index.
//!
//! A mock core can be loaded from a directory like any other core; its
//! `core.json` may override the advertised styles, sample rate and API
//! version:
//!
//! ```json
//! {
//!   "kind": "mock",
//!   "version": "0.0.1",
//!   "sample_rate": 24000,
//!   "styles": [{"index": 0, "id": 1, "name": "ノーマル", "speaker": "Mock"}]
//! }
//! ```

use std::f64::consts::TAU;
use std::path::Path;

use serde::Deserialize;

use crate::cores::registry::CORE_DESCRIPTOR;
use crate::cores::{EngineVersion, StyleId, StyleKind};
use crate::error::{Error, Result};
use crate::prosody::frames::{decoder_features, FRAME_HOP};
use crate::prosody::phoneme::phoneme_id;
use crate::song::score::key_to_hz;
use crate::{
    AccentPhrase, Capabilities, CoreEngine, FrameAudioQuery, NotePhonemes, SingFrames,
    StyleInfo, SynthesisOptions, SynthesisQuery, CORE_API_VERSION,
};

pub const MOCK_SAMPLE_RATE: u32 = 24000;

/// Talk style of the built-in style list.
pub const MOCK_STYLE_ID: u32 = 0;

/// Sing style of the built-in style list.
pub const MOCK_SING_STYLE_ID: u32 = 6000;

const AMPLITUDE: f64 = 0.3;
const BASE_PITCH: f32 = 5.5;
const ACCENT_RISE: f32 = 0.3;
const DECLINATION: f32 = 0.02;
const PAUSE_LENGTH: f32 = 0.35;
const SCOOP_SEMITONES: f32 = 2.0;
const SCOOP_FRAMES: usize = 4;

#[derive(Debug, Deserialize)]
struct MockDescriptor {
    #[serde(default)]
    version: Option<EngineVersion>,
    #[serde(default)]
    api_version: Option<u32>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    styles: Option<Vec<StyleInfo>>,
}

/// Deterministic core with no native dependencies.
#[derive(Debug, Clone)]
pub struct MockCore {
    version: EngineVersion,
    api_version: u32,
    sample_rate: u32,
    styles: Vec<StyleInfo>,
    loaded: bool,
}

impl Default for MockCore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCore {
    /// A loaded mock core with the built-in style list.
    pub fn new() -> Self {
        Self::with_styles(default_styles())
    }

    /// A loaded mock core advertising `styles`.
    pub fn with_styles(styles: Vec<StyleInfo>) -> Self {
        Self {
            version: EngineVersion::new(crate::cores::MOCK_VERSION),
            api_version: CORE_API_VERSION,
            sample_rate: MOCK_SAMPLE_RATE,
            styles,
            loaded: true,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(Error::unavailable(&self.version, "core has been unloaded"))
        }
    }

    fn style_offset(style: u32) -> f32 {
        (style % 4) as f32 * 0.05
    }

    fn render(&self, f0_hz: impl Iterator<Item = (f32, f32)>) -> Vec<f32> {
        let hop = FRAME_HOP as usize;
        let mut samples = Vec::new();
        let mut phase = 0f64;
        for (hz, gain) in f0_hz {
            if hz <= 0.0 || gain <= 0.0 {
                samples.extend(std::iter::repeat(0.0).take(hop));
                phase = 0.0;
                continue;
            }
            let step = TAU * hz as f64 / self.sample_rate as f64;
            for _ in 0..hop {
                samples.push((AMPLITUDE * gain as f64 * phase.sin()) as f32);
                phase = (phase + step) % TAU;
            }
        }
        samples
    }
}

fn default_styles() -> Vec<StyleInfo> {
    let style = |index: u32, id: u32, name: &str, kind: StyleKind| StyleInfo {
        index,
        id: StyleId(id),
        name: name.to_string(),
        speaker: "Mock".to_string(),
        model: None,
        kind,
    };
    vec![
        style(0, MOCK_STYLE_ID, "ノーマル", StyleKind::Talk),
        style(1, 1, "ささやき", StyleKind::Talk),
        style(2, MOCK_SING_STYLE_ID, "ソング", StyleKind::Sing),
    ]
}

impl CoreEngine for MockCore {
    fn load(&mut self, path: &Path) -> Result<()> {
        let descriptor_path = path.join(CORE_DESCRIPTOR);
        if descriptor_path.is_file() {
            let content = std::fs::read_to_string(&descriptor_path)?;
            let descriptor: MockDescriptor =
                serde_json::from_str(&content).map_err(|e| Error::InvalidManifest {
                    path: descriptor_path.clone(),
                    reason: e.to_string(),
                })?;
            if let Some(version) = descriptor.version {
                self.version = version;
            }
            if let Some(api_version) = descriptor.api_version {
                self.api_version = api_version;
            }
            if let Some(sample_rate) = descriptor.sample_rate {
                self.sample_rate = sample_rate;
            }
            if let Some(styles) = descriptor.styles {
                self.styles = styles;
            }
        }
        log::debug!("Mock core {} ready with {} styles", self.version, self.styles.len());
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = false;
    }

    fn capabilities(&self) -> Result<Capabilities> {
        self.ensure_loaded()?;
        Ok(Capabilities {
            api_version: self.api_version,
            sample_rate: self.sample_rate,
            styles: self.styles.clone(),
        })
    }

    fn predict(&mut self, phrases: &[AccentPhrase], style: u32) -> Result<Vec<AccentPhrase>> {
        self.ensure_loaded()?;
        let offset = Self::style_offset(style);
        let mut position = 0usize;
        Ok(phrases
            .iter()
            .map(|phrase| {
                let mut predicted = phrase.clone();
                for (i, mora) in predicted.moras.iter_mut().enumerate() {
                    mora.consonant_length = mora
                        .consonant
                        .as_deref()
                        .map(|c| 0.04 + 0.002 * (phoneme_id(c) % 10) as f32);
                    mora.vowel_length = match mora.vowel.as_str() {
                        "N" | "cl" => 0.08,
                        v => 0.09 + 0.003 * (phoneme_id(&v.to_lowercase()) % 8) as f32,
                    };
                    mora.pitch = if mora.is_unvoiced() || mora.vowel == "cl" {
                        0.0
                    } else {
                        let rise = if phrase.is_high(i) { ACCENT_RISE } else { 0.0 };
                        BASE_PITCH + offset + rise - DECLINATION * position as f32
                    };
                    position += 1;
                }
                if let Some(pause) = predicted.pause_mora.as_mut() {
                    pause.vowel_length = PAUSE_LENGTH;
                    pause.pitch = 0.0;
                }
                predicted
            })
            .collect())
    }

    fn synthesize(
        &mut self,
        query: &SynthesisQuery,
        _style: u32,
        options: &SynthesisOptions,
    ) -> Result<Vec<f32>> {
        self.ensure_loaded()?;
        let features = decoder_features(query, self.sample_rate, options);
        let track = features.f0.iter().map(|&f0| {
            if f0 > 0.0 {
                (f0.exp(), 1.0)
            } else {
                (0.0, 0.0)
            }
        });
        Ok(self.render(track))
    }

    fn predict_sing_consonant_lengths(
        &mut self,
        notes: &[NotePhonemes],
        _style: u32,
    ) -> Result<Vec<u32>> {
        self.ensure_loaded()?;
        Ok(notes
            .iter()
            .map(|note| {
                note.consonant
                    .as_deref()
                    .map(|c| 3 + (phoneme_id(c) % 3) as u32)
                    .unwrap_or(0)
            })
            .collect())
    }

    fn predict_sing_f0_volume(
        &mut self,
        frames: &SingFrames,
        style: u32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        self.ensure_loaded()?;
        let offset = Self::style_offset(style);
        let mut f0 = Vec::with_capacity(frames.keys.len());
        let mut volume = Vec::with_capacity(frames.keys.len());
        let mut since_change = 0usize;
        let mut previous_key = None;

        for (phoneme, &key) in frames.phonemes.iter().zip(&frames.keys) {
            if key != previous_key {
                since_change = 0;
                previous_key = key;
            }
            let Some(key) = key else {
                f0.push(0.0);
                volume.push(0.0);
                continue;
            };
            // Attack from below, settling onto the note.
            let scoop = SCOOP_SEMITONES * (SCOOP_FRAMES.saturating_sub(since_change)) as f32
                / SCOOP_FRAMES as f32;
            let vibrato = 0.2 * (since_change as f32 * 0.4).sin();
            let semitones = vibrato - scoop + offset;
            f0.push(key_to_hz(key) * 2f32.powf(semitones / 12.0));
            volume.push(match phoneme.as_str() {
                "pau" | "cl" => 0.0,
                "N" => 0.7,
                p if p.chars().all(|c| "aiueo".contains(c)) => 0.9,
                _ => 0.5,
            });
            since_change += 1;
        }
        Ok((f0, volume))
    }

    fn synthesize_frames(&mut self, query: &FrameAudioQuery, _style: u32) -> Result<Vec<f32>> {
        self.ensure_loaded()?;
        let track = query
            .f0
            .iter()
            .enumerate()
            .map(|(i, &hz)| (hz, query.volume.get(i).copied().unwrap_or(0.0)));
        Ok(self.render(track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prosody::Mora;

    fn phrase() -> AccentPhrase {
        AccentPhrase {
            moras: vec![
                Mora::unpredicted("テ", Some("t"), "e"),
                Mora::unpredicted("ス", Some("s"), "U"),
                Mora::unpredicted("ト", Some("t"), "o"),
            ],
            accent: 1,
            pause_mora: None,
            is_interrogative: false,
        }
    }

    #[test]
    fn prediction_is_deterministic() {
        let mut core = MockCore::new();
        let a = core.predict(&[phrase()], 0).unwrap();
        let b = core.predict(&[phrase()], 0).unwrap();
        assert_eq!(a, b);
        assert!(a[0].moras[0].pitch > a[0].moras[2].pitch);
        assert_eq!(a[0].moras[1].pitch, 0.0);
        assert!(a[0].moras.iter().all(|m| m.vowel_length > 0.0));
    }

    #[test]
    fn styles_shift_pitch() {
        let mut core = MockCore::new();
        let a = core.predict(&[phrase()], 0).unwrap();
        let b = core.predict(&[phrase()], 1).unwrap();
        assert!(b[0].moras[0].pitch > a[0].moras[0].pitch);
    }

    #[test]
    fn calls_after_unload_fail() {
        let mut core = MockCore::new();
        core.unload();
        assert!(matches!(
            core.capabilities(),
            Err(Error::EngineUnavailable { .. })
        ));
        assert!(matches!(
            core.predict(&[phrase()], 0),
            Err(Error::EngineUnavailable { .. })
        ));
    }

    #[test]
    fn loads_styles_from_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CORE_DESCRIPTOR),
            r#"{"kind": "mock", "version": "0.3.0", "sample_rate": 48000,
                "styles": [{"index": 4, "id": 42, "name": "x", "speaker": "y"}]}"#,
        )
        .unwrap();
        let mut core = MockCore::new();
        core.unload();
        core.load(dir.path()).unwrap();
        let caps = core.capabilities().unwrap();
        assert_eq!(caps.sample_rate, 48000);
        assert_eq!(caps.styles.len(), 1);
        assert_eq!(caps.styles[0].id, StyleId(42));
        assert_eq!(caps.styles[0].kind, StyleKind::Talk);
    }

    #[test]
    fn silent_frames_render_zeros() {
        let core = MockCore::new();
        let samples = core.render([(0.0, 1.0), (440.0, 0.0)].into_iter());
        assert_eq!(samples.len(), 2 * FRAME_HOP as usize);
        assert!(samples.iter().all(|&s| s == 0.0));
    }
}

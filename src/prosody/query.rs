use serde::{Deserialize, Serialize};

use super::kana::create_kana;
use super::mora::AccentPhrase;

/// Default leading/trailing silence in seconds.
pub const DEFAULT_PHONEME_SILENCE: f32 = 0.1;

/// Full instruction set for one talk synthesis: the prosody plan plus global
/// scalars.
///
/// Field names follow the camelCase JSON layout of the application layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisQuery {
    #[serde(rename = "accent_phrases")]
    pub accent_phrases: Vec<AccentPhrase>,
    pub speed_scale: f32,
    pub pitch_scale: f32,
    pub intonation_scale: f32,
    pub volume_scale: f32,
    pub pre_phoneme_length: f32,
    pub post_phoneme_length: f32,
    /// Absolute pause length replacing every predicted pause, if set.
    #[serde(default)]
    pub pause_length: Option<f32>,
    #[serde(default = "one")]
    pub pause_length_scale: f32,
    pub output_sampling_rate: u32,
    #[serde(default)]
    pub output_stereo: bool,
    #[serde(default)]
    pub kana: Option<String>,
}

fn one() -> f32 {
    1.0
}

impl SynthesisQuery {
    /// Wrap predicted accent phrases with default scalars.
    pub fn new(accent_phrases: Vec<AccentPhrase>, output_sampling_rate: u32) -> Self {
        let kana = create_kana(&accent_phrases);
        Self {
            accent_phrases,
            speed_scale: 1.0,
            pitch_scale: 0.0,
            intonation_scale: 1.0,
            volume_scale: 1.0,
            pre_phoneme_length: DEFAULT_PHONEME_SILENCE,
            post_phoneme_length: DEFAULT_PHONEME_SILENCE,
            pause_length: None,
            pause_length_scale: 1.0,
            output_sampling_rate,
            output_stereo: false,
            kana: Some(kana),
        }
    }

    /// Number of moras across all phrases, pause moras excluded.
    pub fn mora_count(&self) -> usize {
        self.accent_phrases.iter().map(|p| p.moras.len()).sum()
    }
}

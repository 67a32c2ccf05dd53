//! Rendering a [`SynthesisQuery`] into frame-level decoder input.
//!
//! The global scalars of a query are applied here, on a flattened copy of
//! its moras, right before a core decodes it:
//! silence, pause length, speed, pitch, intonation and (optionally) the
//! interrogative upspeak.

use super::mora::{AccentPhrase, Mora, PAUSE_VOWEL};
use super::query::SynthesisQuery;

/// Samples per decoder frame.
pub const FRAME_HOP: u32 = 256;

const UPSPEAK_LENGTH: f32 = 0.15;
const UPSPEAK_PITCH_ADD: f32 = 0.3;
const UPSPEAK_PITCH_MAX: f32 = 6.5;

/// Decoder frames per second at `sample_rate`.
pub fn frame_rate(sample_rate: u32) -> f32 {
    sample_rate as f32 / FRAME_HOP as f32
}

/// Seconds to frames, rounded per phoneme.
pub fn to_frames(seconds: f32, frame_rate: f32) -> u32 {
    (seconds.max(0.0) * frame_rate).round() as u32
}

/// Options that change how a query is rendered, not what it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Raise the pitch at the end of interrogative phrases.
    pub enable_interrogative_upspeak: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            enable_interrogative_upspeak: true,
        }
    }
}

/// One phoneme and the number of frames it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct FramedPhoneme {
    pub phoneme: String,
    pub frames: u32,
}

/// Frame-level input for a talk decoder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecoderFeatures {
    pub phonemes: Vec<FramedPhoneme>,
    /// Log-F0 per frame, `0.0` for silent or unvoiced frames.
    pub f0: Vec<f32>,
}

impl DecoderFeatures {
    pub fn frame_count(&self) -> usize {
        self.f0.len()
    }

    /// Phoneme name for every frame, in order.
    pub fn phoneme_per_frame(&self) -> impl Iterator<Item = &str> {
        self.phonemes
            .iter()
            .flat_map(|p| std::iter::repeat(p.phoneme.as_str()).take(p.frames as usize))
    }
}

/// Append a rising mora to every voiced interrogative phrase.
pub fn apply_interrogative_upspeak(phrases: &[AccentPhrase]) -> Vec<AccentPhrase> {
    phrases
        .iter()
        .map(|phrase| {
            let mut phrase = phrase.clone();
            if !phrase.is_interrogative {
                return phrase;
            }
            let Some(last) = phrase.moras.last() else {
                return phrase;
            };
            if last.pitch <= 0.0 {
                return phrase;
            }
            let upspeak = Mora {
                text: "ー".to_string(),
                consonant: None,
                consonant_length: None,
                vowel: last.vowel.clone(),
                vowel_length: UPSPEAK_LENGTH,
                pitch: (last.pitch + UPSPEAK_PITCH_ADD).min(UPSPEAK_PITCH_MAX),
            };
            phrase.moras.push(upspeak);
            phrase
        })
        .collect()
}

/// Flatten the query into moras with every global scalar applied.
///
/// The result starts and ends with a silence mora.
pub fn apply_prosody(query: &SynthesisQuery, options: &SynthesisOptions) -> Vec<Mora> {
    let phrases = if options.enable_interrogative_upspeak {
        apply_interrogative_upspeak(&query.accent_phrases)
    } else {
        query.accent_phrases.clone()
    };

    let mut moras = Vec::with_capacity(query.mora_count() + 2);
    moras.push(silence(query.pre_phoneme_length));
    for phrase in &phrases {
        moras.extend(phrase.moras.iter().cloned());
        if let Some(pause) = &phrase.pause_mora {
            let mut pause = pause.clone();
            if let Some(length) = query.pause_length {
                pause.vowel_length = length;
            }
            pause.vowel_length *= query.pause_length_scale;
            moras.push(pause);
        }
    }
    moras.push(silence(query.post_phoneme_length));

    for mora in &mut moras {
        if let Some(c) = mora.consonant_length.as_mut() {
            *c /= query.speed_scale;
        }
        mora.vowel_length /= query.speed_scale;
        mora.pitch *= 2f32.powf(query.pitch_scale);
    }

    let voiced: Vec<f32> = moras.iter().map(|m| m.pitch).filter(|&p| p > 0.0).collect();
    if !voiced.is_empty() && query.intonation_scale != 1.0 {
        let mean = voiced.iter().sum::<f32>() / voiced.len() as f32;
        for mora in moras.iter_mut().filter(|m| m.pitch > 0.0) {
            mora.pitch = (mora.pitch - mean) * query.intonation_scale + mean;
        }
    }

    moras
}

/// Build decoder input for `query` at the core's native `sample_rate`.
pub fn decoder_features(
    query: &SynthesisQuery,
    sample_rate: u32,
    options: &SynthesisOptions,
) -> DecoderFeatures {
    let rate = frame_rate(sample_rate);
    let mut features = DecoderFeatures::default();

    for mora in apply_prosody(query, options) {
        let mut mora_frames = 0u32;
        if let (Some(consonant), Some(length)) = (&mora.consonant, mora.consonant_length) {
            let frames = to_frames(length, rate);
            features.phonemes.push(FramedPhoneme {
                phoneme: consonant.clone(),
                frames,
            });
            mora_frames += frames;
        }
        let frames = to_frames(mora.vowel_length, rate);
        features.phonemes.push(FramedPhoneme {
            phoneme: mora.vowel.clone(),
            frames,
        });
        mora_frames += frames;

        let pitch = if mora.is_unvoiced() || mora.is_pause() {
            0.0
        } else {
            mora.pitch.max(0.0)
        };
        features
            .f0
            .extend(std::iter::repeat(pitch).take(mora_frames as usize));
    }

    features
}

fn silence(length: f32) -> Mora {
    Mora {
        text: String::new(),
        consonant: None,
        consonant_length: None,
        vowel: PAUSE_VOWEL.to_string(),
        vowel_length: length,
        pitch: 0.0,
    }
}

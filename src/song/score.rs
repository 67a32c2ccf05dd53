use serde::{Deserialize, Serialize};

/// One note of a musical score.
///
/// A rest has no `key` and an empty `lyric`. `frame_length` is measured in
/// decoder frames of the style's core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<u8>,
    pub frame_length: u32,
    pub lyric: String,
}

impl Note {
    pub fn rest(frame_length: u32) -> Self {
        Self {
            id: None,
            key: None,
            frame_length,
            lyric: String::new(),
        }
    }

    pub fn sung(key: u8, frame_length: u32, lyric: &str) -> Self {
        Self {
            id: None,
            key: Some(key),
            frame_length,
            lyric: lyric.to_string(),
        }
    }

    pub fn is_rest(&self) -> bool {
        self.key.is_none() && self.lyric.is_empty()
    }
}

/// Ordered notes to be sung.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub notes: Vec<Note>,
}

/// Phonetic content of one note as handed to a core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePhonemes {
    pub note_id: Option<String>,
    pub key: Option<u8>,
    pub frame_length: u32,
    pub consonant: Option<String>,
    /// `"pau"` for rests.
    pub vowel: String,
}

/// Frame-aligned phoneme of a [`FrameAudioQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePhoneme {
    pub phoneme: String,
    pub frame_length: u32,
    #[serde(default)]
    pub note_id: Option<String>,
}

/// Frame-level inputs for the singing predictor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SingFrames {
    /// Phoneme name per frame.
    pub phonemes: Vec<String>,
    /// Note key per frame, `None` inside rests.
    pub keys: Vec<Option<u8>>,
}

/// Singing counterpart of a synthesis query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAudioQuery {
    /// F0 per frame in Hz, `0.0` when silent.
    pub f0: Vec<f32>,
    pub volume: Vec<f32>,
    pub phonemes: Vec<FramePhoneme>,
    pub volume_scale: f32,
    /// Transposition applied at synthesis time, in semitones.
    #[serde(default)]
    pub key_shift: i32,
    pub output_sampling_rate: u32,
    #[serde(default)]
    pub output_stereo: bool,
}

impl FrameAudioQuery {
    pub fn frame_count(&self) -> usize {
        self.f0.len()
    }
}

/// Frequency of a MIDI key in Hz.
pub fn key_to_hz(key: u8) -> f32 {
    440.0 * 2f32.powf((key as f32 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::{key_to_hz, Note};

    #[test]
    fn a4_is_440() {
        assert!((key_to_hz(69) - 440.0).abs() < 1e-3);
        assert!((key_to_hz(81) - 880.0).abs() < 1e-2);
    }

    #[test]
    fn rest_detection() {
        assert!(Note::rest(10).is_rest());
        assert!(!Note::sung(60, 10, "ド").is_rest());
    }
}

use serde::{Deserialize, Serialize};

/// Vowel symbol of a pause mora.
pub const PAUSE_VOWEL: &str = "pau";

/// Minimal timing/pitch unit of a prosody plan.
///
/// Lengths are in seconds. `pitch` is log-F0; `0.0` marks an unvoiced or
/// silent mora. Unvoiced vowels are written in upper case (`"U"`, `"I"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mora {
    pub text: String,
    #[serde(default)]
    pub consonant: Option<String>,
    #[serde(default)]
    pub consonant_length: Option<f32>,
    pub vowel: String,
    pub vowel_length: f32,
    pub pitch: f32,
}

impl Mora {
    /// A mora with phonetic annotations only; lengths and pitch are zero.
    pub fn unpredicted(text: &str, consonant: Option<&str>, vowel: &str) -> Self {
        Self {
            text: text.to_string(),
            consonant: consonant.map(str::to_string),
            consonant_length: consonant.map(|_| 0.0),
            vowel: vowel.to_string(),
            vowel_length: 0.0,
            pitch: 0.0,
        }
    }

    /// Pause mora of the given length.
    pub fn pause(length: f32) -> Self {
        Self {
            text: "、".to_string(),
            consonant: None,
            consonant_length: None,
            vowel: PAUSE_VOWEL.to_string(),
            vowel_length: length,
            pitch: 0.0,
        }
    }

    pub fn is_pause(&self) -> bool {
        self.vowel == PAUSE_VOWEL
    }

    /// Devoiced vowels are spelled with a capital letter.
    pub fn is_unvoiced(&self) -> bool {
        matches!(self.vowel.as_str(), "A" | "I" | "U" | "E" | "O")
    }

    /// Total length of consonant plus vowel.
    pub fn length(&self) -> f32 {
        self.consonant_length.unwrap_or(0.0) + self.vowel_length
    }
}

/// Group of moras sharing one pitch-accent contour.
///
/// `accent` is the 1-based position of the accent nucleus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    pub accent: usize,
    #[serde(default)]
    pub pause_mora: Option<Mora>,
    #[serde(default)]
    pub is_interrogative: bool,
}

impl AccentPhrase {
    /// Iterate over the phrase's moras followed by its pause mora, if any.
    pub fn all_moras(&self) -> impl Iterator<Item = &Mora> {
        self.moras.iter().chain(self.pause_mora.iter())
    }

    pub fn all_moras_mut(&mut self) -> impl Iterator<Item = &mut Mora> {
        self.moras.iter_mut().chain(self.pause_mora.iter_mut())
    }

    /// Whether the mora at `index` sits in the high part of a Tokyo-style
    /// accent contour.
    pub fn is_high(&self, index: usize) -> bool {
        match self.accent {
            0 => index > 0,
            1 => index == 0,
            accent => index > 0 && index < accent,
        }
    }
}

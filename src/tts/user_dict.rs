//! User dictionary: surface forms with a fixed reading and accent.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::prosody::mora::Mora;
use crate::prosody::mora_list::{self, is_katakana, LONG_VOWEL_MARK};

use super::analyzer::normalize;

pub const MIN_PRIORITY: u32 = 0;
pub const MAX_PRIORITY: u32 = 10;

fn default_priority() -> u32 {
    5
}

/// One dictionary entry as stored by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDictWord {
    pub surface: String,
    /// Katakana reading.
    pub pronunciation: String,
    /// Accent nucleus position; `0` for a flat phrase.
    pub accent_type: usize,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

/// A validated word with its reading split into moras.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DictEntry {
    pub(crate) surface: Vec<char>,
    pub(crate) moras: Vec<Mora>,
    pub(crate) accent: usize,
    pub(crate) priority: u32,
}

/// Read-only snapshot of the user dictionary for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDictionary {
    words: Vec<UserDictWord>,
    entries: Vec<DictEntry>,
}

impl UserDictionary {
    pub fn new(words: Vec<UserDictWord>) -> Result<Self> {
        let mut entries = words.iter().map(compile).collect::<Result<Vec<_>>>()?;
        // Longest surface first, then highest priority.
        entries.sort_by(|a, b| {
            b.surface
                .len()
                .cmp(&a.surface.len())
                .then(b.priority.cmp(&a.priority))
        });
        Ok(Self { words, entries })
    }

    /// Parse the stored form: an object mapping word ids to words.
    pub fn from_json(json: &str) -> Result<Self> {
        let words: BTreeMap<String, UserDictWord> = serde_json::from_str(json)?;
        Self::new(words.into_values().collect())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn words(&self) -> &[UserDictWord] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best entry whose surface starts at `text[pos..]`.
    pub(crate) fn match_at(&self, text: &[char], pos: usize) -> Option<&DictEntry> {
        let rest = &text[pos..];
        self.entries.iter().find(|e| rest.starts_with(&e.surface))
    }
}

fn compile(word: &UserDictWord) -> Result<DictEntry> {
    let invalid = |reason: &str| Error::InvalidDictionary {
        surface: word.surface.clone(),
        reason: reason.to_string(),
    };

    if word.surface.trim().is_empty() {
        return Err(invalid("surface is empty"));
    }
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&word.priority) {
        return Err(invalid("priority must be within 0..=10"));
    }
    if word.pronunciation.is_empty() || !word.pronunciation.chars().all(is_katakana) {
        return Err(invalid("pronunciation must be katakana"));
    }

    let mut moras: Vec<Mora> = Vec::new();
    let mut rest = word.pronunciation.as_str();
    while let Some(ch) = rest.chars().next() {
        if ch == LONG_VOWEL_MARK {
            let previous = moras
                .last()
                .ok_or_else(|| invalid("pronunciation starts with a long vowel mark"))?;
            moras.push(long_vowel(previous));
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        let (matched, consonant, vowel) = mora_list::longest_prefix(rest)
            .ok_or_else(|| invalid(&format!("{ch} is not a valid mora")))?;
        moras.push(Mora::unpredicted(matched, consonant, vowel));
        rest = &rest[matched.len()..];
    }

    if word.accent_type > moras.len() {
        return Err(invalid("accent type exceeds the mora count"));
    }
    // A flat phrase rises and never falls: its nucleus is the last mora.
    let accent = match word.accent_type {
        0 => moras.len(),
        accent => accent,
    };

    Ok(DictEntry {
        surface: word.surface.chars().map(normalize).collect(),
        moras,
        accent,
        priority: word.priority,
    })
}

/// Mora extending the vowel of `previous`, spelled with that vowel's kana.
pub(crate) fn long_vowel(previous: &Mora) -> Mora {
    let vowel = previous.vowel.to_lowercase();
    let text = match vowel.as_str() {
        "a" => "ア",
        "i" => "イ",
        "u" => "ウ",
        "e" => "エ",
        "o" => "オ",
        _ => "ン",
    };
    let vowel = if text == "ン" { "N" } else { vowel.as_str() };
    Mora::unpredicted(text, None, vowel)
}

//! Rule-based text analysis: Japanese text to unpredicted accent phrases.
//!
//! Covers kana text, user dictionary words, spelled-out Latin letters and
//! digits. Anything else is read as the fallback mora.

use crate::prosody::mora::{AccentPhrase, Mora};
use crate::prosody::mora_list::{self, is_katakana, is_voiceless_consonant, to_katakana};

use super::user_dict::{long_vowel, UserDictionary};

/// Read for characters the analyzer cannot pronounce.
pub const FALLBACK_MORA: &str = "ン";

/// Accent of phrases not taken from the dictionary.
pub const DEFAULT_ACCENT: usize = 1;

const PAUSE_PUNCTUATION: &[char] = &[
    '、', '。', '，', '．', ',', '.', '!', '！', '?', '？', '…', '・', '\n',
];

fn is_question_mark(ch: char) -> bool {
    ch == '?' || ch == '？'
}

fn spelled(ch: char) -> Option<&'static str> {
    let reading = match ch.to_ascii_uppercase() {
        'A' => "エー",
        'B' => "ビー",
        'C' => "シー",
        'D' => "ディー",
        'E' => "イー",
        'F' => "エフ",
        'G' => "ジー",
        'H' => "エイチ",
        'I' => "アイ",
        'J' => "ジェー",
        'K' => "ケー",
        'L' => "エル",
        'M' => "エム",
        'N' => "エヌ",
        'O' => "オー",
        'P' => "ピー",
        'Q' => "キュー",
        'R' => "アール",
        'S' => "エス",
        'T' => "ティー",
        'U' => "ユー",
        'V' => "ブイ",
        'W' => "ダブリュー",
        'X' => "エックス",
        'Y' => "ワイ",
        'Z' => "ゼット",
        '0' => "ゼロ",
        '1' => "イチ",
        '2' => "ニ",
        '3' => "サン",
        '4' => "ヨン",
        '5' => "ゴ",
        '6' => "ロク",
        '7' => "ナナ",
        '8' => "ハチ",
        '9' => "キュウ",
        _ => return None,
    };
    Some(reading)
}

/// Fold hiragana to katakana and full-width letters and digits to ASCII.
pub(crate) fn normalize(ch: char) -> char {
    match ch {
        '\u{FF10}'..='\u{FF19}' | '\u{FF21}'..='\u{FF3A}' | '\u{FF41}'..='\u{FF5A}' => {
            char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch)
        }
        _ => to_katakana(ch),
    }
}

#[derive(Default)]
struct PhraseBuilder {
    phrases: Vec<AccentPhrase>,
    moras: Vec<Mora>,
}

impl PhraseBuilder {
    fn close(&mut self, pause: bool, interrogative: bool) {
        if !self.moras.is_empty() {
            self.phrases.push(AccentPhrase {
                moras: std::mem::take(&mut self.moras),
                accent: DEFAULT_ACCENT,
                pause_mora: None,
                is_interrogative: false,
            });
        }
        // Punctuation after punctuation marks the phrase already closed.
        if let Some(last) = self.phrases.last_mut() {
            if pause && last.pause_mora.is_none() {
                last.pause_mora = Some(Mora::pause(0.0));
            }
            last.is_interrogative |= interrogative;
        }
    }

    fn push_word(&mut self, moras: Vec<Mora>, accent: usize) {
        self.close(false, false);
        self.phrases.push(AccentPhrase {
            moras,
            accent,
            pause_mora: None,
            is_interrogative: false,
        });
    }

    /// Push the moras of a katakana reading; returns the bytes consumed.
    fn push_kana(&mut self, text: &str) -> usize {
        let Some(ch) = text.chars().next() else {
            return 0;
        };
        if ch == mora_list::LONG_VOWEL_MARK {
            match self.moras.last() {
                Some(previous) => {
                    let extended = long_vowel(previous);
                    self.moras.push(extended);
                }
                None => log::debug!("Dropping long vowel mark at the start of a phrase"),
            }
            return ch.len_utf8();
        }
        match mora_list::longest_prefix(text) {
            Some((matched, consonant, vowel)) => {
                self.moras.push(Mora::unpredicted(matched, consonant, vowel));
                matched.len()
            }
            None => {
                self.push_fallback(ch);
                ch.len_utf8()
            }
        }
    }

    fn push_reading(&mut self, reading: &str) {
        let mut rest = reading;
        while !rest.is_empty() {
            let consumed = self.push_kana(rest);
            rest = &rest[consumed..];
        }
    }

    fn push_fallback(&mut self, ch: char) {
        log::debug!("No reading for {ch:?}, using {FALLBACK_MORA}");
        if let Some((consonant, vowel)) = mora_list::lookup(FALLBACK_MORA) {
            self.moras
                .push(Mora::unpredicted(FALLBACK_MORA, consonant, vowel));
        }
    }

    fn finish(mut self) -> Vec<AccentPhrase> {
        self.close(false, false);
        if let Some(last) = self.phrases.last_mut() {
            last.pause_mora = None;
        }
        for phrase in &mut self.phrases {
            devoice(phrase);
        }
        self.phrases
    }
}

/// Devoice `i`/`u` after a voiceless consonant when the next mora also
/// starts with one, or when the mora ends the phrase.
fn devoice(phrase: &mut AccentPhrase) {
    let len = phrase.moras.len();
    for i in 0..len {
        let current = &phrase.moras[i];
        let voiceless_onset = current
            .consonant
            .as_deref()
            .is_some_and(is_voiceless_consonant);
        if !voiceless_onset || !matches!(current.vowel.as_str(), "i" | "u") {
            continue;
        }
        let followed_by_voiceless = match phrase.moras.get(i + 1) {
            Some(next) => next
                .consonant
                .as_deref()
                .is_some_and(is_voiceless_consonant),
            // An interrogative ending must stay voiced to rise.
            None => !phrase.is_interrogative,
        };
        // Two devoiced moras in a row sound wrong; keep the second voiced.
        let previous_devoiced = i > 0 && phrase.moras[i - 1].is_unvoiced();
        if followed_by_voiceless && !previous_devoiced {
            let mora = &mut phrase.moras[i];
            mora.vowel = mora.vowel.to_uppercase();
        }
    }
}

/// Split `text` into accent phrases with phonetic annotations only.
///
/// Lengths and pitch are left at zero for the core to predict.
pub fn analyze(text: &str, dictionary: Option<&UserDictionary>) -> Vec<AccentPhrase> {
    let folded: String = text.chars().map(normalize).collect();
    let chars: Vec<char> = folded.chars().collect();
    let offsets: Vec<usize> = folded.char_indices().map(|(i, _)| i).collect();

    let mut builder = PhraseBuilder::default();
    let mut pos = 0usize;
    while pos < chars.len() {
        if let Some(entry) = dictionary.and_then(|d| d.match_at(&chars, pos)) {
            builder.push_word(entry.moras.clone(), entry.accent);
            pos += entry.surface.len();
            continue;
        }

        let ch = chars[pos];
        if PAUSE_PUNCTUATION.contains(&ch) {
            builder.close(true, is_question_mark(ch));
            pos += 1;
        } else if ch.is_whitespace() {
            builder.close(false, false);
            pos += 1;
        } else if is_katakana(ch) {
            let start = offsets[pos];
            let consumed = builder.push_kana(&folded[start..]);
            pos += folded[start..start + consumed].chars().count();
        } else if let Some(reading) = spelled(ch) {
            builder.push_reading(reading);
            pos += 1;
        } else {
            builder.push_fallback(ch);
            pos += 1;
        }
    }
    builder.finish()
}

//! AquesTalk-style kana notation for accent phrases.
//!
//! ```text
//! テ'_ストデ_ス/ア'メ、ハ'レ？
//! ```
//!
//! - `/` separates phrases, `、` separates phrases with a pause
//! - `'` follows the accent nucleus (exactly one per phrase)
//! - `_` precedes a devoiced mora
//! - a trailing `？` marks an interrogative phrase

use super::mora::{AccentPhrase, Mora};
use super::mora_list;
use crate::error::{Error, Result};

const PHRASE_SEPARATOR: char = '/';
const PAUSE_SEPARATOR: char = '、';
const ACCENT_MARK: char = '\'';
const UNVOICE_MARK: char = '_';
const INTERROGATIVE_MARK: char = '？';

/// Render accent phrases in kana notation.
pub fn create_kana(phrases: &[AccentPhrase]) -> String {
    let mut kana = String::new();
    for (i, phrase) in phrases.iter().enumerate() {
        for (j, mora) in phrase.moras.iter().enumerate() {
            if mora.is_unvoiced() {
                kana.push(UNVOICE_MARK);
            }
            kana.push_str(&mora.text);
            if j + 1 == phrase.accent {
                kana.push(ACCENT_MARK);
            }
        }
        if phrase.is_interrogative {
            kana.push(INTERROGATIVE_MARK);
        }
        if i + 1 < phrases.len() {
            kana.push(if phrase.pause_mora.is_some() {
                PAUSE_SEPARATOR
            } else {
                PHRASE_SEPARATOR
            });
        }
    }
    kana
}

/// Parse kana notation into unpredicted accent phrases.
pub fn parse_kana(text: &str) -> Result<Vec<AccentPhrase>> {
    let mut phrases = Vec::new();
    if text.is_empty() {
        return Ok(phrases);
    }

    let mut start = 0usize;
    let mut position = 0usize;
    for (idx, ch) in text.char_indices() {
        if ch == PHRASE_SEPARATOR || ch == PAUSE_SEPARATOR {
            let mut phrase = parse_phrase(&text[start..idx], position)?;
            if ch == PAUSE_SEPARATOR {
                phrase.pause_mora = Some(Mora::pause(0.0));
            }
            phrases.push(phrase);
            start = idx + ch.len_utf8();
            position = text[..start].chars().count();
        }
    }
    phrases.push(parse_phrase(&text[start..], position)?);
    Ok(phrases)
}

fn parse_phrase(text: &str, offset: usize) -> Result<AccentPhrase> {
    let invalid = |position: usize, reason: &str| Error::InvalidKana {
        position: offset + position,
        reason: reason.to_string(),
    };

    if text.is_empty() {
        return Err(invalid(0, "empty accent phrase"));
    }

    let (body, is_interrogative) = match text.strip_suffix(INTERROGATIVE_MARK) {
        Some(body) => (body, true),
        None => (text, false),
    };

    let mut moras = Vec::new();
    let mut accent = None;
    let mut unvoice_next = false;
    let mut rest = body;
    let mut position = 0usize;

    while let Some(ch) = rest.chars().next() {
        match ch {
            ACCENT_MARK => {
                if moras.is_empty() {
                    return Err(invalid(position, "accent mark before the first mora"));
                }
                if accent.replace(moras.len()).is_some() {
                    return Err(invalid(position, "second accent mark in one phrase"));
                }
                rest = &rest[ch.len_utf8()..];
                position += 1;
            }
            UNVOICE_MARK => {
                unvoice_next = true;
                rest = &rest[ch.len_utf8()..];
                position += 1;
            }
            INTERROGATIVE_MARK => {
                return Err(invalid(position, "interrogative mark must end the phrase"));
            }
            _ => {
                let (matched, consonant, vowel) = mora_list::longest_prefix(rest)
                    .ok_or_else(|| invalid(position, &format!("unknown kana {ch:?}")))?;
                let vowel = if unvoice_next {
                    if !matches!(vowel, "a" | "i" | "u" | "e" | "o") {
                        return Err(invalid(position, "this mora cannot be devoiced"));
                    }
                    vowel.to_uppercase()
                } else {
                    vowel.to_string()
                };
                unvoice_next = false;
                moras.push(Mora::unpredicted(matched, consonant, &vowel));
                position += matched.chars().count();
                rest = &rest[matched.len()..];
            }
        }
    }

    if unvoice_next {
        return Err(invalid(position, "devoice mark without a mora"));
    }
    let accent = accent.ok_or_else(|| invalid(position, "accent mark not found"))?;

    Ok(AccentPhrase {
        moras,
        accent,
        pause_mora: None,
        is_interrogative,
    })
}

#[cfg(test)]
mod tests {
    use super::{create_kana, parse_kana};
    use crate::error::Error;

    #[test]
    fn parses_phrases_accents_and_pauses() {
        let phrases = parse_kana("テ'_ストデ_ス、ア'メ？").unwrap();
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].accent, 1);
        assert_eq!(phrases[0].moras.len(), 5);
        assert_eq!(phrases[0].moras[1].vowel, "U");
        assert!(phrases[0].pause_mora.is_some());
        assert!(phrases[1].is_interrogative);
        assert!(phrases[1].pause_mora.is_none());
    }

    #[test]
    fn round_trips_through_notation() {
        let kana = "コンニチワ'/セ'カイ";
        let phrases = parse_kana(kana).unwrap();
        assert_eq!(create_kana(&phrases), kana);
    }

    #[test]
    fn compound_moras_are_single_units() {
        let phrases = parse_kana("キャ'ット").unwrap();
        let texts: Vec<_> = phrases[0].moras.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["キャ", "ッ", "ト"]);
    }

    #[test]
    fn missing_accent_is_rejected() {
        assert!(matches!(
            parse_kana("テスト"),
            Err(Error::InvalidKana { .. })
        ));
    }

    #[test]
    fn reports_position_of_unknown_text() {
        match parse_kana("ア'/カx") {
            Err(Error::InvalidKana { position, .. }) => assert_eq!(position, 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_phrase_is_rejected() {
        assert!(parse_kana("ア'//イ'").is_err());
    }
}

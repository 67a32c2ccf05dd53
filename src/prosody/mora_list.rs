//! Katakana mora table: surface text to (consonant, vowel).

use std::collections::HashMap;
use std::sync::OnceLock;

/// `(text, consonant, vowel)`; an empty consonant means none.
const MORA_LIST: &[(&str, &str, &str)] = &[
    ("ヴォ", "v", "o"),
    ("ヴェ", "v", "e"),
    ("ヴィ", "v", "i"),
    ("ヴァ", "v", "a"),
    ("ヴ", "v", "u"),
    ("ン", "", "N"),
    ("ワ", "w", "a"),
    ("ウォ", "w", "o"),
    ("ウェ", "w", "e"),
    ("ウィ", "w", "i"),
    ("ヲ", "", "o"),
    ("ロ", "r", "o"),
    ("レ", "r", "e"),
    ("ル", "r", "u"),
    ("リョ", "ry", "o"),
    ("リュ", "ry", "u"),
    ("リャ", "ry", "a"),
    ("リェ", "ry", "e"),
    ("リ", "r", "i"),
    ("ラ", "r", "a"),
    ("ヨ", "y", "o"),
    ("ユ", "y", "u"),
    ("ヤ", "y", "a"),
    ("イェ", "y", "e"),
    ("モ", "m", "o"),
    ("メ", "m", "e"),
    ("ム", "m", "u"),
    ("ミョ", "my", "o"),
    ("ミュ", "my", "u"),
    ("ミャ", "my", "a"),
    ("ミェ", "my", "e"),
    ("ミ", "m", "i"),
    ("マ", "m", "a"),
    ("ポ", "p", "o"),
    ("ボ", "b", "o"),
    ("ホ", "h", "o"),
    ("ペ", "p", "e"),
    ("ベ", "b", "e"),
    ("ヘ", "h", "e"),
    ("プ", "p", "u"),
    ("ブ", "b", "u"),
    ("フォ", "f", "o"),
    ("フェ", "f", "e"),
    ("フィ", "f", "i"),
    ("ファ", "f", "a"),
    ("フ", "f", "u"),
    ("ピョ", "py", "o"),
    ("ピュ", "py", "u"),
    ("ピャ", "py", "a"),
    ("ピェ", "py", "e"),
    ("ピ", "p", "i"),
    ("ビョ", "by", "o"),
    ("ビュ", "by", "u"),
    ("ビャ", "by", "a"),
    ("ビェ", "by", "e"),
    ("ビ", "b", "i"),
    ("ヒョ", "hy", "o"),
    ("ヒュ", "hy", "u"),
    ("ヒャ", "hy", "a"),
    ("ヒェ", "hy", "e"),
    ("ヒ", "h", "i"),
    ("パ", "p", "a"),
    ("バ", "b", "a"),
    ("ハ", "h", "a"),
    ("ノ", "n", "o"),
    ("ネ", "n", "e"),
    ("ヌ", "n", "u"),
    ("ニョ", "ny", "o"),
    ("ニュ", "ny", "u"),
    ("ニャ", "ny", "a"),
    ("ニェ", "ny", "e"),
    ("ニ", "n", "i"),
    ("ナ", "n", "a"),
    ("ドゥ", "d", "u"),
    ("ド", "d", "o"),
    ("トゥ", "t", "u"),
    ("ト", "t", "o"),
    ("デョ", "dy", "o"),
    ("デュ", "dy", "u"),
    ("デャ", "dy", "a"),
    ("ディ", "d", "i"),
    ("デ", "d", "e"),
    ("テョ", "ty", "o"),
    ("テュ", "ty", "u"),
    ("テャ", "ty", "a"),
    ("ティ", "t", "i"),
    ("テ", "t", "e"),
    ("ツォ", "ts", "o"),
    ("ツェ", "ts", "e"),
    ("ツィ", "ts", "i"),
    ("ツァ", "ts", "a"),
    ("ツ", "ts", "u"),
    ("ッ", "", "cl"),
    ("チョ", "ch", "o"),
    ("チュ", "ch", "u"),
    ("チャ", "ch", "a"),
    ("チェ", "ch", "e"),
    ("チ", "ch", "i"),
    ("ダ", "d", "a"),
    ("タ", "t", "a"),
    ("ゾ", "z", "o"),
    ("ソ", "s", "o"),
    ("ゼ", "z", "e"),
    ("セ", "s", "e"),
    ("ズィ", "z", "i"),
    ("ズ", "z", "u"),
    ("スィ", "s", "i"),
    ("ス", "s", "u"),
    ("ジョ", "j", "o"),
    ("ジュ", "j", "u"),
    ("ジャ", "j", "a"),
    ("ジェ", "j", "e"),
    ("ジ", "j", "i"),
    ("ヂ", "j", "i"),
    ("ヅ", "z", "u"),
    ("ショ", "sh", "o"),
    ("シュ", "sh", "u"),
    ("シャ", "sh", "a"),
    ("シェ", "sh", "e"),
    ("シ", "sh", "i"),
    ("ザ", "z", "a"),
    ("サ", "s", "a"),
    ("ゴ", "g", "o"),
    ("コ", "k", "o"),
    ("ゲ", "g", "e"),
    ("ケ", "k", "e"),
    ("グヮ", "gw", "a"),
    ("グ", "g", "u"),
    ("クヮ", "kw", "a"),
    ("ク", "k", "u"),
    ("ギョ", "gy", "o"),
    ("ギュ", "gy", "u"),
    ("ギャ", "gy", "a"),
    ("ギェ", "gy", "e"),
    ("ギ", "g", "i"),
    ("キョ", "ky", "o"),
    ("キュ", "ky", "u"),
    ("キャ", "ky", "a"),
    ("キェ", "ky", "e"),
    ("キ", "k", "i"),
    ("ガ", "g", "a"),
    ("カ", "k", "a"),
    ("オ", "", "o"),
    ("エ", "", "e"),
    ("ウ", "", "u"),
    ("イ", "", "i"),
    ("ア", "", "a"),
    ("ァ", "", "a"),
    ("ィ", "", "i"),
    ("ゥ", "", "u"),
    ("ェ", "", "e"),
    ("ォ", "", "o"),
];

/// Long-vowel mark; repeats the previous mora's vowel.
pub const LONG_VOWEL_MARK: char = 'ー';

/// Consonants that devoice a following close vowel.
const VOICELESS_CONSONANTS: &[&str] = &[
    "k", "ky", "kw", "s", "sh", "t", "ty", "ch", "ts", "h", "hy", "f", "p", "py",
];

fn table() -> &'static HashMap<&'static str, (Option<&'static str>, &'static str)> {
    static TABLE: OnceLock<HashMap<&'static str, (Option<&'static str>, &'static str)>> =
        OnceLock::new();
    TABLE.get_or_init(|| {
        MORA_LIST
            .iter()
            .map(|&(text, consonant, vowel)| {
                let consonant = (!consonant.is_empty()).then_some(consonant);
                (text, (consonant, vowel))
            })
            .collect()
    })
}

/// Look up a katakana mora. Returns `(consonant, vowel)`.
pub fn lookup(text: &str) -> Option<(Option<&'static str>, &'static str)> {
    table().get(text).copied()
}

/// Longest mora at the start of `text`, returning the matched text as well.
pub fn longest_prefix(text: &str) -> Option<(&str, Option<&'static str>, &'static str)> {
    let mut ends = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(1)
        .chain(std::iter::once(text.len()));
    let one = ends.next()?;
    let two = ends.next();
    two.into_iter()
        .chain(std::iter::once(one))
        .find_map(|end| lookup(&text[..end]).map(|(c, v)| (&text[..end], c, v)))
}

pub fn is_voiceless_consonant(consonant: &str) -> bool {
    VOICELESS_CONSONANTS.contains(&consonant)
}

/// Fold hiragana into katakana; other characters pass through.
pub fn to_katakana(ch: char) -> char {
    match ch {
        '\u{3041}'..='\u{3096}' => char::from_u32(ch as u32 + 0x60).unwrap_or(ch),
        _ => ch,
    }
}

pub fn is_katakana(ch: char) -> bool {
    matches!(ch, '\u{30A1}'..='\u{30F4}' | 'ー')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_basic_and_compound_moras() {
        assert_eq!(lookup("テ"), Some((Some("t"), "e")));
        assert_eq!(lookup("キャ"), Some((Some("ky"), "a")));
        assert_eq!(lookup("ン"), Some((None, "N")));
        assert_eq!(lookup("ッ"), Some((None, "cl")));
    }

    #[test]
    fn prefers_two_character_moras() {
        let (text, consonant, vowel) = longest_prefix("ショウ").unwrap();
        assert_eq!((text, consonant, vowel), ("ショ", Some("sh"), "o"));
    }

    #[test]
    fn falls_back_to_single_character() {
        let (text, _, vowel) = longest_prefix("シア").unwrap();
        assert_eq!((text, vowel), ("シ", "i"));
    }

    #[test]
    fn folds_hiragana() {
        let s: String = "です".chars().map(to_katakana).collect();
        assert_eq!(s, "デス");
    }
}

//! Phoneme inventory shared by cores.

/// All phonemes a core understands, in model index order.
pub const PHONEMES: &[&str] = &[
    "pau", "A", "E", "I", "N", "O", "U", "a", "b", "by", "ch", "cl", "d", "dy", "e", "f", "g",
    "gw", "gy", "h", "hy", "i", "j", "k", "kw", "ky", "m", "my", "n", "ny", "o", "p", "py", "r",
    "ry", "s", "sh", "t", "ts", "ty", "u", "v", "w", "y", "z",
];

pub const PHONEME_COUNT: usize = PHONEMES.len();

/// Index of `phoneme` in [`PHONEMES`]. Unknown phonemes map to `pau`.
pub fn phoneme_id(phoneme: &str) -> usize {
    PHONEMES.iter().position(|p| *p == phoneme).unwrap_or(0)
}

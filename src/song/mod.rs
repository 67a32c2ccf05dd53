//! Score-to-singing pipeline.
//!
//! ```text
//! Score ──analyze──▶ NotePhonemes ──predict──▶ FrameAudioQuery ──synthesize──▶ Waveform
//!                      (per note)     (core)     (per frame)         (core)
//! ```
//!
//! Note lengths are hard: the consonant of a note is sung over the tail of
//! the previous note, so every note onset stays where the score puts it.

pub mod score;

use std::sync::Arc;

pub use score::{FrameAudioQuery, FramePhoneme, Note, NotePhonemes, Score, SingFrames};

use crate::audio::post_process;
use crate::cancel::CancelToken;
use crate::cores::{CoreManager, StyleId, StyleKind};
use crate::error::{Error, Result};
use crate::prosody::mora::PAUSE_VOWEL;
use crate::prosody::mora_list::{longest_prefix, to_katakana};
use crate::Waveform;

/// Largest distance of a predicted f0 from its note, in semitones.
pub const MAX_F0_DEVIATION_SEMITONES: f32 = 1.0;

const MAX_KEY: u8 = 127;

/// Sings scores with the sing styles of the loaded cores.
#[derive(Debug, Clone)]
pub struct SongEngine {
    cores: Arc<CoreManager>,
}

impl SongEngine {
    pub fn new(cores: Arc<CoreManager>) -> Self {
        Self { cores }
    }

    /// Validate `score` and split every note into its phonemes.
    pub fn analyze(&self, score: &Score) -> Result<Vec<NotePhonemes>> {
        analyze_score(score)
    }

    /// Predict frame-level phonemes, f0 and volume for `score`.
    pub fn predict(&self, score: &Score, style_id: StyleId) -> Result<FrameAudioQuery> {
        let notes = analyze_score(score)?;
        let sample_rate = self.cores.sample_rate(style_id)?;

        let consonant_lengths = self.cores.with_style(style_id, StyleKind::Sing, |core, index| {
            core.predict_sing_consonant_lengths(&notes, index)
        })?;
        if consonant_lengths.len() != notes.len() {
            return Err(self.bad_output(
                style_id,
                format!(
                    "{} consonant lengths for {} notes",
                    consonant_lengths.len(),
                    notes.len()
                ),
            ));
        }

        let phonemes = align_phonemes(&notes, &consonant_lengths);
        let frames = frame_inputs(&notes, &phonemes);

        let (f0, volume) = self.cores.with_style(style_id, StyleKind::Sing, |core, index| {
            core.predict_sing_f0_volume(&frames, index)
        })?;
        if f0.len() != frames.keys.len() || volume.len() != frames.keys.len() {
            return Err(self.bad_output(
                style_id,
                format!(
                    "{} f0 and {} volume values for {} frames",
                    f0.len(),
                    volume.len(),
                    frames.keys.len()
                ),
            ));
        }

        let f0 = clamp_f0(&f0, &frames.keys);
        let volume: Vec<f32> = frames
            .keys
            .iter()
            .zip(volume)
            .map(|(key, v)| if key.is_some() { v.max(0.0) } else { 0.0 })
            .collect();

        self.assemble(phonemes, f0, volume, sample_rate)
    }

    /// Wrap predicted frames into a query with default scalars: unit volume,
    /// no key shift, mono at `sample_rate`.
    pub fn assemble(
        &self,
        phonemes: Vec<FramePhoneme>,
        f0: Vec<f32>,
        volume: Vec<f32>,
        sample_rate: u32,
    ) -> Result<FrameAudioQuery> {
        let query = FrameAudioQuery {
            f0,
            volume,
            phonemes,
            volume_scale: 1.0,
            key_shift: 0,
            output_sampling_rate: sample_rate,
            output_stereo: false,
        };
        validate_frame_query(&query)?;
        Ok(query)
    }

    /// Render a frame query; `key_shift` transposes the f0 track first.
    pub fn synthesize(&self, query: &FrameAudioQuery, style_id: StyleId) -> Result<Waveform> {
        validate_frame_query(query)?;
        let shifted = apply_key_shift(query);
        let sample_rate = self.cores.sample_rate(style_id)?;
        let samples = self.cores.with_style(style_id, StyleKind::Sing, |core, index| {
            core.synthesize_frames(&shifted, index)
        })?;
        post_process(
            samples,
            sample_rate,
            query.volume_scale,
            query.output_sampling_rate,
            query.output_stereo,
        )
    }

    /// Predict and synthesize in one go, checking `cancel` between stages.
    pub fn sing(&self, score: &Score, style_id: StyleId, cancel: &CancelToken) -> Result<Waveform> {
        cancel.check()?;
        let query = self.predict(score, style_id)?;
        cancel.check()?;
        self.synthesize(&query, style_id)
    }

    fn bad_output(&self, style_id: StyleId, reason: String) -> Error {
        match self.cores.resolve(style_id) {
            Ok(binding) => Error::unavailable(&binding.version, reason),
            Err(e) => e,
        }
    }
}

/// Check a score and split its notes into consonant and vowel.
pub fn analyze_score(score: &Score) -> Result<Vec<NotePhonemes>> {
    let invalid = |index: usize, reason: &str| Error::InvalidScore {
        index,
        reason: reason.to_string(),
    };

    match score.notes.first() {
        None => return Err(invalid(0, "score has no notes")),
        Some(first) if !first.is_rest() => {
            return Err(invalid(0, "score must start with a rest"));
        }
        Some(_) => {}
    }

    score
        .notes
        .iter()
        .enumerate()
        .map(|(index, note)| {
            if note.frame_length == 0 {
                return Err(invalid(index, "frame length must be positive"));
            }
            match note.key {
                None if note.lyric.is_empty() => Ok(NotePhonemes {
                    note_id: note.id.clone(),
                    key: None,
                    frame_length: note.frame_length,
                    consonant: None,
                    vowel: PAUSE_VOWEL.to_string(),
                }),
                None => Err(invalid(index, "a rest cannot carry a lyric")),
                Some(key) if key > MAX_KEY => Err(invalid(index, "key must be within 0..=127")),
                Some(_) if note.lyric.is_empty() => Err(invalid(index, "sung note has no lyric")),
                Some(key) => {
                    let lyric: String = note.lyric.chars().map(to_katakana).collect();
                    match longest_prefix(&lyric) {
                        Some((matched, consonant, vowel)) if matched.len() == lyric.len() => {
                            Ok(NotePhonemes {
                                note_id: note.id.clone(),
                                key: Some(key),
                                frame_length: note.frame_length,
                                consonant: consonant.map(str::to_string),
                                vowel: vowel.to_string(),
                            })
                        }
                        _ => Err(invalid(index, "lyric must be exactly one mora")),
                    }
                }
            }
        })
        .collect()
}

/// Lay phonemes on the frame grid, moving each consonant into the tail of
/// the previous note. A consonant takes at most half of that note.
fn align_phonemes(notes: &[NotePhonemes], consonant_lengths: &[u32]) -> Vec<FramePhoneme> {
    let borrowed: Vec<u32> = notes
        .iter()
        .enumerate()
        .map(|(i, note)| match (i, &note.consonant) {
            (0, _) | (_, None) => 0,
            (i, Some(_)) => consonant_lengths[i].min(notes[i - 1].frame_length / 2),
        })
        .collect();

    let mut phonemes = Vec::with_capacity(notes.len() * 2);
    for (i, note) in notes.iter().enumerate() {
        if let Some(consonant) = &note.consonant {
            if borrowed[i] > 0 {
                phonemes.push(FramePhoneme {
                    phoneme: consonant.clone(),
                    frame_length: borrowed[i],
                    note_id: note.note_id.clone(),
                });
            }
        }
        let next_borrow = borrowed.get(i + 1).copied().unwrap_or(0);
        phonemes.push(FramePhoneme {
            phoneme: note.vowel.clone(),
            frame_length: note.frame_length - next_borrow,
            note_id: note.note_id.clone(),
        });
    }
    phonemes
}

/// Per-frame phoneme names and keys. Each phoneme carries the key of the
/// note it belongs to.
fn frame_inputs(notes: &[NotePhonemes], phonemes: &[FramePhoneme]) -> SingFrames {
    let mut frames = SingFrames::default();
    let mut note_index = 0usize;
    for phoneme in phonemes {
        // A note's consonant precedes its vowel; the vowel ends the note.
        let note = notes.get(note_index);
        let key = note.and_then(|n| n.key);
        for _ in 0..phoneme.frame_length {
            frames.phonemes.push(phoneme.phoneme.clone());
            frames.keys.push(key);
        }
        if note.is_some_and(|n| n.vowel == phoneme.phoneme) {
            note_index += 1;
        }
    }
    frames
}

/// Keep every voiced frame within [`MAX_F0_DEVIATION_SEMITONES`] of its note.
fn clamp_f0(f0: &[f32], keys: &[Option<u8>]) -> Vec<f32> {
    let ratio = 2f32.powf(MAX_F0_DEVIATION_SEMITONES / 12.0);
    f0.iter()
        .zip(keys)
        .map(|(&hz, key)| match key {
            Some(key) if hz > 0.0 => {
                let center = score::key_to_hz(*key);
                hz.clamp(center / ratio, center * ratio)
            }
            _ => 0.0,
        })
        .collect()
}

/// Transpose the f0 track by `key_shift` semitones and reset the shift.
pub fn apply_key_shift(query: &FrameAudioQuery) -> FrameAudioQuery {
    let mut shifted = query.clone();
    if query.key_shift != 0 {
        let factor = 2f32.powf(query.key_shift as f32 / 12.0);
        for hz in &mut shifted.f0 {
            *hz *= factor;
        }
    }
    shifted.key_shift = 0;
    shifted
}

fn validate_frame_query(query: &FrameAudioQuery) -> Result<()> {
    let phoneme_frames: usize = query.phonemes.iter().map(|p| p.frame_length as usize).sum();
    if query.f0.len() != query.volume.len() || query.f0.len() != phoneme_frames {
        return Err(Error::InvalidScore {
            index: 0,
            reason: format!(
                "frame query has {} f0, {} volume and {} phoneme frames",
                query.f0.len(),
                query.volume.len(),
                phoneme_frames
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cores::CoreRegistry;
    use crate::engines::mock::{MockCore, MOCK_SING_STYLE_ID, MOCK_STYLE_ID};

    fn engine() -> SongEngine {
        let mut builder = CoreRegistry::builder();
        builder.add("0.1.0".into(), Box::new(MockCore::new())).unwrap();
        SongEngine::new(Arc::new(CoreManager::new(builder.build().0).unwrap()))
    }

    fn score() -> Score {
        Score {
            notes: vec![
                Note::rest(15),
                Note::sung(60, 30, "ド"),
                Note::sung(62, 30, "れ"),
                Note::sung(64, 4, "ミ"),
                Note::rest(10),
            ],
        }
    }

    #[test]
    fn analysis_splits_lyrics() {
        let notes = analyze_score(&score()).unwrap();
        assert_eq!(notes.len(), 5);
        assert_eq!(notes[0].vowel, "pau");
        assert_eq!(notes[1].consonant.as_deref(), Some("d"));
        assert_eq!(notes[1].vowel, "o");
        assert_eq!(notes[2].consonant.as_deref(), Some("r"));
        assert_eq!(notes[2].vowel, "e");
    }

    #[test]
    fn invalid_scores_name_the_note() {
        let cases = vec![
            (Score::default(), 0),
            (Score { notes: vec![Note::sung(60, 10, "ド")] }, 0),
            (Score { notes: vec![Note::rest(10), Note::sung(60, 0, "ド")] }, 1),
            (Score { notes: vec![Note::rest(10), Note::sung(200, 5, "ド")] }, 1),
            (Score { notes: vec![Note::rest(10), Note::sung(60, 5, "ドレ")] }, 1),
            (Score { notes: vec![Note::rest(10), Note::sung(60, 5, "")] }, 1),
        ];
        for (score, expected) in cases {
            match analyze_score(&score) {
                Err(Error::InvalidScore { index, .. }) => assert_eq!(index, expected),
                other => panic!("unexpected result for {score:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn note_lengths_are_preserved() {
        let score = score();
        let query = engine().predict(&score, StyleId(MOCK_SING_STYLE_ID)).unwrap();
        let total: u32 = score.notes.iter().map(|n| n.frame_length).sum();
        assert_eq!(query.frame_count(), total as usize);
        assert_eq!(query.volume.len(), total as usize);
        let phoneme_total: u32 = query.phonemes.iter().map(|p| p.frame_length).sum();
        assert_eq!(phoneme_total, total);

        // Each consonant ends exactly at its note's onset.
        let mut onset = 0u32;
        let mut frame = 0u32;
        let mut onsets = Vec::new();
        for note in &score.notes {
            onsets.push(onset);
            onset += note.frame_length;
        }
        for phoneme in &query.phonemes {
            frame += phoneme.frame_length;
            if matches!(phoneme.phoneme.as_str(), "d" | "r" | "m") {
                assert!(onsets.contains(&frame), "consonant ends at {frame}");
            }
        }
    }

    #[test]
    fn consonant_borrows_at_most_half_of_the_previous_note() {
        let notes = analyze_score(&Score {
            notes: vec![Note::rest(4), Note::sung(60, 6, "ド")],
        })
        .unwrap();
        let phonemes = align_phonemes(&notes, &[0, 10]);
        assert_eq!(phonemes[0].frame_length, 2);
        assert_eq!(phonemes[1].phoneme, "d");
        assert_eq!(phonemes[1].frame_length, 2);
        assert_eq!(phonemes[2].frame_length, 6);
    }

    #[test]
    fn f0_stays_near_the_note() {
        let query = engine()
            .predict(&score(), StyleId(MOCK_SING_STYLE_ID))
            .unwrap();
        let notes = analyze_score(&score()).unwrap();
        let frames = frame_inputs(&notes, &query.phonemes);
        let ratio = 2f32.powf(MAX_F0_DEVIATION_SEMITONES / 12.0);
        for (&hz, key) in query.f0.iter().zip(&frames.keys) {
            match key {
                Some(key) if hz > 0.0 => {
                    let center = score::key_to_hz(*key);
                    assert!(hz >= center / ratio - 1e-3 && hz <= center * ratio + 1e-3);
                }
                Some(_) => {}
                None => assert_eq!(hz, 0.0),
            }
        }
    }

    #[test]
    fn key_shift_is_a_pure_transposition() {
        let query = FrameAudioQuery {
            f0: vec![0.0, 440.0],
            volume: vec![0.0, 1.0],
            phonemes: vec![FramePhoneme {
                phoneme: "a".to_string(),
                frame_length: 2,
                note_id: None,
            }],
            volume_scale: 1.0,
            key_shift: 12,
            output_sampling_rate: 24000,
            output_stereo: false,
        };
        let shifted = apply_key_shift(&query);
        assert_eq!(shifted.f0[0], 0.0);
        assert!((shifted.f0[1] - 880.0).abs() < 1e-3);
        assert_eq!(shifted.key_shift, 0);
        assert_eq!(query.f0[1], 440.0);
    }

    #[test]
    fn assemble_uses_default_scalars() {
        let phonemes = vec![
            FramePhoneme {
                phoneme: "pau".to_string(),
                frame_length: 2,
                note_id: None,
            },
            FramePhoneme {
                phoneme: "a".to_string(),
                frame_length: 3,
                note_id: Some("n1".to_string()),
            },
        ];
        let query = engine()
            .assemble(phonemes.clone(), vec![0.0, 0.0, 261.6, 261.6, 261.6], vec![0.0; 5], 48000)
            .unwrap();
        assert_eq!(query.phonemes, phonemes);
        assert_eq!(query.volume_scale, 1.0);
        assert_eq!(query.key_shift, 0);
        assert_eq!(query.output_sampling_rate, 48000);
        assert!(!query.output_stereo);

        let short = engine().assemble(phonemes, vec![0.0; 4], vec![0.0; 4], 48000);
        assert!(matches!(short, Err(Error::InvalidScore { .. })));
    }

    #[test]
    fn talk_styles_cannot_sing() {
        let result = engine().predict(&score(), StyleId(MOCK_STYLE_ID));
        assert!(matches!(result, Err(Error::StyleKindMismatch { .. })));
    }

    #[test]
    fn sings_a_score() {
        let engine = engine();
        let wave = engine
            .sing(&score(), StyleId(MOCK_SING_STYLE_ID), &CancelToken::new())
            .unwrap();
        let total: u32 = score().notes.iter().map(|n| n.frame_length).sum();
        assert_eq!(wave.samples.len(), total as usize * 256);
        assert!(wave.samples.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn cancelled_request_does_not_run() {
        let token = CancelToken::new();
        token.cancel();
        let result = engine().sing(&score(), StyleId(MOCK_SING_STYLE_ID), &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

use std::path::Path;

use ndarray::{Array1, Array2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::cores::EngineVersion;
use crate::error::{Error, Result};
use crate::prosody::frames::DecoderFeatures;
use crate::prosody::mora::{AccentPhrase, Mora};
use crate::prosody::phoneme::{phoneme_id, PHONEME_COUNT};

/// Shortest phoneme length the duration model may return, in seconds.
const PHONEME_LENGTH_MINIMAL: f32 = 0.01;

const DURATION_MODEL: &str = "predict_duration.onnx";
const INTONATION_MODEL: &str = "predict_intonation.onnx";
const DECODE_MODEL: &str = "decode.onnx";

/// Extract the first output tensor of a session run as a flat f32 vector.
macro_rules! first_output {
    ($outputs:expr, $version:expr) => {{
        let first = $outputs
            .iter()
            .next()
            .ok_or_else(|| Error::unavailable($version, "model produced no output"))?;
        let values = first.1.try_extract_array::<f32>()?;
        values.iter().copied().collect::<Vec<f32>>()
    }};
}

/// The three ONNX sessions of one core.
pub struct OnnxModel {
    version: EngineVersion,
    duration: Session,
    intonation: Session,
    decode: Session,
}

/// One mora-level row of the intonation model input.
struct MoraRow<'a> {
    mora: &'a Mora,
    start_accent: i64,
    end_accent: i64,
    start_phrase: i64,
    end_phrase: i64,
}

impl OnnxModel {
    /// Load the three models from `model_dir`.
    pub fn load(
        model_dir: &Path,
        version: EngineVersion,
        num_threads: Option<usize>,
    ) -> Result<Self> {
        log::info!("Loading ONNX core {} from {}", version, model_dir.display());
        Ok(Self {
            duration: init_session(&model_dir.join(DURATION_MODEL), num_threads)?,
            intonation: init_session(&model_dir.join(INTONATION_MODEL), num_threads)?,
            decode: init_session(&model_dir.join(DECODE_MODEL), num_threads)?,
            version,
        })
    }

    /// Predict phoneme lengths and mora pitch for `phrases`.
    pub fn predict(&mut self, phrases: &[AccentPhrase], style: u32) -> Result<Vec<AccentPhrase>> {
        let mut predicted = phrases.to_vec();
        let speaker = Array1::from_vec(vec![style as i64]);

        // Phoneme ids with a pause on both ends.
        let mut phonemes = vec![phoneme_id("pau") as i64];
        for phrase in &predicted {
            for mora in phrase.all_moras() {
                if let Some(consonant) = &mora.consonant {
                    phonemes.push(phoneme_id(consonant) as i64);
                }
                phonemes.push(phoneme_id(&mora.vowel) as i64);
            }
        }
        phonemes.push(phoneme_id("pau") as i64);
        let phoneme_arr = Array1::from_vec(phonemes);

        let lengths = {
            let outputs = self.duration.run(inputs![
                "phoneme_list" => TensorRef::from_array_view(phoneme_arr.view())?,
                "speaker_id" => TensorRef::from_array_view(speaker.view())?,
            ])?;
            first_output!(outputs, &self.version)
        };
        if lengths.len() != phoneme_arr.len() {
            return Err(Error::unavailable(
                &self.version,
                format!(
                    "duration model returned {} lengths for {} phonemes",
                    lengths.len(),
                    phoneme_arr.len()
                ),
            ));
        }

        let mut cursor = 1usize;
        for phrase in &mut predicted {
            for mora in phrase.all_moras_mut() {
                if mora.consonant.is_some() {
                    mora.consonant_length = Some(lengths[cursor].max(PHONEME_LENGTH_MINIMAL));
                    cursor += 1;
                }
                mora.vowel_length = lengths[cursor].max(PHONEME_LENGTH_MINIMAL);
                cursor += 1;
            }
        }

        let pitches = self.predict_intonation(&predicted, &speaker)?;
        let mut cursor = 1usize;
        for phrase in &mut predicted {
            for mora in phrase.all_moras_mut() {
                mora.pitch = if mora.is_unvoiced() || mora.is_pause() {
                    0.0
                } else {
                    pitches[cursor]
                };
                cursor += 1;
            }
        }

        Ok(predicted)
    }

    fn predict_intonation(
        &mut self,
        phrases: &[AccentPhrase],
        speaker: &Array1<i64>,
    ) -> Result<Vec<f32>> {
        let pau = Mora::pause(0.0);
        let mut rows = vec![MoraRow::silent(&pau)];
        for phrase in phrases {
            let last = phrase.moras.len().saturating_sub(1);
            let accent_start = if phrase.accent == 1 { 0 } else { 1 };
            let accent_end = phrase.accent.saturating_sub(1);
            for (i, mora) in phrase.moras.iter().enumerate() {
                rows.push(MoraRow {
                    mora,
                    start_accent: (i == accent_start) as i64,
                    end_accent: (i == accent_end) as i64,
                    start_phrase: (i == 0) as i64,
                    end_phrase: (i == last) as i64,
                });
            }
            if let Some(pause) = &phrase.pause_mora {
                rows.push(MoraRow::silent(pause));
            }
        }
        rows.push(MoraRow::silent(&pau));

        let column = |f: &dyn Fn(&MoraRow) -> i64| Array1::from_iter(rows.iter().map(f));
        let vowels = column(&|r| phoneme_id(&r.mora.vowel) as i64);
        let consonants = column(&|r| {
            r.mora
                .consonant
                .as_deref()
                .map(|c| phoneme_id(c) as i64)
                .unwrap_or(-1)
        });
        let start_accent = column(&|r| r.start_accent);
        let end_accent = column(&|r| r.end_accent);
        let start_phrase = column(&|r| r.start_phrase);
        let end_phrase = column(&|r| r.end_phrase);
        let length = Array1::from_vec(vec![rows.len() as i64]);

        let pitches = {
            let outputs = self.intonation.run(inputs![
                "length" => TensorRef::from_array_view(length.view())?,
                "vowel_phoneme_list" => TensorRef::from_array_view(vowels.view())?,
                "consonant_phoneme_list" => TensorRef::from_array_view(consonants.view())?,
                "start_accent_list" => TensorRef::from_array_view(start_accent.view())?,
                "end_accent_list" => TensorRef::from_array_view(end_accent.view())?,
                "start_accent_phrase_list" => TensorRef::from_array_view(start_phrase.view())?,
                "end_accent_phrase_list" => TensorRef::from_array_view(end_phrase.view())?,
                "speaker_id" => TensorRef::from_array_view(speaker.view())?,
            ])?;
            first_output!(outputs, &self.version)
        };
        if pitches.len() != rows.len() {
            return Err(Error::unavailable(
                &self.version,
                format!(
                    "intonation model returned {} values for {} moras",
                    pitches.len(),
                    rows.len()
                ),
            ));
        }
        Ok(pitches)
    }

    /// Decode frame-level features into a waveform.
    pub fn decode(&mut self, features: &DecoderFeatures, style: u32) -> Result<Vec<f32>> {
        let frames = features.frame_count();
        if frames == 0 {
            return Ok(Vec::new());
        }

        let f0 = Array2::from_shape_vec((frames, 1), features.f0.clone())?;
        let mut phoneme = Array2::<f32>::zeros((frames, PHONEME_COUNT));
        for (row, name) in features.phoneme_per_frame().enumerate() {
            phoneme[[row, phoneme_id(name)]] = 1.0;
        }
        let speaker = Array1::from_vec(vec![style as i64]);

        let outputs = self.decode.run(inputs![
            "f0" => TensorRef::from_array_view(f0.view())?,
            "phoneme" => TensorRef::from_array_view(phoneme.view())?,
            "speaker_id" => TensorRef::from_array_view(speaker.view())?,
        ])?;
        Ok(first_output!(outputs, &self.version))
    }
}

impl<'a> MoraRow<'a> {
    fn silent(mora: &'a Mora) -> Self {
        Self {
            mora,
            start_accent: 0,
            end_accent: 0,
            start_phrase: 0,
            end_phrase: 0,
        }
    }
}

/// Initialize an ONNX session for one of the core's models.
fn init_session(onnx_path: &Path, num_threads: Option<usize>) -> Result<Session> {
    if !onnx_path.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("model file not found at {}", onnx_path.display()),
        )));
    }
    let providers = vec![CPUExecutionProvider::default().build()];

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(providers)?;

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(onnx_path)?)
}

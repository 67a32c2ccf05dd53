//! Text-to-speech pipeline.
//!
//! ```text
//! text ──analyze──▶ AccentPhrase[] ──predict_prosody──▶ AccentPhrase[] (timed)
//!                                                          │
//!                                   assemble_query + overrides
//!                                                          ▼
//!                         Waveform ◀──synthesize── SynthesisQuery
//! ```
//!
//! Every stage resolves its style afresh and holds a core lock only for the
//! duration of its own native call.

pub mod analyzer;
pub mod user_dict;

use std::sync::Arc;

pub use analyzer::analyze;
pub use user_dict::{UserDictWord, UserDictionary};

use crate::audio::post_process;
use crate::cancel::CancelToken;
use crate::cores::{CoreManager, StyleId, StyleKind};
use crate::error::{Error, Result};
use crate::mutation::{apply_overrides, QueryOverrides};
use crate::preset::Preset;
use crate::prosody::{parse_kana, AccentPhrase, SynthesisOptions, SynthesisQuery};
use crate::Waveform;

/// Which fields [`TtsEngine::update_mora`] takes from a fresh prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoraUpdate {
    Pitch,
    Length,
    All,
}

/// Per-request inputs of the one-call entry points.
#[derive(Debug, Clone, Default)]
pub struct TextRequest {
    pub dictionary: Option<Arc<UserDictionary>>,
    pub preset: Option<Preset>,
    pub overrides: QueryOverrides,
    pub options: SynthesisOptions,
    pub cancel: CancelToken,
}

/// Runs the talk pipeline against the shared cores.
#[derive(Debug, Clone)]
pub struct TtsEngine {
    cores: Arc<CoreManager>,
}

impl TtsEngine {
    pub fn new(cores: Arc<CoreManager>) -> Self {
        Self { cores }
    }

    pub fn cores(&self) -> &Arc<CoreManager> {
        &self.cores
    }

    /// Text to unpredicted accent phrases.
    pub fn analyze(&self, text: &str, dictionary: Option<&UserDictionary>) -> Vec<AccentPhrase> {
        analyzer::analyze(text, dictionary)
    }

    /// Fill lengths and pitch of every mora with the style's core.
    pub fn predict_prosody(
        &self,
        phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        if phrases.is_empty() {
            self.cores.resolve_kind(style_id, StyleKind::Talk)?;
            return Ok(Vec::new());
        }
        let predicted = self.cores.with_style(style_id, StyleKind::Talk, |core, index| {
            core.predict(phrases, index)
        })?;
        if !same_layout(phrases, &predicted) {
            let binding = self.cores.resolve(style_id)?;
            return Err(Error::unavailable(
                &binding.version,
                "prediction changed the phrase structure",
            ));
        }
        Ok(predicted)
    }

    /// Re-predict only the fields selected by `update`.
    pub fn update_mora(
        &self,
        phrases: &[AccentPhrase],
        style_id: StyleId,
        update: MoraUpdate,
    ) -> Result<Vec<AccentPhrase>> {
        let predicted = self.predict_prosody(phrases, style_id)?;
        if update == MoraUpdate::All {
            return Ok(predicted);
        }
        let mut merged = phrases.to_vec();
        for (target, source) in merged.iter_mut().zip(&predicted) {
            for (mora, fresh) in target.all_moras_mut().zip(source.all_moras()) {
                match update {
                    MoraUpdate::Pitch => mora.pitch = fresh.pitch,
                    MoraUpdate::Length => {
                        mora.consonant_length = fresh.consonant_length;
                        mora.vowel_length = fresh.vowel_length;
                    }
                    MoraUpdate::All => {}
                }
            }
        }
        Ok(merged)
    }

    /// Wrap predicted phrases into a query with default or preset scalars.
    pub fn assemble_query(
        &self,
        phrases: Vec<AccentPhrase>,
        style_id: StyleId,
        preset: Option<&Preset>,
    ) -> Result<SynthesisQuery> {
        let sample_rate = self.cores.sample_rate(style_id)?;
        let query = SynthesisQuery::new(phrases, sample_rate);
        Ok(match preset {
            Some(preset) => preset.apply_to(&query),
            None => query,
        })
    }

    /// Render `query` and convert it to the requested output format.
    pub fn synthesize(
        &self,
        query: &SynthesisQuery,
        style_id: StyleId,
        options: &SynthesisOptions,
    ) -> Result<Waveform> {
        let sample_rate = self.cores.sample_rate(style_id)?;
        let samples = self.cores.with_style(style_id, StyleKind::Talk, |core, index| {
            core.synthesize(query, index, options)
        })?;
        post_process(
            samples,
            sample_rate,
            query.volume_scale,
            query.output_sampling_rate,
            query.output_stereo,
        )
    }

    /// Analyze, predict and assemble a query for `text`.
    pub fn create_query(
        &self,
        text: &str,
        style_id: StyleId,
        request: &TextRequest,
    ) -> Result<SynthesisQuery> {
        request.cancel.check()?;
        let phrases = self.analyze(text, request.dictionary.as_deref());
        request.cancel.check()?;
        let phrases = self.predict_prosody(&phrases, style_id)?;
        request.cancel.check()?;
        let query = self.assemble_query(phrases, style_id, request.preset.as_ref())?;
        Ok(apply_overrides(&query, &request.overrides))
    }

    /// Build a query from kana notation instead of text.
    pub fn create_query_from_kana(
        &self,
        kana: &str,
        style_id: StyleId,
        preset: Option<&Preset>,
    ) -> Result<SynthesisQuery> {
        let phrases = parse_kana(kana)?;
        let phrases = self.predict_prosody(&phrases, style_id)?;
        let mut query = self.assemble_query(phrases, style_id, preset)?;
        query.kana = Some(kana.to_string());
        Ok(query)
    }

    /// Text straight to audio.
    pub fn speak(&self, text: &str, style_id: StyleId, request: &TextRequest) -> Result<Waveform> {
        let query = self.create_query(text, style_id, request)?;
        request.cancel.check()?;
        self.synthesize(&query, style_id, &request.options)
    }
}

fn same_layout(a: &[AccentPhrase], b: &[AccentPhrase]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.moras.len() == y.moras.len() && x.pause_mora.is_some() == y.pause_mora.is_some()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cores::CoreRegistry;
    use crate::engines::mock::{MockCore, MOCK_SING_STYLE_ID, MOCK_STYLE_ID};
    use crate::mutation::QueryOverridesBuilder;

    fn engine() -> TtsEngine {
        let mut builder = CoreRegistry::builder();
        builder.add("0.1.0".into(), Box::new(MockCore::new())).unwrap();
        TtsEngine::new(Arc::new(CoreManager::new(builder.build().0).unwrap()))
    }

    const STYLE: StyleId = StyleId(MOCK_STYLE_ID);

    #[test]
    fn prediction_fills_lengths_and_pitch() {
        let tts = engine();
        let phrases = tts.analyze("テストです", None);
        let predicted = tts.predict_prosody(&phrases, STYLE).unwrap();
        assert_eq!(predicted.len(), phrases.len());
        assert!(predicted[0].moras.iter().all(|m| m.vowel_length > 0.0));
        assert!(predicted[0].moras[0].pitch > 0.0);
        assert_eq!(predicted, tts.predict_prosody(&phrases, STYLE).unwrap());
    }

    #[test]
    fn empty_input_still_resolves_the_style() {
        let tts = engine();
        assert!(tts.predict_prosody(&[], STYLE).unwrap().is_empty());
        assert!(matches!(
            tts.predict_prosody(&[], StyleId(4242)),
            Err(Error::UnknownStyle(_))
        ));
    }

    #[test]
    fn update_pitch_keeps_lengths() {
        let tts = engine();
        let mut phrases = tts
            .predict_prosody(&tts.analyze("アメ", None), STYLE)
            .unwrap();
        phrases[0].moras[0].vowel_length = 0.5;
        phrases[0].moras[0].pitch = 1.0;
        let updated = tts.update_mora(&phrases, STYLE, MoraUpdate::Pitch).unwrap();
        assert_eq!(updated[0].moras[0].vowel_length, 0.5);
        assert!(updated[0].moras[0].pitch > 1.0);

        let updated = tts.update_mora(&phrases, STYLE, MoraUpdate::Length).unwrap();
        assert_ne!(updated[0].moras[0].vowel_length, 0.5);
        assert_eq!(updated[0].moras[0].pitch, 1.0);
    }

    #[test]
    fn query_uses_core_rate_and_kana() {
        let tts = engine();
        let query = tts
            .create_query("テストです", STYLE, &TextRequest::default())
            .unwrap();
        assert_eq!(query.output_sampling_rate, 24000);
        assert_eq!(query.kana.as_deref(), Some("テ'_ストデ_ス"));
    }

    #[test]
    fn kana_query_matches_text_query() {
        let tts = engine();
        let from_text = tts
            .create_query("テストです", STYLE, &TextRequest::default())
            .unwrap();
        let from_kana = tts
            .create_query_from_kana("テ'_ストデ_ス", STYLE, None)
            .unwrap();
        assert_eq!(from_text, from_kana);
    }

    #[test]
    fn flat_dictionary_word_survives_the_kana_round_trip() {
        let tts = engine();
        let dictionary = UserDictionary::new(vec![UserDictWord {
            surface: "東京".to_string(),
            pronunciation: "トウキョウ".to_string(),
            accent_type: 0,
            priority: 5,
        }])
        .unwrap();
        let request = TextRequest {
            dictionary: Some(Arc::new(dictionary)),
            ..Default::default()
        };
        let from_text = tts.create_query("東京です", STYLE, &request).unwrap();
        let kana = from_text.kana.clone().unwrap();
        assert!(kana.starts_with("トウキョウ'/"), "{kana}");

        let from_kana = tts.create_query_from_kana(&kana, STYLE, None).unwrap();
        assert_eq!(from_kana, from_text);
    }

    #[test]
    fn overrides_are_applied_to_the_query() {
        let tts = engine();
        let request = TextRequest {
            overrides: QueryOverridesBuilder::default()
                .speed_factor(2.0)
                .build()
                .unwrap(),
            ..Default::default()
        };
        let query = tts.create_query("アメ", STYLE, &request).unwrap();
        assert_eq!(query.speed_scale, 2.0);
    }

    #[test]
    fn output_format_follows_the_query() {
        let tts = engine();
        let mut query = tts
            .create_query("アメ", STYLE, &TextRequest::default())
            .unwrap();
        let mono = tts
            .synthesize(&query, STYLE, &SynthesisOptions::default())
            .unwrap();
        query.output_sampling_rate = 48000;
        query.output_stereo = true;
        let stereo = tts
            .synthesize(&query, STYLE, &SynthesisOptions::default())
            .unwrap();
        assert_eq!(stereo.sample_rate, 48000);
        assert_eq!(stereo.channels, 2);
        assert_eq!(stereo.samples.len(), mono.samples.len() * 4);
    }

    #[test]
    fn sing_styles_cannot_talk() {
        let result = engine().speak("アメ", StyleId(MOCK_SING_STYLE_ID), &TextRequest::default());
        assert!(matches!(result, Err(Error::StyleKindMismatch { .. })));
    }

    #[test]
    fn cancellation_stops_before_the_next_stage() {
        let request = TextRequest::default();
        request.cancel.cancel();
        assert!(matches!(
            engine().speak("アメ", STYLE, &request),
            Err(Error::Cancelled)
        ));
    }
}

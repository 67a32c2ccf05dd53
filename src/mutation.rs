//! Pure overrides over a [`SynthesisQuery`].
//!
//! An override never adds, drops or reorders phrases and moras; it only
//! rescales or shifts values already in the plan.
//!
//! ```
//! use vox_core::mutation::{apply_overrides, QueryOverridesBuilder};
//! use vox_core::SynthesisQuery;
//!
//! let query = SynthesisQuery::new(vec![], 24000);
//! let overrides = QueryOverridesBuilder::default()
//!     .speed_factor(1.5)
//!     .build()
//!     .unwrap();
//! let faster = apply_overrides(&query, &overrides);
//! assert_eq!(faster.speed_scale, 1.5);
//! ```

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::prosody::SynthesisQuery;

/// Caller-supplied adjustments applied on top of a query.
///
/// Factors multiply, offsets add, absolute values replace. The default is
/// the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct QueryOverrides {
    pub speed_factor: f32,
    /// Added to `pitchScale`.
    pub pitch_offset: f32,
    pub intonation_factor: f32,
    pub volume_factor: f32,
    pub pause_length_scale_factor: f32,
    #[builder(setter(strip_option))]
    pub pre_phoneme_length: Option<f32>,
    #[builder(setter(strip_option))]
    pub post_phoneme_length: Option<f32>,
    /// Added to the pitch of every voiced mora.
    pub mora_pitch_offset: f32,
    /// Multiplies every consonant and vowel length.
    pub mora_length_factor: f32,
}

impl Default for QueryOverrides {
    fn default() -> Self {
        Self::identity()
    }
}

impl QueryOverrides {
    /// Overrides that leave every query unchanged.
    pub fn identity() -> Self {
        Self {
            speed_factor: 1.0,
            pitch_offset: 0.0,
            intonation_factor: 1.0,
            volume_factor: 1.0,
            pause_length_scale_factor: 1.0,
            pre_phoneme_length: None,
            post_phoneme_length: None,
            mora_pitch_offset: 0.0,
            mora_length_factor: 1.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

/// Return a copy of `query` with `overrides` applied.
pub fn apply_overrides(query: &SynthesisQuery, overrides: &QueryOverrides) -> SynthesisQuery {
    let mut out = query.clone();
    if overrides.is_identity() {
        return out;
    }

    out.speed_scale *= overrides.speed_factor;
    out.pitch_scale += overrides.pitch_offset;
    out.intonation_scale *= overrides.intonation_factor;
    out.volume_scale *= overrides.volume_factor;
    out.pause_length_scale *= overrides.pause_length_scale_factor;
    if let Some(length) = overrides.pre_phoneme_length {
        out.pre_phoneme_length = length;
    }
    if let Some(length) = overrides.post_phoneme_length {
        out.post_phoneme_length = length;
    }

    let shift_pitch = overrides.mora_pitch_offset != 0.0;
    let scale_length = overrides.mora_length_factor != 1.0;
    if shift_pitch || scale_length {
        for mora in out.accent_phrases.iter_mut().flat_map(|p| p.all_moras_mut()) {
            if shift_pitch && mora.pitch > 0.0 {
                mora.pitch += overrides.mora_pitch_offset;
            }
            if scale_length {
                if let Some(length) = mora.consonant_length.as_mut() {
                    *length *= overrides.mora_length_factor;
                }
                mora.vowel_length *= overrides.mora_length_factor;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prosody::{AccentPhrase, Mora};

    fn query() -> SynthesisQuery {
        let mut voiced = Mora::unpredicted("カ", Some("k"), "a");
        voiced.consonant_length = Some(0.05);
        voiced.vowel_length = 0.1;
        voiced.pitch = 5.5;
        let mut unvoiced = Mora::unpredicted("ス", Some("s"), "U");
        unvoiced.consonant_length = Some(0.06);
        unvoiced.vowel_length = 0.08;
        SynthesisQuery::new(
            vec![AccentPhrase {
                moras: vec![voiced, unvoiced],
                accent: 1,
                pause_mora: Some(Mora::pause(0.3)),
                is_interrogative: false,
            }],
            24000,
        )
    }

    #[test]
    fn identity_is_a_no_op() {
        let q = query();
        assert_eq!(apply_overrides(&q, &QueryOverrides::identity()), q);
        assert_eq!(apply_overrides(&q, &QueryOverrides::default()), q);
        let built = QueryOverridesBuilder::default().build().unwrap();
        assert!(built.is_identity());
    }

    #[test]
    fn global_scalars() {
        let overrides = QueryOverridesBuilder::default()
            .speed_factor(2.0)
            .pitch_offset(0.1)
            .volume_factor(0.5)
            .pre_phoneme_length(0.3)
            .build()
            .unwrap();
        let q = apply_overrides(&query(), &overrides);
        assert_eq!(q.speed_scale, 2.0);
        assert!((q.pitch_scale - 0.1).abs() < 1e-6);
        assert_eq!(q.volume_scale, 0.5);
        assert_eq!(q.pre_phoneme_length, 0.3);
        assert_eq!(q.post_phoneme_length, 0.1);
    }

    #[test]
    fn mora_pitch_offset_skips_unvoiced() {
        let overrides = QueryOverridesBuilder::default()
            .mora_pitch_offset(0.2)
            .build()
            .unwrap();
        let q = apply_overrides(&query(), &overrides);
        let moras = &q.accent_phrases[0].moras;
        assert!((moras[0].pitch - 5.7).abs() < 1e-6);
        assert_eq!(moras[1].pitch, 0.0);
    }

    #[test]
    fn structure_is_preserved() {
        let overrides = QueryOverridesBuilder::default()
            .mora_length_factor(1.5)
            .intonation_factor(0.0)
            .build()
            .unwrap();
        let original = query();
        let q = apply_overrides(&original, &overrides);
        assert_eq!(q.accent_phrases.len(), original.accent_phrases.len());
        for (a, b) in q.accent_phrases.iter().zip(&original.accent_phrases) {
            let texts = |p: &AccentPhrase| p.all_moras().map(|m| m.text.clone()).collect::<Vec<_>>();
            assert_eq!(texts(a), texts(b));
            assert_eq!(a.pause_mora.is_some(), b.pause_mora.is_some());
        }
        assert!((q.accent_phrases[0].moras[0].vowel_length - 0.15).abs() < 1e-6);
    }

    #[test]
    fn mora_overrides_reach_pause_moras() {
        let overrides = QueryOverridesBuilder::default()
            .mora_length_factor(2.0)
            .mora_pitch_offset(0.5)
            .build()
            .unwrap();
        let q = apply_overrides(&query(), &overrides);
        let pause = q.accent_phrases[0].pause_mora.as_ref().unwrap();
        assert!((pause.vowel_length - 0.6).abs() < 1e-6);
        assert_eq!(pause.pitch, 0.0);
    }
}

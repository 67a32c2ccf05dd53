//! Prosody plan: moras, accent phrases, synthesis queries and their
//! frame-level rendering.

pub mod frames;
pub mod kana;
pub mod mora;
pub mod mora_list;
pub mod phoneme;
pub mod query;

pub use frames::{DecoderFeatures, FramedPhoneme, SynthesisOptions, FRAME_HOP};
pub use kana::{create_kana, parse_kana};
pub use mora::{AccentPhrase, Mora};
pub use query::SynthesisQuery;

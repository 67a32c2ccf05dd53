mod common;

use std::sync::Arc;

use vox_core::cores::{BuiltinLoader, CoreManager, CoreRegistry, DiscoveryParamsBuilder};
use vox_core::engines::mock::{MockCore, MOCK_STYLE_ID};
use vox_core::mutation::{apply_overrides, QueryOverrides};
use vox_core::tts::{TextRequest, TtsEngine};
use vox_core::{Error, StyleId, SynthesisOptions};

fn tts() -> TtsEngine {
    let params = DiscoveryParamsBuilder::default()
        .enable_mock(true)
        .build()
        .unwrap();
    let (cores, _) = CoreManager::discover(&[], &params, &BuiltinLoader).unwrap();
    TtsEngine::new(Arc::new(cores))
}

const STYLE: StyleId = StyleId(MOCK_STYLE_ID);

#[test]
fn identity_override_is_a_no_op() {
    let tts = tts();
    for text in ["", "テストです", "アメガ、フッテ イマス？", "ABC123"] {
        let query = tts.create_query(text, STYLE, &TextRequest::default()).unwrap();
        assert_eq!(apply_overrides(&query, &QueryOverrides::identity()), query);
    }
}

#[test]
fn empty_text_is_silence_only() {
    let tts = tts();
    let query = tts.create_query("", STYLE, &TextRequest::default()).unwrap();
    assert!(query.accent_phrases.is_empty());

    let wave = tts
        .synthesize(&query, STYLE, &SynthesisOptions::default())
        .unwrap();
    // 0.1 s of silence on each side, rounded to 9 frames of 256 samples.
    assert_eq!(wave.sample_rate, 24000);
    assert_eq!(wave.channels, 1);
    assert_eq!(wave.samples.len(), 2 * 9 * 256);
    assert!(wave.samples.iter().all(|&s| s == 0.0));
}

#[test]
fn synthesis_is_deterministic() {
    let tts = tts();
    let first = tts
        .speak("テストです", STYLE, &TextRequest::default())
        .unwrap()
        .to_wav_bytes()
        .unwrap();
    for _ in 0..3 {
        let again = tts
            .speak("テストです", STYLE, &TextRequest::default())
            .unwrap()
            .to_wav_bytes()
            .unwrap();
        assert_eq!(first, again);
    }

    // A separately built engine of the same build gives the same bytes.
    let other = self::tts()
        .speak("テストです", STYLE, &TextRequest::default())
        .unwrap()
        .to_wav_bytes()
        .unwrap();
    assert_eq!(first, other);
}

#[test]
fn resolution_is_idempotent() {
    let tts = tts();
    let cores = tts.cores();
    for binding in cores.router().bindings() {
        let a = cores.resolve(binding.style_id).unwrap();
        let b = cores.resolve(binding.style_id).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, binding);
    }
}

#[test]
fn errors_name_the_style() {
    let tts = tts();
    match tts.speak("テスト", StyleId(777), &TextRequest::default()) {
        Err(Error::UnknownStyle(id)) => assert_eq!(id, StyleId(777)),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unloaded_core_is_unavailable() {
    let mut core = MockCore::new();
    vox_core::CoreEngine::unload(&mut core);
    let mut builder = CoreRegistry::builder();
    assert!(builder.add("0.1.0".into(), Box::new(core)).is_err());
}

#[test]
fn wav_file_round_trip() {
    let tts = tts();
    let wave = tts
        .speak("テストです", STYLE, &TextRequest::default())
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.wav");
    wave.write_wav(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), wave.to_wav_bytes().unwrap());
}

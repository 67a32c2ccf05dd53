use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use vox_core::cores::{BuiltinLoader, CoreManager, DiscoveryParamsBuilder};
use vox_core::song::{Note, Score, SongEngine};
use vox_core::tts::{TextRequest, TtsEngine};
use vox_core::{CancelToken, StyleId};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let params = DiscoveryParamsBuilder::default().enable_mock(true).build()?;
    let load_start = Instant::now();
    let (cores, failures) = CoreManager::discover(&[PathBuf::from("cores")], &params, &BuiltinLoader)?;
    println!("Cores loaded in {:.2?}", load_start.elapsed());
    for failure in &failures {
        println!("Skipped: {failure}");
    }

    for speaker in cores.speakers() {
        let styles: Vec<String> = speaker
            .styles
            .iter()
            .map(|s| format!("{} ({}, {})", s.name, s.style_id, s.kind))
            .collect();
        println!("{}: {}", speaker.name, styles.join(", "));
    }

    let cores = Arc::new(cores);
    let tts = TtsEngine::new(cores.clone());
    let style = StyleId(0);

    let text = "こんにちは、テストです。";
    let query = tts.create_query(text, style, &TextRequest::default())?;
    println!("Kana: {}", query.kana.as_deref().unwrap_or_default());

    let synth_start = Instant::now();
    let wave = tts.synthesize(&query, style, &Default::default())?;
    let synth_dur = synth_start.elapsed();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        wave.duration_secs(),
        synth_dur,
        wave.duration_secs() / synth_dur.as_secs_f64()
    );
    wave.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");

    let song = SongEngine::new(cores);
    let score = Score {
        notes: vec![
            Note::rest(15),
            Note::sung(60, 45, "ド"),
            Note::sung(62, 45, "レ"),
            Note::sung(64, 45, "ミ"),
            Note::rest(15),
        ],
    };
    match song.sing(&score, StyleId(6000), &CancelToken::new()) {
        Ok(wave) => {
            wave.write_wav(&PathBuf::from("song.wav"))?;
            println!("Saved to song.wav");
        }
        Err(e) => println!("Singing skipped: {e}"),
    }

    Ok(())
}

//! Post-processing shared by the talk and song pipelines.

use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::error::Result;
use crate::Waveform;

/// Input frames fed to the resampler per call.
const CHUNK_SIZE: usize = 1024;
const SINC_LEN: usize = 256;

/// Turn raw core output into the requested output format.
///
/// Scales the volume, resamples from `source_rate` to `output_rate` and
/// duplicates every sample into two channels when `stereo` is set.
pub fn post_process(
    samples: Vec<f32>,
    source_rate: u32,
    volume_scale: f32,
    output_rate: u32,
    stereo: bool,
) -> Result<Waveform> {
    let mut samples = samples;
    if volume_scale != 1.0 {
        for sample in &mut samples {
            *sample *= volume_scale;
        }
    }

    let output_rate = if output_rate == 0 { source_rate } else { output_rate };
    if output_rate != source_rate {
        samples = resample(&samples, source_rate, output_rate)?;
    }

    let channels = if stereo {
        samples = samples.iter().flat_map(|&s| [s, s]).collect();
        2
    } else {
        1
    };

    Ok(Waveform {
        samples,
        sample_rate: output_rate,
        channels,
    })
}

/// Resample mono audio with sinc interpolation.
///
/// The resampler delay is trimmed, so the output is aligned with the input
/// and holds `round(len * to / from)` samples.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if samples.is_empty() || from == to || from == 0 || to == 0 {
        return Ok(samples.to_vec());
    }
    let target = (samples.len() as f64 * to as f64 / from as f64).round() as usize;

    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: calculate_cutoff(SINC_LEN, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window,
    };
    let mut resampler = SincFixedIn::<f32>::new(to as f64 / from as f64, 1.0, params, CHUNK_SIZE, 1)?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(target + delay);
    let mut chunks = samples.chunks_exact(CHUNK_SIZE);
    for chunk in &mut chunks {
        let out = resampler.process(&[chunk][..], None)?;
        output.extend_from_slice(&out[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let out = resampler.process_partial(Some(&[rest][..]), None)?;
        output.extend_from_slice(&out[0]);
    }
    // Flush the delay line with silence.
    while output.len() < target + delay {
        let out = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(target, 0.0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, hz: f32, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (std::f32::consts::TAU * hz * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn resampled_length_follows_the_rate_ratio() {
        let samples = sine(4608, 440.0, 24000);
        assert_eq!(resample(&samples, 24000, 48000).unwrap().len(), 9216);
        assert_eq!(resample(&samples, 24000, 16000).unwrap().len(), 3072);
        assert_eq!(resample(&samples, 24000, 44100).unwrap().len(), 8467);
        assert_eq!(resample(&samples[..100], 24000, 48000).unwrap().len(), 200);
    }

    #[test]
    fn resampling_is_deterministic() {
        let samples = sine(5000, 300.0, 24000);
        let first = resample(&samples, 24000, 44100).unwrap();
        assert_eq!(first, resample(&samples, 24000, 44100).unwrap());
    }

    #[test]
    fn delay_is_trimmed() {
        // A 440 Hz tone keeps its phase: sample i at 48 kHz matches sample
        // i / 2 at 24 kHz.
        let samples = sine(4800, 440.0, 24000);
        let out = resample(&samples, 24000, 48000).unwrap();
        for i in (1000..8000).step_by(250) {
            let expected = samples[i / 2];
            assert!((out[i] - expected).abs() < 0.05, "sample {i}: {} vs {expected}", out[i]);
        }
    }

    #[test]
    fn volume_and_stereo() {
        let wave = post_process(vec![0.5, -0.5], 24000, 2.0, 24000, true).unwrap();
        assert_eq!(wave.channels, 2);
        assert_eq!(wave.sample_rate, 24000);
        assert_eq!(wave.samples, vec![1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn zero_output_rate_keeps_the_source_rate() {
        let wave = post_process(vec![0.1; 10], 24000, 1.0, 0, false).unwrap();
        assert_eq!(wave.sample_rate, 24000);
        assert_eq!(wave.samples.len(), 10);
    }
}

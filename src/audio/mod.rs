//! Audio validation and normalization.
//!
//! Converts raw uploads into the canonical, provider-agnostic form: mono
//! 16-bit PCM WAV at a fixed sample rate, high-pass filtered to remove
//! low-frequency noise, and peak-normalized. WAV input is decoded with hound
//! and processed in process; other containers are first transcoded by
//! ffmpeg. Loudness is measured before amplitude normalization so silence
//! detection reflects the uploaded signal, not the normalized one.

pub mod ffmpeg;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::config::AudioPipelineConfig;
use crate::error::{AudioError, ProcessingError};
use crate::storage::TempStore;

/// Headroom target for peak normalization (-1 dBFS).
const PEAK_TARGET: f32 = 0.891;

/// Floor used when the signal has no energy at all.
const SILENT_DBFS: f32 = -100.0;

/// Canonical audio produced by [`AudioNormalizer::normalize`].
///
/// Owns its backing temp file; the file is removed when this value drops,
/// which ties the artifact's lifetime to the processing operation.
#[derive(Debug)]
pub struct NormalizedAudio {
    file: NamedTempFile,
    duration: Duration,
    rms_dbfs: f32,
}

impl NormalizedAudio {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// RMS loudness of the signal before amplitude normalization.
    pub fn rms_dbfs(&self) -> f32 {
        self.rms_dbfs
    }
}

/// Validates and normalizes raw audio into canonical form.
pub struct AudioNormalizer {
    sample_rate: u32,
    highpass_hz: f32,
    silence_floor_dbfs: f32,
}

impl AudioNormalizer {
    pub fn new(config: &AudioPipelineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            highpass_hz: config.highpass_hz,
            silence_floor_dbfs: config.silence_floor_dbfs,
        }
    }

    /// Normalizes an uploaded file: decode, downmix to mono, resample to the
    /// canonical rate, high-pass filter, peak-normalize, write as 16-bit WAV
    /// into a scoped temp file.
    ///
    /// Non-WAV containers are transcoded to WAV by ffmpeg first.
    ///
    /// # Errors
    /// - [`AudioError::Unreadable`] if the input cannot be decoded
    /// - I/O errors if scoped output files cannot be created
    pub fn normalize(
        &self,
        temp: &TempStore,
        input: &Path,
        name_prefix: &str,
    ) -> Result<NormalizedAudio, ProcessingError> {
        let is_wav = input
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        // Hold the transcoded intermediate (if any) until decoding is done.
        let _transcoded;
        let decode_path = if is_wav {
            input
        } else {
            let wav = temp.create_scoped(&format!("{name_prefix}-dec-"), ".wav")?;
            ffmpeg::transcode_to_wav(input, wav.path(), self.sample_rate)
                .map_err(ProcessingError::Audio)?;
            _transcoded = wav;
            _transcoded.path()
        };

        let (samples, source_rate) = decode_wav(decode_path)?;

        let mut samples = resample(&samples, source_rate, self.sample_rate);
        high_pass(&mut samples, self.sample_rate, self.highpass_hz);

        let rms_dbfs = rms_dbfs(&samples);
        peak_normalize(&mut samples);

        let duration = Duration::from_secs_f64(samples.len() as f64 / self.sample_rate as f64);

        let file = temp.create_scoped(&format!("{name_prefix}-norm-"), ".wav")?;
        write_wav(file.path(), &samples, self.sample_rate)?;

        tracing::debug!(
            duration_secs = duration.as_secs_f64(),
            rms_dbfs,
            "Audio normalized to canonical form"
        );

        Ok(NormalizedAudio {
            file,
            duration,
            rms_dbfs,
        })
    }

    /// Rejects audio below the configured loudness floor. Runs before any
    /// network call so silent uploads never reach a provider.
    ///
    /// # Errors
    /// - [`AudioError::TooSilent`] if the signal is below the floor
    pub fn validate(&self, audio: &NormalizedAudio) -> Result<(), AudioError> {
        if audio.rms_dbfs < self.silence_floor_dbfs {
            return Err(AudioError::TooSilent {
                rms_dbfs: audio.rms_dbfs,
                floor_dbfs: self.silence_floor_dbfs,
            });
        }
        Ok(())
    }

    /// Reads a WAV file's duration from its header without decoding the
    /// sample stream.
    ///
    /// # Errors
    /// - [`AudioError::Unreadable`] if the file is not a readable WAV
    pub fn measure_duration(path: &Path) -> Result<Duration, AudioError> {
        let reader = WavReader::open(path)
            .map_err(|e| AudioError::Unreadable(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();
        let frames = reader.duration();
        Ok(Duration::from_secs_f64(
            frames as f64 / spec.sample_rate as f64,
        ))
    }
}

/// Decodes a WAV file to mono f32 samples in [-1, 1] plus its sample rate.
fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader = WavReader::open(path)
        .map_err(|e| AudioError::Unreadable(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();

    let unreadable = |e: hound::Error| AudioError::Unreadable(format!("{}: {e}", path.display()));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(unreadable)?,
        SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(unreadable)?
        }
    };

    Ok((downmix(&interleaved, spec.channels as usize), spec.sample_rate))
}

/// Converts interleaved multi-channel samples to mono by averaging channels.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;

    (0..out_len)
        .map(|n| {
            let pos = n as f64 * ratio;
            let i = pos as usize;
            let frac = (pos - i as f64) as f32;
            let a = samples[i];
            let b = samples.get(i + 1).copied().unwrap_or(a);
            a + (b - a) * frac
        })
        .collect()
}

/// One-pole high-pass filter, in place.
fn high_pass(samples: &mut [f32], sample_rate: u32, cutoff_hz: f32) {
    if samples.is_empty() || cutoff_hz <= 0.0 {
        return;
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut prev_input = samples[0];
    let mut prev_output = samples[0];
    samples[0] = 0.0;
    for sample in samples.iter_mut().skip(1) {
        let input = *sample;
        let output = alpha * (prev_output + input - prev_input);
        prev_input = input;
        prev_output = output;
        *sample = output;
    }
}

/// Scales the signal so its peak sits at [`PEAK_TARGET`].
fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let gain = PEAK_TARGET / peak;
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
    }
}

/// RMS level in dBFS.
fn rms_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENT_DBFS;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = mean_square.sqrt();
    if rms <= 0.0 {
        SILENT_DBFS
    } else {
        (20.0 * rms.log10()).max(SILENT_DBFS)
    }
}

/// Writes mono f32 samples as 16-bit PCM WAV.
fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), ProcessingError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(())
}

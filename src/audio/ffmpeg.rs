//! FFmpeg discovery and container transcoding.
//!
//! Non-WAV uploads (mp3, m4a, mp4, ...) are transcoded to PCM WAV by an
//! ffmpeg subprocess before the in-process normalization pipeline runs.
//! Standard installation locations are checked before falling back to a
//! PATH search, so the binary is found even under a minimal PATH.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::AudioError;

/// Locates the ffmpeg binary on the system.
///
/// # Errors
/// - If ffmpeg is not installed in a known location or on PATH
pub fn find_ffmpeg() -> Result<PathBuf> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/snap/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    } else {
        vec![]
    };

    for path in candidates {
        if path.exists() {
            tracing::debug!("Found ffmpeg at: {}", path.display());
            return Ok(path);
        }
    }

    find_in_path("ffmpeg")
}

/// Searches for a binary in the system PATH using `which`/`where`.
fn find_in_path(binary_name: &str) -> Result<PathBuf> {
    let search_cmd = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    let output = Command::new(search_cmd)
        .arg(binary_name)
        .output()
        .map_err(|e| anyhow!("Failed to search PATH for {binary_name}: {e}"))?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        let path = PathBuf::from(path_str.trim());
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }

    Err(anyhow!(
        "ffmpeg not found; install it to accept non-WAV uploads"
    ))
}

/// Transcodes any supported container to mono 16-bit PCM WAV at the given
/// sample rate.
///
/// # Errors
/// - [`AudioError::Unreadable`] if ffmpeg is missing or cannot decode the
///   input
pub fn transcode_to_wav(input: &Path, output: &Path, sample_rate: u32) -> Result<(), AudioError> {
    let ffmpeg_path =
        find_ffmpeg().map_err(|e| AudioError::Unreadable(format!("ffmpeg unavailable: {e}")))?;

    let result = Command::new(&ffmpeg_path)
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(input)
        .arg("-acodec")
        .arg("pcm_s16le")
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg(sample_rate.to_string())
        .arg("-y")
        .arg(output)
        .output()
        .map_err(|e| AudioError::Unreadable(format!("failed to run ffmpeg: {e}")))?;

    if result.status.success() {
        tracing::debug!("Transcoded {} to canonical WAV", input.display());
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&result.stderr);
        Err(AudioError::Unreadable(format!(
            "ffmpeg could not decode input: {}",
            stderr.trim()
        )))
    }
}

//! Stream metadata read from the transcoder's diagnostic output (similar to ffprobe).
//!
//! The program is run with only `-i <path>`. It prints one line per stream,
//! e.g.
//!
//! ```text
//!   Stream #0:0: Audio: pcm_s16le ([1][0][0][0] / 0x0001), 8000 Hz, mono, s16, 128 kb/s
//!   Stream #0:0(und): Video: h264 (High), yuv420p(progressive), 64x32, 49 kb/s, 12 fps, 12 tbr
//! ```
//!
//! and exits non-zero because no output was requested.

use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

use crate::command;
use crate::config::{Config, config};
use crate::error::{Error, Result};

static FREQUENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ([0-9.]*) Hz,").expect("valid frequency pattern"));
static FPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ([0-9.]*) fps,").expect("valid fps pattern"));
static SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ([0-9]+)x([0-9]+)(,| )").expect("valid size pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    /// Sample rate in Hz.
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl VideoInfo {
    /// Bytes in one rgb24 frame.
    pub fn frame_len(&self) -> usize {
        3 * self.width as usize * self.height as usize
    }
}

impl fmt::Display for AudioInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.frequency)
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} @ {} fps", self.width, self.height, self.fps)
    }
}

pub fn audio_info(path: impl AsRef<Path>) -> anyhow::Result<AudioInfo> {
    audio_info_with(config(), path)
}

pub fn audio_info_with(config: &Config, path: impl AsRef<Path>) -> anyhow::Result<AudioInfo> {
    probe_audio(config, path.as_ref()).context("get audio info")
}

pub fn video_info(path: impl AsRef<Path>) -> anyhow::Result<VideoInfo> {
    video_info_with(config(), path)
}

pub fn video_info_with(config: &Config, path: impl AsRef<Path>) -> anyhow::Result<VideoInfo> {
    probe_video(config, path.as_ref()).context("get video info")
}

pub(crate) fn probe_audio(config: &Config, path: &Path) -> Result<AudioInfo> {
    parse_audio_info(&probe_output(config, path)?)
}

pub(crate) fn probe_video(config: &Config, path: &Path) -> Result<VideoInfo> {
    parse_video_info(&probe_output(config, path)?)
}

/// True if `config.program` can be started and answers `-version`.
pub fn is_available(config: &Config) -> bool {
    Command::new(&config.program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Runs the inspect-only invocation and returns stdout and stderr combined.
fn probe_output(config: &Config, path: &Path) -> Result<String> {
    // Checked up front so a missing file is reported as such, not as a parse failure.
    if !path.try_exists().unwrap_or(false) {
        return Err(Error::NotFound {
            path: path.to_path_buf(),
        });
    }
    let output = Command::new(&config.program)
        .args(command::probe(path))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::process_start(config.program_name(), e))?;
    // A non-zero exit is expected here: nothing was transcoded.
    log::debug!("probe {} exited with {}", path.display(), output.status);
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Extracts [`AudioInfo`] from the first `Audio:` stream line that names a rate.
/// Rates on later audio streams are ignored.
pub fn parse_audio_info(text: &str) -> Result<AudioInfo> {
    let raw = stream_lines(text, "Audio:")
        .find_map(|line| FREQUENCY.captures(line))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| Error::parse("frequency", "not found in output"))?;
    let frequency: u32 = raw
        .parse()
        .map_err(|e| Error::parse("frequency", format!("{:?}: {}", raw, e)))?;
    if frequency == 0 {
        return Err(Error::parse("frequency", "must be positive"));
    }
    Ok(AudioInfo { frequency })
}

/// Extracts [`VideoInfo`] from the first `Video:` stream line carrying each field.
///
/// With several video streams the first one describes the result, so a
/// cover-art stream listed after the main track does not override it.
pub fn parse_video_info(text: &str) -> Result<VideoInfo> {
    let fps_raw = stream_lines(text, "Video:")
        .find_map(|line| FPS.captures(line))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| Error::parse("fps", "not found in output"))?;
    let fps: f64 = fps_raw
        .parse()
        .map_err(|e| Error::parse("fps", format!("{:?}: {}", fps_raw, e)))?;
    if !(fps.is_finite() && fps > 0.0) {
        return Err(Error::parse("fps", format!("{} is not positive", fps)));
    }

    let (width, height) = stream_lines(text, "Video:")
        .find_map(|line| SIZE.captures(line))
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .ok_or_else(|| Error::parse("dimensions", "not found in output"))?;
    let dimension = |raw: &str| -> Result<u32> {
        match raw.parse::<u32>() {
            Ok(0) => Err(Error::parse("dimensions", "must be positive")),
            Ok(n) => Ok(n),
            Err(e) => Err(Error::parse("dimensions", format!("{:?}: {}", raw, e))),
        }
    };

    Ok(VideoInfo {
        width: dimension(&width)?,
        height: dimension(&height)?,
        fps,
    })
}

fn stream_lines<'a>(text: &'a str, marker: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    text.lines().filter(move |line| line.contains(marker))
}

//! Command lines for the external transcoder.
//!
//! Every invocation has the shape
//! `<program> [global options] -i <input> [filters] <output>`; the channel's
//! resource locator stands in for whichever side carries raw data.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use crate::encoder::VideoEncodeSettings;

/// Pads odd frame sizes up to even, which yuv420p requires.
const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

#[derive(Default)]
struct Args(Vec<OsString>);

impl Args {
    fn transcode() -> Self {
        Self::default().flag("-hide_banner").flag("-nostdin")
    }

    fn flag(mut self, flag: &str) -> Self {
        self.0.push(flag.into());
        self
    }

    fn opt(mut self, name: &str, value: impl AsRef<OsStr>) -> Self {
        self.0.push(name.into());
        self.0.push(value.as_ref().to_os_string());
        self
    }

    fn opt_if<T: AsRef<OsStr>>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.opt(name, value),
            None => self,
        }
    }

    fn arg(mut self, value: impl AsRef<OsStr>) -> Self {
        self.0.push(value.as_ref().to_os_string());
        self
    }

    fn build(self) -> Vec<OsString> {
        self.0
    }
}

/// Inspect-only run; the program prints stream info and exits non-zero.
pub(crate) fn probe(input: &Path) -> Vec<OsString> {
    Args::default().opt("-i", input).build()
}

pub(crate) fn decode_audio(input: &Path, frequency: u32, locator: &str) -> Vec<OsString> {
    Args::transcode()
        .opt("-i", input)
        .opt("-f", "s16le")
        .opt("-ar", frequency.to_string())
        .opt("-ac", "1")
        .arg(locator)
        .build()
}

pub(crate) fn decode_video(input: &Path, resample_fps: Option<f64>, locator: &str) -> Vec<OsString> {
    Args::transcode()
        .opt("-i", input)
        .opt("-f", "rawvideo")
        .opt("-pix_fmt", "rgb24")
        .opt_if("-filter:v", resample_fps.map(|fps| format!("fps=fps={:.6}", fps)))
        .arg(locator)
        .build()
}

/// Mono s16le in; container and codec follow the output extension.
pub(crate) fn encode_audio(output: &Path, frequency: u32, locator: &str) -> Vec<OsString> {
    Args::transcode()
        .flag("-y")
        .opt("-ar", frequency.to_string())
        .opt("-ac", "1")
        .opt("-f", "s16le")
        // Small probe so the encoder starts on the first bytes of a live feed.
        .opt("-probesize", "32")
        .opt("-thread_queue_size", "60")
        .opt("-i", locator)
        .arg(output)
        .build()
}

pub(crate) fn encode_video(
    output: &Path,
    width: u32,
    height: u32,
    fps: f64,
    audio: Option<&Path>,
    settings: &VideoEncodeSettings,
    locator: &str,
) -> Vec<OsString> {
    let mut args = Args::transcode()
        .flag("-y")
        .opt("-r", format!("{:.6}", fps))
        .opt("-s", format!("{}x{}", width, height))
        .opt("-pix_fmt", "rgb24")
        .opt("-f", "rawvideo")
        .opt("-probesize", "32")
        .opt("-thread_queue_size", "10000")
        .opt("-i", locator)
        .opt_if("-i", audio)
        .opt("-c:v", &settings.codec)
        .opt_if("-preset", settings.preset.as_deref())
        .opt_if("-crf", settings.crf.map(|crf| crf.to_string()))
        .opt("-pix_fmt", &settings.pixel_format)
        .opt("-vf", EVEN_PAD_FILTER);
    if audio.is_some() {
        args = args.opt("-map", "0:v:0").opt("-map", "1:a:0");
    }
    args.arg(output).build()
}

//! Readers that pull decoded samples or frames out of a transcoder child.

use std::path::Path;
use std::process::ExitStatus;

use anyhow::Context;
use image::RgbaImage;

use crate::channel::{Direction, read_full};
use crate::command;
use crate::config::{Config, config};
use crate::error::{Error, PartialRead, Result};
use crate::frame;
use crate::metadata::{self, AudioInfo, VideoInfo};
use crate::process::{self, ExitPolicy, Session};
use crate::sample::{self, SAMPLE_BYTES};

/// Decodes any audio file to mono samples in [-1, 1].
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// let mut reader = ffmpeg_pipe::AudioReader::open("speech.wav")?;
/// let mut buf = vec![0.0; 4096];
/// loop {
///     match reader.read_samples(&mut buf) {
///         Ok(n) => println!("{} samples", n),
///         Err(e) if e.is_end_of_stream() => break,
///         Err(e) => return Err(e.into()),
///     }
/// }
/// reader.close()?;
/// # Ok(())
/// # }
/// ```
pub struct AudioReader {
    session: Session,
    info: AudioInfo,
    buf: Vec<u8>,
}

impl AudioReader {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::open_with(config(), path, None)
    }

    /// Opens `path` with the samples resampled to `frequency` Hz.
    pub fn resampled(path: impl AsRef<Path>, frequency: u32) -> anyhow::Result<Self> {
        if frequency == 0 {
            anyhow::bail!("read audio: frequency must be positive");
        }
        Self::open_with(config(), path, Some(frequency))
    }

    /// `frequency`, when positive, overrides the file's own rate.
    pub fn open_with(
        config: &Config,
        path: impl AsRef<Path>,
        frequency: Option<u32>,
    ) -> anyhow::Result<Self> {
        Self::start(config, path.as_ref(), frequency).context("read audio")
    }

    fn start(config: &Config, path: &Path, frequency: Option<u32>) -> Result<Self> {
        let mut info = metadata::probe_audio(config, path)?;
        if let Some(frequency) = frequency.filter(|&f| f > 0) {
            info.frequency = frequency;
        }
        let (child, stream) = process::launch(config, Direction::Read, |locator| {
            command::decode_audio(path, info.frequency, locator)
        })?;
        log::debug!("reading {} from {}", info, path.display());
        Ok(Self::new(
            Session::new(child, stream, ExitPolicy::Lenient),
            info,
        ))
    }

    pub(crate) fn new(session: Session, info: AudioInfo) -> Self {
        Self {
            session,
            info,
            buf: Vec::new(),
        }
    }

    /// Rate of the delivered samples, after any resampling.
    pub fn info(&self) -> AudioInfo {
        self.info
    }

    /// Fills `out` with the next samples, blocking until it is full or the
    /// stream ends.
    ///
    /// A short read is an error that still reports how many samples landed at
    /// the front of `out`: [`Error::EndOfStream`] when the data ended on a
    /// sample boundary, [`Error::UnexpectedEndOfStream`] when a half sample was
    /// left over.
    pub fn read_samples(&mut self, out: &mut [f64]) -> Result<usize, PartialRead> {
        let want = out.len() * SAMPLE_BYTES;
        self.buf.resize(want, 0);
        let stream = self
            .session
            .stream()
            .map_err(|error| PartialRead { samples: 0, error })?;
        let (filled, error) = match read_full(stream, &mut self.buf) {
            Ok(n) if n == want => (n, None),
            Ok(n) if n % SAMPLE_BYTES == 0 => (n, Some(Error::EndOfStream)),
            Ok(n) => (n, Some(Error::UnexpectedEndOfStream)),
            Err((n, e)) => (n, Some(Error::from(e))),
        };
        let samples = sample::decode(&self.buf[..filled], out);
        match error {
            None => Ok(samples),
            Some(error) => Err(PartialRead { samples, error }),
        }
    }

    /// Reads until the end of the stream.
    pub fn read_to_end(&mut self) -> Result<Vec<f64>> {
        let mut samples = Vec::new();
        let mut chunk = vec![0.0; self.info.frequency as usize];
        loop {
            match self.read_samples(&mut chunk) {
                Ok(n) => samples.extend_from_slice(&chunk[..n]),
                Err(partial) => {
                    samples.extend_from_slice(&chunk[..partial.samples]);
                    if partial.is_end_of_stream() {
                        return Ok(samples);
                    }
                    return Err(partial.error);
                }
            }
        }
    }

    /// Stops the decoder and reaps it. The decoder's exit status is not an
    /// error here, since hanging up early makes it fail; see
    /// [`AudioReader::exit_status`].
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.session.exit_status()
    }
}

/// Decodes a video file to opaque RGBA frames.
pub struct VideoReader {
    session: Session,
    info: VideoInfo,
    buf: Vec<u8>,
}

impl VideoReader {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::open_with(config(), path, None)
    }

    /// Opens `path` with frames dropped or duplicated to reach `fps`.
    pub fn resampled(path: impl AsRef<Path>, fps: f64) -> anyhow::Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            anyhow::bail!("read video: fps {} must be positive", fps);
        }
        Self::open_with(config(), path, Some(fps))
    }

    /// `fps`, when positive, overrides the file's own rate.
    pub fn open_with(
        config: &Config,
        path: impl AsRef<Path>,
        fps: Option<f64>,
    ) -> anyhow::Result<Self> {
        Self::start(config, path.as_ref(), fps).context("read video")
    }

    fn start(config: &Config, path: &Path, fps: Option<f64>) -> Result<Self> {
        let mut info = metadata::probe_video(config, path)?;
        let resample = fps.filter(|f| f.is_finite() && *f > 0.0);
        if let Some(fps) = resample {
            info.fps = fps;
        }
        let (child, stream) = process::launch(config, Direction::Read, |locator| {
            command::decode_video(path, resample, locator)
        })?;
        log::debug!("reading {} from {}", info, path.display());
        Ok(Self::new(
            Session::new(child, stream, ExitPolicy::Lenient),
            info,
        ))
    }

    pub(crate) fn new(session: Session, info: VideoInfo) -> Self {
        Self {
            session,
            info,
            buf: Vec::new(),
        }
    }

    /// Size and rate of the delivered frames.
    pub fn info(&self) -> VideoInfo {
        self.info
    }

    /// Blocks until the next whole frame is available.
    pub fn read_frame(&mut self) -> Result<RgbaImage> {
        let len = self.info.frame_len();
        self.buf.resize(len, 0);
        let stream = self.session.stream()?;
        match read_full(stream, &mut self.buf) {
            Ok(n) if n == len => frame::decode(&self.buf, self.info.width, self.info.height),
            Ok(0) => Err(Error::EndOfStream),
            Ok(_) => Err(Error::UnexpectedEndOfStream),
            Err((_, e)) => Err(e.into()),
        }
    }

    /// Iterates over the remaining frames, stopping quietly at the end of the
    /// stream.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            reader: self,
            done: false,
        }
    }

    /// See [`AudioReader::close`].
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.session.exit_status()
    }
}

pub struct Frames<'a> {
    reader: &'a mut VideoReader,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<RgbaImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_frame() {
            Err(e) if e.is_end_of_stream() => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
            frame => Some(frame),
        }
    }
}

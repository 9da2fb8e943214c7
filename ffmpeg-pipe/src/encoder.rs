//! Writers that pipe raw samples or frames into a transcoder producing a file.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use image::{GenericImageView, Pixel};
use serde::{Deserialize, Serialize};

use crate::channel::Direction;
use crate::command;
use crate::config::{Config, config};
use crate::error::{Error, Result};
use crate::frame;
use crate::process::{self, ExitPolicy, Session};
use crate::sample;

/// Output codec options for [`VideoWriter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoEncodeSettings {
    pub codec: String,
    pub preset: Option<String>,
    pub crf: Option<u32>,
    pub pixel_format: String,
}

impl Default for VideoEncodeSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: Some("fast".to_string()),
            crf: Some(18),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

/// Encodes mono samples into an audio file whose format follows the extension.
///
/// Nothing is guaranteed to be on disk until [`AudioWriter::close`] returns
/// `Ok`.
pub struct AudioWriter {
    session: Session,
    frequency: u32,
    buf: Vec<u8>,
}

impl AudioWriter {
    pub fn create(path: impl AsRef<Path>, frequency: u32) -> anyhow::Result<Self> {
        Self::create_with(config(), path, frequency)
    }

    pub fn create_with(
        config: &Config,
        path: impl AsRef<Path>,
        frequency: u32,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if frequency == 0 {
            anyhow::bail!("write audio: frequency must be positive");
        }
        let (child, stream) = process::launch(config, Direction::Write, |locator| {
            command::encode_audio(path, frequency, locator)
        })
        .context("write audio")?;
        log::debug!("writing {} Hz audio to {}", frequency, path.display());
        Ok(Self::new(
            Session::new(child, stream, ExitPolicy::Strict),
            frequency,
        ))
    }

    pub(crate) fn new(session: Session, frequency: u32) -> Self {
        Self {
            session,
            frequency,
            buf: Vec::new(),
        }
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Blocks until every sample has been handed to the child.
    pub fn write_samples(&mut self, samples: &[f64]) -> Result<()> {
        self.buf.clear();
        sample::encode_into(samples, &mut self.buf);
        self.session.stream()?.write_all(&self.buf)?;
        Ok(())
    }

    /// Ends the input and waits for the file to be finalized.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}

/// Encodes same-sized frames into a video file, optionally muxing the audio
/// track of another file.
pub struct VideoWriter {
    session: Session,
    width: u32,
    height: u32,
    fps: f64,
}

impl VideoWriter {
    pub fn create(path: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> anyhow::Result<Self> {
        Self::create_with(
            config(),
            &VideoEncodeSettings::default(),
            path,
            width,
            height,
            fps,
            None,
        )
    }

    /// Like [`VideoWriter::create`], taking the first audio stream of `audio`.
    pub fn create_with_audio(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        audio: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        Self::create_with(
            config(),
            &VideoEncodeSettings::default(),
            path,
            width,
            height,
            fps,
            Some(audio.as_ref()),
        )
    }

    pub fn create_with(
        config: &Config,
        settings: &VideoEncodeSettings,
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        audio: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if width == 0 || height == 0 {
            anyhow::bail!("write video: size {}x{} must be positive", width, height);
        }
        if !(fps.is_finite() && fps > 0.0) {
            anyhow::bail!("write video: fps {} must be positive", fps);
        }
        Self::start(config, settings, path, width, height, fps, audio).context("write video")
    }

    fn start(
        config: &Config,
        settings: &VideoEncodeSettings,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        audio: Option<&Path>,
    ) -> Result<Self> {
        if let Some(audio) = audio {
            if !audio.try_exists().unwrap_or(false) {
                return Err(Error::NotFound {
                    path: audio.to_path_buf(),
                });
            }
        }
        let (child, stream) = process::launch(config, Direction::Write, |locator| {
            command::encode_video(path, width, height, fps, audio, settings, locator)
        })?;
        log::debug!(
            "writing {}x{} @ {} fps ({}) to {}",
            width,
            height,
            fps,
            settings.codec,
            path.display()
        );
        Ok(Self::new(
            Session::new(child, stream, ExitPolicy::Strict),
            width,
            height,
            fps,
        ))
    }

    pub(crate) fn new(session: Session, width: u32, height: u32, fps: f64) -> Self {
        Self {
            session,
            width,
            height,
            fps,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Writes one frame. An image of the wrong size is rejected before any
    /// byte reaches the child.
    pub fn write_frame<I>(&mut self, image: &I) -> Result<()>
    where
        I: GenericImageView,
        I::Pixel: Pixel<Subpixel = u8>,
    {
        let data = frame::encode(image, self.width, self.height)?;
        self.session.stream()?.write_all(&data)?;
        Ok(())
    }

    /// Ends the input and waits for the file to be finalized.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}

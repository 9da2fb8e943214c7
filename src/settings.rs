use std::path::Path;

use anyhow::Context;
use ffmpeg_pipe::{Config, VideoEncodeSettings};
use serde::Deserialize;

/// Contents of the `--config` file. Missing sections keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ffmpeg: Config,
    pub video: VideoEncodeSettings,
}

impl Settings {
    /// Reads `path` as JSON, or falls back to the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                Self::from_json(&text).with_context(|| format!("parse config {}", path.display()))
            }
            None => Ok(Self {
                ffmpeg: Config::from_env()?,
                video: VideoEncodeSettings::default(),
            }),
        }
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

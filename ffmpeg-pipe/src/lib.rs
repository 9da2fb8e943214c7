//! Streaming audio and video through an external `ffmpeg` process.
//!
//! Readers start a child that decodes a file into raw samples (mono s16le) or
//! frames (rgb24); writers start a child that encodes raw data into a file.
//! Raw data never touches the child's stdio: it travels over a dedicated
//! [`channel`], an inherited pipe on Unix or a loopback socket elsewhere.

pub mod channel;
mod command;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod metadata;
mod process;
pub mod sample;

pub use config::{ChannelKind, Config, config};
pub use decoder::{AudioReader, Frames, VideoReader};
pub use encoder::{AudioWriter, VideoEncodeSettings, VideoWriter};
pub use error::{Error, PartialRead, Result};
pub use metadata::{AudioInfo, VideoInfo, audio_info, video_info};

#[cfg(test)]
#[path = "roundtrip_test.rs"]
mod roundtrip_test;

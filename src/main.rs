use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ffmpeg_pipe::{AudioReader, AudioWriter, VideoReader, VideoWriter, metadata};

mod settings;

use settings::Settings;

/// Samples moved per read/write when resampling.
const CHUNK_SAMPLES: usize = 4096;

/// Decode, inspect and re-encode media through ffmpeg.
#[derive(Parser, Debug)]
#[command(name = "ffpipe", version, about)]
struct Cli {
    /// JSON file with `ffmpeg` and `video` sections. Defaults come from FFPIPE_* variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stream info ffmpeg reports for a file
    Probe {
        file: PathBuf,
        /// Probe the video stream instead of the audio stream
        #[arg(long)]
        video: bool,
    },
    /// Write a video's frames in reverse order
    Reverse {
        input: PathBuf,
        output: PathBuf,
        /// Mux the input's audio track, unreversed, into the output
        #[arg(long)]
        keep_audio: bool,
    },
    /// Convert an audio file to mono at another sample rate
    Resample {
        input: PathBuf,
        output: PathBuf,
        /// Target sample rate in Hz
        #[arg(long)]
        rate: u32,
    },
}

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_pipe", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    if !metadata::is_available(&settings.ffmpeg) {
        anyhow::bail!("{} is not runnable", settings.ffmpeg.program.display());
    }

    match cli.command {
        Command::Probe { file, video } => probe(&settings, &file, video),
        Command::Reverse {
            input,
            output,
            keep_audio,
        } => reverse(&settings, &input, &output, keep_audio),
        Command::Resample {
            input,
            output,
            rate,
        } => resample(&settings, &input, &output, rate),
    }
}

fn probe(settings: &Settings, file: &Path, video: bool) -> anyhow::Result<()> {
    if video {
        println!("{}", metadata::video_info_with(&settings.ffmpeg, file)?);
    } else {
        println!("{}", metadata::audio_info_with(&settings.ffmpeg, file)?);
    }
    Ok(())
}

fn reverse(settings: &Settings, input: &Path, output: &Path, keep_audio: bool) -> anyhow::Result<()> {
    let mut reader = VideoReader::open_with(&settings.ffmpeg, input, None)?;
    let info = reader.info();
    log::info!("reading {} from {}", info, input.display());

    let mut frames = reader
        .frames()
        .collect::<Result<Vec<_>, _>>()
        .context("decode frames")?;
    reader.close()?;
    frames.reverse();

    let audio = if keep_audio && has_audio(settings, input) {
        Some(input)
    } else {
        None
    };
    let mut writer = VideoWriter::create_with(
        &settings.ffmpeg,
        &settings.video,
        output,
        info.width,
        info.height,
        info.fps,
        audio,
    )?;
    for frame in &frames {
        writer.write_frame(frame)?;
    }
    writer.close()?;
    log::info!("wrote {} frames to {}", frames.len(), output.display());
    Ok(())
}

fn has_audio(settings: &Settings, input: &Path) -> bool {
    match metadata::audio_info_with(&settings.ffmpeg, input) {
        Ok(info) => {
            log::info!("keeping {} audio track", info);
            true
        }
        Err(e) => {
            log::warn!("no audio track to keep: {:#}", e);
            false
        }
    }
}

fn resample(settings: &Settings, input: &Path, output: &Path, rate: u32) -> anyhow::Result<()> {
    if rate == 0 {
        anyhow::bail!("--rate must be positive");
    }
    let mut reader = AudioReader::open_with(&settings.ffmpeg, input, Some(rate))?;
    let mut writer = AudioWriter::create_with(&settings.ffmpeg, output, rate)?;

    let mut buf = vec![0.0; CHUNK_SAMPLES];
    let mut total = 0;
    loop {
        match reader.read_samples(&mut buf) {
            Ok(n) => {
                writer.write_samples(&buf[..n])?;
                total += n;
            }
            Err(partial) => {
                writer.write_samples(&buf[..partial.samples])?;
                total += partial.samples;
                if partial.is_end_of_stream() {
                    break;
                }
                return Err(anyhow::Error::new(partial.error).context("decode samples"));
            }
        }
    }
    reader.close()?;
    writer.close()?;
    log::info!("wrote {} samples at {} Hz to {}", total, rate, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_flags() {
        let cli = Cli::try_parse_from(["ffpipe", "reverse", "in.mp4", "out.mp4", "--keep-audio"])
            .unwrap();
        match cli.command {
            Command::Reverse { keep_audio, .. } => assert!(keep_audio),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_config_is_global() {
        let cli = Cli::try_parse_from([
            "ffpipe", "resample", "a.wav", "b.wav", "--rate", "16000", "--config", "c.json",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("c.json")));
        assert!(matches!(cli.command, Command::Resample { rate: 16000, .. }));
    }
}

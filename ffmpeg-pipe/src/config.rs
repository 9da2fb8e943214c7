use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which channel primitive to use between us and the child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Anonymous pipe where the host supports descriptor inheritance, loopback socket elsewhere.
    #[default]
    Auto,
    Pipe,
    Socket,
}

impl ChannelKind {
    /// Resolves `Auto` against the host platform.
    pub fn resolve(self) -> ChannelKind {
        match self {
            ChannelKind::Auto if cfg!(unix) => ChannelKind::Pipe,
            ChannelKind::Auto => ChannelKind::Socket,
            other => other,
        }
    }
}

impl FromStr for ChannelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ChannelKind::Auto),
            "pipe" => Ok(ChannelKind::Pipe),
            "socket" => Ok(ChannelKind::Socket),
            other => Err(anyhow::anyhow!("unknown channel kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transcoder executable, looked up on `PATH` when relative.
    pub program: PathBuf,
    pub channel: ChannelKind,
    /// Bound on the socket channel's accept. Pipes connect immediately.
    pub connect_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            channel: ChannelKind::Auto,
            connect_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Defaults overridden by `FFPIPE_PROGRAM`, `FFPIPE_CHANNEL` and
    /// `FFPIPE_CONNECT_TIMEOUT_MS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(program) = lookup("FFPIPE_PROGRAM") {
            config.program = PathBuf::from(program);
        }
        if let Some(channel) = lookup("FFPIPE_CHANNEL") {
            config.channel = channel.parse()?;
        }
        if let Some(timeout) = lookup("FFPIPE_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("FFPIPE_CONNECT_TIMEOUT_MS {:?}: {}", timeout, e))?;
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Process-wide defaults used by the short-form constructors.
pub fn config() -> &'static Config {
    static CONFIG: LazyLock<Config> = LazyLock::new(|| {
        Config::from_env().unwrap_or_else(|e| {
            log::warn!("ignoring invalid environment config: {:#}", e);
            Config::default()
        })
    });
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_auto_resolves_per_platform() {
        let resolved = ChannelKind::Auto.resolve();
        if cfg!(unix) {
            assert_eq!(resolved, ChannelKind::Pipe);
        } else {
            assert_eq!(resolved, ChannelKind::Socket);
        }
        assert_eq!(ChannelKind::Socket.resolve(), ChannelKind::Socket);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FFPIPE_PROGRAM", "/opt/ffmpeg/bin/ffmpeg"),
            ("FFPIPE_CHANNEL", "Socket"),
            ("FFPIPE_CONNECT_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.program, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.channel, ChannelKind::Socket);
        assert_eq!(config.connect_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(Config::from_lookup(|k| (k == "FFPIPE_CHANNEL").then(|| "fifo".into())).is_err());
        assert!(
            Config::from_lookup(|k| (k == "FFPIPE_CONNECT_TIMEOUT_MS").then(|| "soon".into()))
                .is_err()
        );
    }

    #[test]
    fn test_default_is_ten_second_timeout() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }
}

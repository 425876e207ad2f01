use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Alert channels the dispatcher drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Visual,
    Audio,
    Title,
    Desktop,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Visual => "visual",
            Channel::Audio => "audio",
            Channel::Title => "title",
            Channel::Desktop => "desktop",
        };
        f.write_str(name)
    }
}

/// Failures the monitor reports but never dies from
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The resource never exposed any session rows within the attempt budget
    #[error("no session rows after {attempts} bootstrap attempts")]
    BootstrapTimeout { attempts: u32 },

    /// Fetching or reading the snapshot failed for one cycle
    #[error("snapshot unavailable: {0}")]
    Snapshot(String),

    /// A single alert channel failed; the others still ran
    #[error("{channel} channel failed: {reason}")]
    Channel { channel: Channel, reason: String },

    #[error("no resource url configured (set monitor.url, pass --url, or use --mock)")]
    MissingUrl,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

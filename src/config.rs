use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mime_guess::mime::{self, Mime};
use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_AUDIO_CEILING: NonZeroU64 = non_zero(MIB);
pub const DEFAULT_VIDEO_CEILING: NonZeroU64 = non_zero(6 * MIB);

const fn non_zero(n: u64) -> NonZeroU64 {
    match NonZeroU64::new(n) {
        Some(n) => n,
        None => panic!("ceiling must be non-zero"),
    }
}

/// Per-media-type cap on the bytes served by one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkCeilings {
    pub audio: NonZeroU64,
    pub video: NonZeroU64,
}

impl Default for ChunkCeilings {
    fn default() -> Self {
        ChunkCeilings {
            audio: DEFAULT_AUDIO_CEILING,
            video: DEFAULT_VIDEO_CEILING,
        }
    }
}

impl ChunkCeilings {
    /// The ceiling for `mime`, or `None` when it is not streamed media.
    pub fn for_mime(&self, mime: &Mime) -> Option<NonZeroU64> {
        let top = mime.type_();
        if top == mime::AUDIO {
            Some(self.audio)
        } else if top == mime::VIDEO {
            Some(self.video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory requests are resolved under.
    pub root: PathBuf,
    pub port: u16,
    pub ceilings: ChunkCeilings,
    /// Seconds between memory reports, 0 disables them.
    pub health_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            root: PathBuf::from("static"),
            port: DEFAULT_PORT,
            ceilings: ChunkCeilings::default(),
            health_interval_secs: DEFAULT_HEALTH_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_ceilings() {
        let ceilings = ChunkCeilings::default();
        assert_eq!(MIB, ceilings.audio.get());
        assert_eq!(6 * MIB, ceilings.video.get());
    }

    #[test]
    fn test_ceiling_by_mime() {
        let ceilings = ChunkCeilings::default();
        assert_eq!(Some(ceilings.audio), ceilings.for_mime(&"audio/mpeg".parse().unwrap()));
        assert_eq!(Some(ceilings.video), ceilings.for_mime(&"video/mp4".parse().unwrap()));
        assert_eq!(None, ceilings.for_mime(&mime::TEXT_HTML));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 8080, "ceilings": {{"audio": 4096}}}}"#).unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(8080, config.port);
        assert_eq!(4096, config.ceilings.audio.get());
        assert_eq!(6 * MIB, config.ceilings.video.get());
        assert_eq!(PathBuf::from("static"), config.root);
    }

    #[test]
    fn test_load_rejects_zero_ceiling() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ceilings": {{"video": 0}}}}"#).unwrap();
        assert!(ServerConfig::load(file.path()).is_err());
    }
}

use std::num::NonZeroU64;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use media_range::config::ServerConfig;
use media_range::server;

#[derive(Parser)]
#[command(name = "media-range")]
#[command(about = "Serve audio and video as bounded HTTP range responses")]
#[command(version)]
struct Cli {
    #[arg(short = 'c', long = "config")]
    #[arg(help = "JSON config file; flags and environment override its values")]
    config: Option<PathBuf>,

    #[arg(long = "root", env = "MEDIA_ROOT")]
    #[arg(help = "Directory to serve [default: static]")]
    root: Option<PathBuf>,

    #[arg(short = 'p', long = "port", env = "PORT")]
    #[arg(help = "Port to listen on [default: 3000]")]
    port: Option<u16>,

    #[arg(long = "audio-chunk-ceiling", env = "AUDIO_CHUNK_CEILING")]
    #[arg(help = "Most bytes per audio response [default: 1048576]")]
    audio_chunk_ceiling: Option<NonZeroU64>,

    #[arg(long = "video-chunk-ceiling", env = "VIDEO_CHUNK_CEILING")]
    #[arg(help = "Most bytes per video response [default: 6291456]")]
    video_chunk_ceiling: Option<NonZeroU64>,

    #[arg(long = "health-interval", env = "HEALTH_INTERVAL_SECS")]
    #[arg(help = "Seconds between memory usage reports, 0 disables [default: 2]")]
    health_interval: Option<u64>,

    #[arg(long = "log-level", default_value = "info")]
    #[arg(help = "Log level (trace, debug, info, warn, error)")]
    log_level: String,

    #[arg(long = "log-format", default_value = "console")]
    #[arg(help = "Log format (json, console)")]
    log_format: String,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(audio) = self.audio_chunk_ceiling {
            config.ceilings.audio = audio;
        }
        if let Some(video) = self.video_chunk_ceiling {
            config.ceilings.video = video;
        }
        if let Some(interval) = self.health_interval {
            config.health_interval_secs = interval;
        }
        Ok(config)
    }
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        "json" => builder.json().init(),
        "console" => builder.init(),
        other => bail!("unknown log format `{other}`, expected json or console"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format)?;

    let config = cli.server_config()?;
    server::serve(config).await
}

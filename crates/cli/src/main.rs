//! `vcall`: play call scenarios between in-process signaling engines

mod simulator;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use vcall_session_core::logging::{log_welcome, parse_log_level};
use vcall_session_core::prelude::{setup_logging, EngineConfig, LoggingConfig, MediaKind, ParticipantId};

use crate::simulator::{Scenario, Simulation};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Media {
    Audio,
    Video,
}

impl From<Media> for MediaKind {
    fn from(media: Media) -> Self {
        match media {
            Media::Audio => MediaKind::AudioOnly,
            Media::Video => MediaKind::AudioVideo,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "vcall", version, about = "Simulate calls between in-process signaling engines")]
struct Args {
    /// Participant placing the calls
    #[arg(short, long, default_value = "alice")]
    caller: String,

    /// Participants being called
    #[arg(short = 'p', long, value_delimiter = ',', default_value = "bob")]
    callees: Vec<String>,

    /// How the callees respond
    #[arg(short, long, value_enum, default_value = "accept")]
    scenario: Scenario,

    #[arg(short, long, value_enum, default_value = "video")]
    media: Media,

    /// Number of calls to make
    #[arg(short = 'n', long, default_value = "1")]
    num_calls: usize,

    /// Call duration in seconds
    #[arg(short, long, default_value = "3")]
    duration: u64,

    /// Answer timeout in seconds, overrides the config file
    #[arg(short = 't', long)]
    answer_timeout: Option<u64>,

    /// Engine configuration file (TOML)
    #[arg(long, env = "VCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("failed to load engine config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        config.local_participant = ParticipantId::from(self.caller.as_str());
        if let Some(secs) = self.answer_timeout {
            config = config.with_answer_timeout(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "vcall");
    if args.json {
        logging = logging.with_json();
    }
    setup_logging(logging)?;
    log_welcome("vcall", vcall_session_core::VERSION);

    let config = args.engine_config()?;
    let callees: Vec<ParticipantId> = args.callees.iter().map(|c| ParticipantId::from(c.as_str())).collect();
    info!(
        "{} calls {:?} ({:?}, answer timeout {:?})",
        config.local_participant,
        callees,
        args.scenario,
        config.answer_timeout()
    );

    let simulation = Simulation::new(config, &callees).await?;
    let call_duration = Duration::from_secs(args.duration);

    let mut completed = 0usize;
    for n in 1..=args.num_calls {
        info!("Call {}/{}", n, args.num_calls);
        match simulation.run(args.scenario, args.media.into(), call_duration, None).await {
            Ok(report) => {
                completed += 1;
                info!(
                    "Session {} closed: {:?} (connected {}, left early {})",
                    report.session_id,
                    report.reason,
                    report.connected.len(),
                    report.left.len()
                );
                info!("Caller stats: {:?}", report.stats);
            }
            Err(e) => warn!("Call {} failed: {:#}", n, e),
        }
    }

    simulation.shutdown().await?;
    info!("Finished {}/{} calls", completed, args.num_calls);
    Ok(())
}

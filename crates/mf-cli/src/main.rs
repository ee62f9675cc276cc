use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

use mf_fc::{FcConfig, Session};
use mf_mission::{fault, FaultConfig, MissionConfig};
use mf_telemetry::TelemetryConfig;

#[derive(Debug, Parser)]
#[command(name = "motorfault", version, about = "Motor fault injection for ArduCopter over MAVLink (SITL/HITL)")]
struct Cli {
    /// TOML file with [fc], [mission], [fault] and [telemetry] sections.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fly to the waypoint and pin the fault motors at the fault PWM.
    Servo {
        #[arg(long, default_value = "127.0.0.1:14550")]
        connect: String,
    },
    /// Reset the hexa's motors, fly, inject the fault and record pitch/roll.
    Trajectory {
        #[arg(long, default_value = "127.0.0.1:14551")]
        connect: String,
        /// .mat or .json; defaults to telemetry.output.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fly to the waypoint, yaw on motors 3-6, then resume the goto.
    Yaw {
        #[arg(long, default_value = "127.0.0.1:14551")]
        connect: String,
    },
}

impl Command {
    fn connect(&self) -> &str {
        match self {
            Command::Servo { connect } | Command::Trajectory { connect, .. } | Command::Yaw { connect } => connect.as_str(),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    fc: FcConfig,
    mission: MissionConfig,
    fault: FaultConfig,
    telemetry: TelemetryConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: Config = toml::from_str(&s).context("parse config toml")?;
    cfg.fault.validate()?;
    Ok(cfg)
}

async fn run(cmd: &Command, cfg: &Config, session: &mut Session) -> Result<()> {
    match cmd {
        Command::Servo { .. } => fault::servo_fault(session, &cfg.mission, &cfg.fault).await,
        Command::Trajectory { output, .. } => {
            let output = output.clone().unwrap_or_else(|| PathBuf::from(&cfg.telemetry.output));
            fault::trajectory_fault(session, &cfg.mission, &cfg.fault, &output).await.map(|_| ())
        }
        Command::Yaw { .. } => fault::yaw_manoeuvre(session, &cfg.mission, &cfg.fault).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;

    let conn = cli.cmd.connect().trim();
    if conn.is_empty() {
        error!("No connection string specified, exiting code.");
        std::process::exit(1);
    }

    let mut session = Session::connect(conn, &cfg.fc).await?;

    let outcome = tokio::select! {
        r = run(&cli.cmd, &cfg, &mut session) => r,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("mission failed: {:#}", e);
    }
    session.close()?;
    info!("done");
    outcome
}

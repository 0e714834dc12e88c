//! CLI Entry Point for mx-beamline
//!
//! Drives the MX endstation devices against the simulated control system:
//! - List the complete PV address map
//! - Rotate the sample dewar and wait for the motor
//! - Read puck presence sensors
//! - Query or set the robot speed
//! - Ramp the cryostream
//! - Move goniometer axes by name or alias
//! - Show the effective configuration
//!
//! Each invocation starts a fresh simulated control system seeded from the
//! configuration.
//!
//! # Usage
//!
//! ```bash
//! mx-beamline pvs --json
//! mx-beamline --config config/beamline.toml rotate-dewar 45 --relative
//! mx-beamline --realistic cryo 120
//! RUST_LOG=debug mx-beamline move omega 90
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mx_core::{config, BeamlineConfig};
use mx_devices::{Beamline, RotationMode};
use mx_sim::{MockMode, SimConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mx-beamline")]
#[command(about = "MX beamline device control over a simulated control system", long_about = None)]
struct Cli {
    /// Beamline configuration file (TOML format)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Simulate hardware timing instead of completing moves instantly
    #[arg(long, global = true)]
    realistic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every component path and its PV address
    Pvs {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rotate the dewar and wait for the motor to finish
    RotateDewar {
        /// Angle in degrees
        #[arg(allow_hyphen_values = true)]
        angle: f64,

        /// Rotate by the angle instead of to it
        #[arg(long)]
        relative: bool,
    },

    /// Read a puck status sensor
    PuckStatus {
        /// Puck position, e.g. 7A
        position: String,
    },

    /// Show the robot speed, optionally setting it first
    RobotSpeed {
        /// New speed in percent (0-100)
        #[arg(long)]
        set: Option<f64>,
    },

    /// Ramp the cryostream and wait until the temperature is reached
    Cryo {
        /// Target temperature in kelvin
        kelvin: f64,

        /// Give up after this many seconds
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },

    /// Print the effective configuration (defaults, file and environment) as TOML
    Config,

    /// Move a goniometer axis and wait (aliases such as omega or cx accepted)
    Move {
        /// Axis name or alias
        axis: String,

        /// Target position in user units
        #[arg(allow_hyphen_values = true)]
        position: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (beamline_config, mut sim_config) = load_config(cli.config.as_deref())?;
    if cli.realistic {
        sim_config.mode = MockMode::Realistic;
    }
    tracing::debug!(config = ?cli.config, mode = ?sim_config.mode, "Configuration loaded");

    let (beamline, _sim) = Beamline::simulated(&beamline_config, &sim_config)
        .context("Failed to start simulated control system")?;

    match cli.command {
        Commands::Pvs { json } => print_pvs(&beamline, json),
        Commands::RotateDewar { angle, relative } => {
            let mode = if relative {
                RotationMode::Relative
            } else {
                RotationMode::Absolute
            };
            let position = beamline
                .dewar
                .rotate(angle, mode)
                .await
                .context("Dewar rotation failed")?;
            println!("✅ Dewar at {:.3} deg", position);
            Ok(())
        }
        Commands::PuckStatus { position } => {
            let status = beamline.dewar.get_puck_status(&position).await?;
            println!("Puck {}: status {}", position.to_ascii_uppercase(), status);
            Ok(())
        }
        Commands::RobotSpeed { set } => {
            let robot = &beamline.robot_arm;
            if let Some(percent) = set {
                robot.set_speed(percent).await?;
            }
            let speed = robot.speed.get().await?;
            let full = robot.is_full_speed().await?;
            println!(
                "Robot speed: {:.0}% ({})",
                speed,
                if full { "full speed" } else { "reduced" }
            );
            Ok(())
        }
        Commands::Cryo {
            kelvin,
            timeout_secs,
        } => {
            let reached = beamline
                .cryostream
                .ramp_to(kelvin, Some(Duration::from_secs(timeout_secs)))
                .await
                .context("Cryostream ramp failed")?;
            println!("✅ Cryostream at {:.2} K", reached);
            Ok(())
        }
        Commands::Config => {
            let effective = EffectiveConfig {
                beamline: &beamline_config,
                simulation: &sim_config,
            };
            print!("{}", toml::to_string_pretty(&effective)?);
            Ok(())
        }
        Commands::Move { axis, position } => {
            let motor = beamline.gonio.axis(&axis)?;
            let reached = motor
                .move_and_wait(position, None)
                .await
                .with_context(|| format!("Move of '{}' failed", axis))?;
            println!("✅ {} ({}) at {:.4}", axis, motor.name(), reached);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    #[serde(flatten)]
    beamline: &'a BeamlineConfig,
    simulation: &'a SimConfig,
}

/// Beamline and simulation settings from the same layered figment.
fn load_config(path: Option<&std::path::Path>) -> Result<(BeamlineConfig, SimConfig)> {
    let figment = config::figment(path)?;
    let beamline = BeamlineConfig::from_figment(&figment).context("Invalid beamline config")?;
    let sim: SimConfig = figment
        .focus("simulation")
        .extract()
        .context("Invalid [simulation] section")?;
    Ok((beamline, sim))
}

fn print_pvs(beamline: &Beamline, json: bool) -> Result<()> {
    let components = beamline.components();
    if json {
        println!("{}", serde_json::to_string_pretty(&components)?);
        return Ok(());
    }

    let width = components.iter().map(|c| c.path.len()).max().unwrap_or(0);
    for component in &components {
        let access = if component.read_only { "RO" } else { "RW" };
        println!(
            "{:width$}  {}  {:6}  {}",
            component.path,
            access,
            component.dtype,
            component.pv,
            width = width
        );
    }
    println!();
    println!("{} control points", components.len());
    Ok(())
}

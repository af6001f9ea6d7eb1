//! CLI entry point for ledctl.
//!
//! Thin front-end over the library: every subcommand resolves a port,
//! builds validated configs and calls the same supervisor operations an
//! interactive front-end would.
//!
//! # Usage
//!
//! ```bash
//! ledctl off
//! ledctl setmode cycle -b 1 -s 3
//! ledctl setpattern alarm --hz 2 --background
//! ledctl stop
//! ledctl ports
//! ```
//!
//! Exit codes are stable so scripts can branch: see `LedError::exit_code`.

use clap::{Args, Parser, Subcommand};
use ledctl::locate;
use ledctl::{
    LedError, LedResult, Mode, PatternConfig, ProcessSupervisor, SerialConfig, StartPolicy,
    BAUD_DEFAULT,
};
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ledctl")]
#[command(about = "Drive a CH340-bridged RGB status LED module", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn LEDs off (one-shot)
    Off {
        #[command(flatten)]
        serial: SerialArgs,
    },

    /// Select a built-in firmware mode once (no loop)
    Setmode {
        /// Built-in mode name
        #[arg(value_parser = ["cycle", "rainbow", "breathing"])]
        name: String,

        #[command(flatten)]
        pattern: PatternArgs,

        #[command(flatten)]
        serial: SerialArgs,
    },

    /// Run an emulated pattern loop (long-running unless one-shot)
    Setpattern {
        /// Pattern name
        #[arg(value_parser = ["stillred", "stillblue", "breathered", "alarm"])]
        name: String,

        #[command(flatten)]
        pattern: PatternArgs,

        /// Seconds per envelope cycle (breathered)
        #[arg(long)]
        period: Option<f64>,

        /// Override the raw firmware mode byte (e.g. 0x03)
        #[arg(long = "mode-num", value_parser = parse_byte)]
        mode_num: Option<u8>,

        /// Toggle frequency in Hz (alarm)
        #[arg(long)]
        hz: Option<f64>,

        /// Detach the loop and return immediately
        #[arg(short = 'g', long)]
        background: bool,

        /// Fail instead of replacing an existing loop on the port
        #[arg(long = "no-kill-existing")]
        no_kill_existing: bool,

        #[command(flatten)]
        serial: SerialArgs,
    },

    /// Stop the pattern loop owning a port
    Stop {
        /// Serial device (auto-detect if omitted)
        #[arg(short = 'p', long)]
        port: Option<PathBuf>,
    },

    /// List candidate serial devices
    Ports,
}

/// Serial-tuning flags shared by every command that touches the wire.
#[derive(Args)]
struct SerialArgs {
    /// Serial device (auto-detect if omitted)
    #[arg(short = 'p', long)]
    port: Option<PathBuf>,

    /// Baud rate
    #[arg(short = 'B', long, default_value_t = BAUD_DEFAULT)]
    baud: u32,

    /// Assert DTR after open (default)
    #[arg(short = 't', long, overrides_with = "no_dtr")]
    dtr: bool,

    /// Deassert DTR
    #[arg(short = 'T', long)]
    no_dtr: bool,

    /// Assert RTS after open
    #[arg(short = 'r', long, overrides_with = "no_rts")]
    rts: bool,

    /// Deassert RTS (default)
    #[arg(short = 'R', long)]
    no_rts: bool,

    /// Inter-byte delay in seconds
    #[arg(short = 'd', long, default_value_t = 0.005)]
    delay: f64,
}

impl SerialArgs {
    /// Resolve a concrete, validated serial configuration. Discovery runs
    /// here so configuration errors surface before any serial I/O.
    fn resolve(&self) -> LedResult<SerialConfig> {
        if !(self.delay > 0.0 && self.delay.is_finite()) {
            return Err(LedError::InvalidConfig(format!(
                "inter-byte delay must be > 0, got {}",
                self.delay
            )));
        }
        let port = locate::locate(self.port.as_deref())?;
        Ok(SerialConfig {
            port,
            baud: self.baud,
            dtr: self.dtr || !self.no_dtr,
            rts: self.rts && !self.no_rts,
            delay: Duration::from_secs_f64(self.delay),
        })
    }
}

/// Pattern-common flags.
#[derive(Args)]
struct PatternArgs {
    /// Brightness 1..5
    #[arg(short = 'b', long, default_value_t = 3)]
    brightness: u8,

    /// Speed 1..5
    #[arg(short = 's', long, default_value_t = 3)]
    speed: u8,
}

/// Accept decimal or `0x`-prefixed byte values for `--mode-num`.
fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|_| format!("'{s}' is not a byte value"))
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("ledctl: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> LedResult<()> {
    let supervisor = ProcessSupervisor::new();
    match cli.command {
        Commands::Off { serial } => {
            let serial = serial.resolve()?;
            // Brightness/speed are irrelevant for OFF; the frame rule pins
            // them to a fixed safe value.
            supervisor
                .start(
                    Mode::Off,
                    PatternConfig::default(),
                    serial,
                    StartPolicy::default(),
                )
                .await
        }

        Commands::Setmode {
            name,
            pattern,
            serial,
        } => {
            let mode: Mode = name.parse()?;
            let config = PatternConfig {
                brightness: pattern.brightness,
                speed: pattern.speed,
                ..Default::default()
            };
            config.validate()?;
            let serial = serial.resolve()?;
            supervisor
                .start(mode, config, serial, StartPolicy::default())
                .await
        }

        Commands::Setpattern {
            name,
            pattern,
            period,
            mode_num,
            hz,
            background,
            no_kill_existing,
            serial,
        } => {
            let mode: Mode = name.parse()?;
            let config = PatternConfig {
                brightness: pattern.brightness,
                speed: pattern.speed,
                period,
                mode_num,
                hz,
            };
            config.validate()?;
            let serial = serial.resolve()?;
            let policy = StartPolicy {
                background,
                kill_existing: !no_kill_existing,
            };
            debug!("starting {mode} on {} ({policy:?})", serial.port.display());
            supervisor.start(mode, config, serial, policy).await
        }

        Commands::Stop { port } => {
            let port = locate::locate(port.as_deref())?;
            supervisor.stop(&port.to_string_lossy()).await
        }

        Commands::Ports => {
            list_ports()?;
            Ok(())
        }
    }
}

/// Print every enumerable serial device, flagging known LED bridge chips.
fn list_ports() -> LedResult<()> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("no serial ports detected");
        return Ok(());
    }
    for port in ports {
        match &port.port_type {
            serialport::SerialPortType::UsbPort(info) => {
                let known = locate::KNOWN_BRIDGES.contains(&(info.vid, info.pid));
                println!(
                    "{}  USB {:04x}:{:04x}{}",
                    port.port_name,
                    info.vid,
                    info.pid,
                    if known { "  (LED bridge)" } else { "" }
                );
            }
            other => println!("{}  {:?}", port.port_name, other),
        }
    }
    Ok(())
}

//! Run the daemon and control LIFX bulbs from the command line.
//!
//! The daemon discovers bulbs for `--wait` seconds, then runs the requested
//! command against `--target` and prints the result as JSON.
//!
//! Run with: cargo run --example lightsd -- --help
//! Set RUST_LOG=lightsd_rs=debug to watch the traffic.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lightsd_rs::wire::WaveformParams;
use lightsd_rs::{Action, Client, Daemon, DaemonConfig, Hsbk, Waveform};

#[derive(Parser)]
#[command(name = "lightsd")]
#[command(about = "Discover and control LIFX smart bulbs on the local network", long_about = None)]
struct Cli {
    /// JSON configuration file (durations in milliseconds)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seconds to spend discovering bulbs before running the command
    #[arg(short, long, global = true, default_value = "3")]
    wait: u64,

    /// Selector: `*`, `#tag`, `@group`, a label or a 12 hex digit device id
    #[arg(short, long, global = true, default_value = "*")]
    target: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every discovered bulb
    List,

    /// Query the targeted bulbs for their current state
    State,

    /// Turn the targeted bulbs on
    On,

    /// Turn the targeted bulbs off
    Off,

    /// Toggle the targeted bulbs
    Toggle,

    /// Set a color
    Color {
        /// Hue in degrees (0-360)
        hue: f32,
        /// Saturation (0.0-1.0)
        saturation: f32,
        /// Brightness (0.0-1.0)
        brightness: f32,
        /// Color temperature in Kelvin (2500-9000)
        #[arg(short, long, default_value = "3500")]
        kelvin: u16,
        /// Transition time in milliseconds
        #[arg(long, default_value = "0")]
        transition: u32,
    },

    /// Run a waveform effect towards a color
    Waveform {
        /// SAW, SINE, HALF_SINE, TRIANGLE or SQUARE
        waveform: Waveform,
        /// Hue in degrees (0-360)
        hue: f32,
        /// Saturation (0.0-1.0)
        saturation: f32,
        /// Brightness (0.0-1.0)
        brightness: f32,
        /// Period of one cycle in milliseconds
        #[arg(long, default_value = "1000")]
        period: u32,
        /// Number of cycles
        #[arg(long, default_value = "3")]
        cycles: f32,
        /// Keep the target color when done
        #[arg(long)]
        persist: bool,
    },

    /// Rename the targeted bulbs
    Label { label: String },

    /// Add the targeted bulbs to a tag
    Tag { tag: String },

    /// Remove the targeted bulbs from a tag
    Untag { tag: String },

    /// Keep the daemon running and print diagnostics periodically
    Run {
        /// Seconds between reports
        #[arg(short, long, default_value = "10")]
        interval: u64,
    },
}

fn color(hue: f32, saturation: f32, brightness: f32, kelvin: u16) -> Result<Hsbk, String> {
    Hsbk::create(hue, saturation, brightness, kelvin).ok_or_else(|| {
        format!("invalid color: hue={hue} sat={saturation} bri={brightness} kelvin={kelvin}")
    })
}

fn action(command: &Commands) -> Result<Option<Action>, String> {
    let action = match command {
        Commands::List | Commands::Run { .. } => return Ok(None),
        Commands::State => Action::GetLightState,
        Commands::On => Action::PowerOn,
        Commands::Off => Action::PowerOff,
        Commands::Toggle => Action::PowerToggle,
        Commands::Color {
            hue,
            saturation,
            brightness,
            kelvin,
            transition,
        } => Action::SetColor {
            color: color(*hue, *saturation, *brightness, *kelvin)?,
            transition_ms: *transition,
        },
        Commands::Waveform {
            waveform,
            hue,
            saturation,
            brightness,
            period,
            cycles,
            persist,
        } => Action::SetWaveform(WaveformParams {
            stream: 0,
            transient: !persist,
            color: color(*hue, *saturation, *brightness, 3500)?,
            period_ms: *period,
            cycles: *cycles,
            skew_ratio: 0,
            waveform: *waveform,
        }),
        Commands::Label { label } => Action::SetLabel(label.clone()),
        Commands::Tag { tag } => Action::Tag(tag.clone()),
        Commands::Untag { tag } => Action::Untag(tag.clone()),
    };
    Ok(Some(action))
}

async fn session(cli: &Cli, client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    tokio::time::sleep(Duration::from_secs(cli.wait)).await;

    if let Commands::Run { interval } = cli.command {
        loop {
            let diagnostics = client.diagnostics().await?;
            println!("{}", serde_json::to_string(&diagnostics)?);
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    }

    match action(&cli.command)? {
        None => {
            let bulbs = client.list_bulbs().await?;
            if bulbs.is_empty() {
                eprintln!("No bulbs found on the network.");
            }
            println!("{}", serde_json::to_string_pretty(&bulbs)?);
        }
        Some(action) => {
            let report = client.execute(&cli.target, action).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.total() == 0 {
                eprintln!("Nothing matched {:?}.", cli.target);
            } else if !report.is_success() {
                eprintln!(
                    "{} of {} bulbs failed: {:?}",
                    report.total() - report.succeeded(),
                    report.total(),
                    report.failed_targets()
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DaemonConfig::from_json(&fs::read_to_string(path)?)?,
        None => DaemonConfig::default(),
    };

    let daemon = Daemon::bind(config).await?;
    let client = daemon.client();

    let (result, outcome) = tokio::join!(daemon.run(), async {
        let outcome = session(&cli, &client).await;
        let _ = client.shutdown();
        outcome
    });
    result?;
    outcome
}

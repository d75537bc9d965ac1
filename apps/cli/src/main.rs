use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nwlink_core::session::{DeviceSession, SessionConfig};
use nwlink_core::storage::{RawImage, RawStorageCodec};
use nwlink_core::transport::NusbTransport;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Calculator DfuSe Tool (Pure Rust)", long_about = None)]
struct Args {
    /// Path to a TOML session config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the USB product ID
    #[arg(long, global = true, value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the firmware's platform info
    Info {
        /// Print as TOML
        #[arg(long = "toml")]
        as_toml: bool,
    },
    /// Print the hardware model
    Model {
        /// Report modified hardware as its official model
        #[arg(long)]
        exclude_modded: bool,
    },
    /// Save the storage region to a file
    Backup {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write a file over the storage region
    Install {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Write the effective config to a file
    SaveConfig { path: PathBuf },
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| e.to_string())
}

/// The flag can only turn collapsing on; a config file may already have.
fn collapse_modded(config: &SessionConfig, flag: bool) -> bool {
    config.exclude_modded || flag
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(pid) = args.pid {
        config.product_id = pid;
    }

    let session = || -> Result<DeviceSession<NusbTransport>> {
        Ok(DeviceSession::new(config.open_transport()?))
    };

    match args.command {
        Command::Info { as_toml } => {
            let info = session()?.introspect()?;
            if as_toml {
                print!("{}", toml::to_string_pretty(&info)?);
            } else {
                print!("{info}");
            }
        }
        Command::Model { exclude_modded } => {
            let exclude_modded = collapse_modded(&config, exclude_modded);
            println!("{}", session()?.classify_model(exclude_modded));
        }
        Command::Backup { output } => {
            let image = session()?.backup(&RawStorageCodec)?;
            std::fs::write(&output, &image.0)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(path = %output.display(), bytes = image.0.len(), "Storage saved");
        }
        Command::Install { input } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            session()?.install(&RawStorageCodec, &RawImage(data))?;
            info!(path = %input.display(), "Storage installed");
        }
        Command::SaveConfig { path } => {
            config.save_to_file(&path)?;
            info!(path = %path.display(), "Config saved");
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use nwlink_core::platform_info::{ExecutionMode, HeaderKind, PlatformInfo};
use nwlink_core::slot_info::SlotInfo;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the CLI
    Run,
    /// Run the test suite
    Test,
    /// Decode a dumped record offline
    Decode {
        /// Which record the dump holds
        #[arg(long, value_enum)]
        record: Record,
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Record {
    Slot,
    Legacy,
    Kernel,
    Userland,
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    println!("{what}...");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{what} failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => cargo(&["build"], "Building project")?,
        Commands::Run => cargo(&["run", "-p", "nwlink-cli"], "Running CLI")?,
        Commands::Test => cargo(&["test", "--workspace"], "Testing workspace")?,
        Commands::Decode { record, file } => {
            let data = std::fs::read(file)?;
            match record {
                Record::Slot => println!("{}", SlotInfo::decode(&data)?),
                Record::Legacy => print!(
                    "{}",
                    PlatformInfo::decode(&data, ExecutionMode::Legacy, HeaderKind::Kernel)?
                ),
                Record::Kernel => print!(
                    "{}",
                    PlatformInfo::decode(&data, ExecutionMode::Bootloader, HeaderKind::Kernel)?
                ),
                Record::Userland => print!(
                    "{}",
                    PlatformInfo::decode(&data, ExecutionMode::Bootloader, HeaderKind::Userland)?
                ),
            }
        }
    }

    Ok(())
}

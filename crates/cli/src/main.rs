use std::path::PathBuf;

use cardbridge_plugin::{Plugin, PluginConfig};
use cardbridge_transport_pcsc::PcscTerminalProvider;
use clap::Parser;
use tracing::debug;

mod commands;
mod utils;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Inspect smart card readers and exchange APDUs through PC/SC")]
struct Cli {
    /// Reader name to use (defaults to the first reader holding a card)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// JSON file with the plugin configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => utils::load_config(path)?,
        None => PluginConfig::default(),
    };
    let plugin = Plugin::new(PcscTerminalProvider::establish()?, config)?;
    debug!("{} ready", plugin.name());

    let reader = || utils::reader::select_reader(&plugin, cli.reader.as_deref());

    match cli.command {
        Commands::List => list_command(&plugin)?,
        Commands::Rules => rules_command(&plugin),
        Commands::Atr { session } => atr_command(&reader()?, &session)?,
        Commands::Send { apdus, session } => send_command(&reader()?, &apdus, &session)?,
        Commands::Control { id, payload } => control_command(&reader()?, id, &payload)?,
        Commands::Watch { count, session } => watch_command(&reader()?, count, &session)?,
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}

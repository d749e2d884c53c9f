use clap::Subcommand;

mod card;
mod readers;
mod watch;

pub use card::*;
pub use readers::*;
pub use watch::*;

use crate::utils::SessionArgs;

/// Define subcommands for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// List available readers
    List,

    /// Show the ATR rules used to identify card protocols
    Rules,

    /// Show the ATR of the inserted card and the protocols it matches
    Atr {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Send command APDUs to the card
    Send {
        /// Command APDUs in hex, sent in order over one session
        #[arg(required = true)]
        apdus: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Send a control command to the reader itself
    Control {
        /// Control command id (defaults to the CCID escape command)
        #[arg(long)]
        id: Option<u32>,

        /// Payload in hex
        #[arg(default_value = "")]
        payload: String,
    },

    /// Report card insertions and removals
    Watch {
        /// Stop after this many cards
        #[arg(short = 'n', long)]
        count: Option<usize>,

        #[command(flatten)]
        session: SessionArgs,
    },
}

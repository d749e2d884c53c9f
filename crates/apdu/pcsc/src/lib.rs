//! PC/SC backend for the card transport traits
//!
//! This crate implements [`TerminalProvider`](cardbridge_apdu_core::TerminalProvider),
//! [`CardTerminal`](cardbridge_apdu_core::CardTerminal) and
//! [`CardConnection`](cardbridge_apdu_core::CardConnection) on top of the system
//! PC/SC service (pcsc-lite, WinSCard or the macOS framework).
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use cardbridge_apdu_core::prelude::*;
//! use cardbridge_transport_pcsc::PcscTerminalProvider;
//!
//! let provider = PcscTerminalProvider::establish()?;
//! for terminal in provider.list_terminals()? {
//!     if !terminal.is_card_present()? {
//!         continue;
//!     }
//!     let mut connection = terminal.connect(ProtocolSelector::default())?;
//!     println!("{}: {}", terminal.name(), connection.atr());
//!
//!     let transceiver = ApduTransceiver::new();
//!     let response = transceiver.transmit(&mut connection, &[0x00, 0xA4, 0x04, 0x00, 0x00])?;
//!     println!("{}", hex::encode_upper(&response));
//!     connection.disconnect(Disposition::Reset)?;
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use error::map_error;
pub use manager::PcscTerminalProvider;
pub use reader::PcscTerminal;
pub use transport::PcscConnection;

// Re-export the middleware types callers may need to build a context themselves
pub use pcsc::{Context, Scope};

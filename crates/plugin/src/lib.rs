//! Smart card reader plugin
//!
//! Adapts a native reader middleware, seen through the
//! [`cardbridge_apdu_core`] transport traits, into readers a card processing host
//! can drive:
//!
//! - [`Plugin`] lists the connected readers and hands out [`ReaderAdapter`]s
//!   sharing one [`PluginContext`].
//! - [`ReaderAdapter`] owns the [`CardSession`] of its reader, identifies card
//!   protocols from the ATR and blocks on card insertion or removal until told to
//!   stop. Hosts reach it through the [`ProtocolClassifiable`],
//!   [`ChannelTransceiver`] and [`PresenceMonitor`] capabilities.
//! - [`ProtocolRuleRegistry`] holds the ATR rules, built-in ones refined by
//!   [`PluginConfig`].
//!
//! ```no_run
//! # fn run<P: cardbridge_apdu_core::TerminalProvider>(provider: P) -> Result<(), cardbridge_plugin::Error> {
//! use cardbridge_plugin::{ChannelTransceiver, Plugin, PluginConfig, PresenceMonitor};
//!
//! let plugin = Plugin::new(provider, PluginConfig::default())?;
//! for reader in plugin.search_available_readers()? {
//!     reader.wait_for_card_insertion()?;
//!     let response = reader.transmit_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00])?;
//!     println!("{}: {:?}", reader.name(), response);
//!     reader.close_physical_channel()?;
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod control;
pub mod error;
pub mod monitor;
pub mod plugin;
pub mod protocol;
pub mod reader;
pub mod session;
pub mod spi;

#[cfg(test)]
mod mock;

pub use config::{DisconnectionMode, PluginConfig, SharingMode};
#[cfg(feature = "serde")]
pub use config::PluginConfigFile;
pub use control::ControlPlatform;
pub use error::{Error, Result, WaitTask};
pub use monitor::{MonitorState, ReaderMonitor, RemovalStrategy};
pub use plugin::{Plugin, PluginContext};
pub use protocol::{AtrClassifier, CardProtocol, ProtocolRule, ProtocolRuleRegistry};
pub use reader::ReaderAdapter;
pub use session::CardSession;
pub use spi::{ChannelTransceiver, NamedReader, PresenceMonitor, ProtocolClassifiable};

//! Argument helpers shared by the commands

pub mod reader;

use std::{error::Error, fs, path::Path};

use cardbridge_apdu_core::{CardTerminal, IsoProtocol};
use cardbridge_plugin::{
    DisconnectionMode, PluginConfig, PluginConfigFile, ReaderAdapter, SharingMode,
};
use clap::{Args, ValueEnum};

/// Protocol to negotiate with the card
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum ProtocolArg {
    /// Whatever the card and reader agree on
    #[default]
    Any,
    /// Character oriented T=0
    T0,
    /// Block oriented T=1
    T1,
}

impl From<ProtocolArg> for IsoProtocol {
    fn from(protocol: ProtocolArg) -> Self {
        match protocol {
            ProtocolArg::Any => Self::Any,
            ProtocolArg::T0 => Self::T0,
            ProtocolArg::T1 => Self::T1,
        }
    }
}

/// Card session options
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Protocol to negotiate
    #[arg(long, value_enum, default_value_t)]
    pub protocol: ProtocolArg,

    /// Let other applications use the card while it is open
    #[arg(long)]
    pub shared: bool,

    /// What happens to the card when the channel closes: reset, leave, unpower or eject
    #[arg(long, default_value = "reset")]
    pub disconnection: DisconnectionMode,
}

impl SessionArgs {
    /// Apply the options to `reader`
    pub fn apply<T: CardTerminal>(
        &self,
        reader: &ReaderAdapter<T>,
    ) -> Result<(), cardbridge_plugin::Error> {
        let sharing = if self.shared {
            SharingMode::Shared
        } else {
            SharingMode::Exclusive
        };
        reader
            .set_iso_protocol(self.protocol.into())
            .set_disconnection_mode(self.disconnection)
            .set_sharing_mode(sharing)?;
        Ok(())
    }
}

/// Load a JSON plugin configuration
pub fn load_config(path: &Path) -> Result<PluginConfig, Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    let file: PluginConfigFile = serde_json::from_str(&content)?;
    Ok(PluginConfig::try_from(file)?)
}

/// Decode a hex argument, ignoring spaces
pub fn parse_hex(value: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|e| format!("invalid hex '{}': {}", value, e).into())
}

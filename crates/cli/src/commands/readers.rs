//! Commands about the readers and the plugin configuration

use std::error::Error;

use cardbridge_apdu_core::TerminalProvider;
use cardbridge_plugin::{ChannelTransceiver, Plugin, ProtocolClassifiable};
use colored::Colorize;

/// List the readers with their card presence
pub fn list_command<P: TerminalProvider>(plugin: &Plugin<P>) -> Result<(), Box<dyn Error>> {
    let readers = plugin.search_available_readers()?;

    if readers.is_empty() {
        println!("No readers found!");
        return Ok(());
    }

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = match reader.check_card_presence() {
            Ok(true) => "card present".green(),
            Ok(false) => "no card".normal(),
            Err(e) => format!("error: {}", e).as_str().red(),
        };
        let kind = if reader.is_contactless() {
            "contactless"
        } else {
            "contact"
        };
        println!("{}. {} [{}] ({})", i + 1, reader.name().bold(), kind, status);
    }

    Ok(())
}

/// Print the protocol rules in effect
pub fn rules_command<P: TerminalProvider>(plugin: &Plugin<P>) {
    println!("Protocol rules:");
    for rule in plugin.context().registry().iter() {
        let pattern = if rule.is_disabled() {
            "disabled".dimmed()
        } else {
            rule.pattern().normal()
        };
        println!("  {:<24} {}", rule.name(), pattern);
    }
}

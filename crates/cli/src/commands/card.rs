//! Commands exchanging data with a card or its reader

use std::error::Error;

use cardbridge_apdu_core::{CardTerminal, command::status_word};
use cardbridge_plugin::{ChannelTransceiver, ProtocolClassifiable, ReaderAdapter};
use colored::Colorize;
use tracing::{debug, info};

use crate::utils::{self, SessionArgs};

/// Print the ATR and the protocols it matches
pub fn atr_command<T: CardTerminal>(
    reader: &ReaderAdapter<T>,
    session: &SessionArgs,
) -> Result<(), Box<dyn Error>> {
    session.apply(reader)?;
    reader.open_physical_channel()?;

    let atr = reader.atr()?;
    println!("ATR: {}", atr.to_hex().bold());

    let protocols = reader.context().classifier().classify(&atr);
    if protocols.is_empty() {
        println!("No known protocol matches this ATR");
    } else {
        println!("Protocols: {}", protocols.join(", "));
    }

    reader.close_physical_channel()?;
    Ok(())
}

/// Send each APDU in turn and print the responses
pub fn send_command<T: CardTerminal>(
    reader: &ReaderAdapter<T>,
    apdus: &[String],
    session: &SessionArgs,
) -> Result<(), Box<dyn Error>> {
    let commands = apdus
        .iter()
        .map(|apdu| utils::parse_hex(apdu))
        .collect::<Result<Vec<_>, _>>()?;

    session.apply(reader)?;
    reader.open_physical_channel()?;
    info!("Card session open on {}", reader.name());

    let result = commands.iter().try_for_each(|command| {
        println!("> {}", hex::encode_upper(command));
        let response = reader.transmit_apdu(command)?;
        print_response(&response);
        Ok::<_, cardbridge_plugin::Error>(())
    });

    if let Err(e) = reader.close_physical_channel() {
        debug!("Closing the card session failed: {}", e);
    }
    Ok(result?)
}

/// Send a control command to the reader
pub fn control_command<T: CardTerminal>(
    reader: &ReaderAdapter<T>,
    id: Option<u32>,
    payload: &str,
) -> Result<(), Box<dyn Error>> {
    let payload = utils::parse_hex(payload)?;
    let id = id.unwrap_or_else(|| reader.ccid_escape_command_id());

    println!("> [{}] {}", id, hex::encode_upper(&payload));
    let response = reader.transmit_control_command(id, &payload)?;
    println!("< {}", hex::encode_upper(&response));
    Ok(())
}

fn print_response(response: &[u8]) {
    let encoded = hex::encode_upper(response);
    match status_word(response) {
        Some((0x90, 0x00)) => println!("< {}", encoded.green()),
        Some(_) => println!("< {}", encoded.yellow()),
        None => println!("< {}", encoded.red()),
    }
}

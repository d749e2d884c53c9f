//! Card insertion and removal reporting

use std::error::Error;

use cardbridge_apdu_core::CardTerminal;
use cardbridge_plugin::{ChannelTransceiver, PresenceMonitor, ReaderAdapter};
use colored::Colorize;

use crate::utils::SessionArgs;

/// Wait for cards, print their ATR, and wait for their removal
pub fn watch_command<T: CardTerminal>(
    reader: &ReaderAdapter<T>,
    count: Option<usize>,
    session: &SessionArgs,
) -> Result<(), Box<dyn Error>> {
    session.apply(reader)?;

    let mut seen = 0;
    while count.is_none_or(|count| seen < count) {
        println!("Waiting for a card on {}...", reader.name());
        reader.wait_for_card_insertion()?;

        match reader.open_physical_channel().and_then(|()| reader.atr()) {
            Ok(atr) => println!("{} {}", "Card inserted:".green(), atr),
            Err(e) => println!("{} {}", "Card inserted, unreadable:".yellow(), e),
        }

        // keep the channel while the card is processed so its removal is noticed
        reader.on_start_detection();
        reader.close_physical_channel()?;
        let removal = reader.wait_for_card_removal();
        reader.on_stop_detection();
        removal?;

        println!("{}", "Card removed".red());
        seen += 1;
    }

    Ok(())
}

//! Tests against the system PC/SC service
//!
//! These run on any machine: without a service, a reader or a card they report
//! what is missing and return.

use std::time::Duration;

use cardbridge_apdu_core::prelude::*;
use cardbridge_transport_pcsc::{PcscTerminal, PcscTerminalProvider};

fn provider() -> Option<PcscTerminalProvider> {
    match PcscTerminalProvider::establish() {
        Ok(provider) => Some(provider),
        Err(_) => {
            println!("Skipping test, PC/SC not available");
            None
        }
    }
}

fn terminal_with_card(provider: &PcscTerminalProvider) -> Option<PcscTerminal> {
    let terminals = match provider.list_terminals() {
        Ok(terminals) => terminals,
        Err(e) => {
            println!("Skipping test, could not list readers: {:?}", e);
            return None;
        }
    };
    let terminal = terminals
        .into_iter()
        .find(|terminal| terminal.is_card_present().unwrap_or(false));
    if terminal.is_none() {
        println!("Skipping test, no card available");
    }
    terminal
}

#[test]
fn test_list_terminals() {
    let Some(provider) = provider() else {
        return;
    };

    match provider.list_terminals() {
        Ok(terminals) => {
            for terminal in &terminals {
                assert!(!terminal.name().is_empty());
                // must answer without blocking
                let _ = terminal.is_card_present();
            }
        }
        Err(e) => {
            assert!(
                e == TransportError::NoReadersAvailable || e.is_service_unavailable(),
                "unexpected error: {:?}",
                e
            );
        }
    }
}

#[test]
fn test_unknown_terminal() {
    let Some(provider) = provider() else {
        return;
    };

    let terminal = provider.terminal("No Such Reader 00 00").unwrap();
    assert!(terminal.is_card_present().is_err());
    assert!(terminal.connect(ProtocolSelector::default()).is_err());
}

#[test]
fn test_connect_and_select() {
    let Some(provider) = provider() else {
        return;
    };
    let Some(terminal) = terminal_with_card(&provider) else {
        return;
    };

    let mut connection = match terminal.connect(ProtocolSelector::new(IsoProtocol::Any)) {
        Ok(connection) => connection,
        Err(e) => {
            println!("Could not connect to {}: {:?}", terminal.name(), e);
            return;
        }
    };
    assert!(!connection.atr().is_empty(), "Expected an ATR");
    println!("ATR: {}", connection.atr());

    let transceiver = ApduTransceiver::new();
    match transceiver.transmit(&mut connection, &[0x00, 0xA4, 0x04, 0x00, 0x00]) {
        Ok(response) => {
            assert!(response.len() >= 2, "Response too short");
            println!("Response: {}", hex::encode_upper(&response));
        }
        Err(e) => println!("Transmit failed: {:?}", e),
    }

    connection.disconnect(Disposition::Leave).unwrap();
}

#[test]
fn test_exclusive_round_trip() {
    let Some(provider) = provider() else {
        return;
    };
    let Some(terminal) = terminal_with_card(&provider) else {
        return;
    };

    let Ok(mut connection) = terminal.connect(ProtocolSelector::default()) else {
        println!("Skipping test, card busy");
        return;
    };
    if connection.begin_exclusive().is_ok() {
        connection.end_exclusive().unwrap();
    }
    connection.disconnect(Disposition::Leave).unwrap();
}

#[test]
fn test_wait_for_present_card() {
    let Some(provider) = provider() else {
        return;
    };
    let Some(terminal) = terminal_with_card(&provider) else {
        return;
    };

    // the card is already there, so the wait returns at once
    assert!(terminal.wait_for_card_present(Duration::from_millis(100)).unwrap());
    assert!(!terminal.wait_for_card_absent(Duration::from_millis(100)).unwrap());
}

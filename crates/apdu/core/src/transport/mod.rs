//! Transport traits for communicating with readers and cards
//!
//! These traits describe the capability the native reader middleware must provide.
//! They carry opaque bytes only: command structure and response chaining are the
//! business of [`ApduTransceiver`](crate::ApduTransceiver).

pub mod error;
mod selector;

use std::{fmt, time::Duration};

use bytes::Bytes;
pub use error::TransportError;
pub use selector::{IsoProtocol, ParseSelectorError, ProtocolSelector};
use tracing::{debug, trace};

use crate::Atr;

/// Protocol negotiated by the middleware for an open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    /// ISO 7816-3 T=0
    T0,
    /// ISO 7816-3 T=1
    T1,
    /// No card protocol: direct reader access or contactless pass-through
    Raw,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::T0 => "T=0",
            Self::T1 => "T=1",
            Self::Raw => "DIRECT",
        })
    }
}

/// Action applied to the card when a connection is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Leave the card powered and in its current state
    Leave,
    /// Warm reset the card
    Reset,
    /// Power the card down
    Unpower,
    /// Eject the card, where the reader supports it
    Eject,
}

/// An open connection to a card (or to the reader itself for direct connections)
///
/// A connection is not safe for concurrent use: callers serialise access.
pub trait CardConnection: Send + fmt::Debug {
    /// Protocol negotiated at connect time
    fn protocol(&self) -> TransportProtocol;

    /// Answer To Reset captured at connect time
    fn atr(&self) -> &Atr;

    /// Send raw bytes to the card and return the raw response
    ///
    /// No interpretation happens here: GET RESPONSE handling belongs to the
    /// transceiver.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode_upper(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode_upper(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of [`transmit_raw`](Self::transmit_raw)
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Send a control (escape) command with an already encoded control code
    fn control(&mut self, code: u32, payload: &[u8]) -> Result<Bytes, TransportError>;

    /// Acquire the cross-process exclusive transaction lock on the card
    fn begin_exclusive(&mut self) -> Result<(), TransportError>;

    /// Release the exclusive transaction lock
    fn end_exclusive(&mut self) -> Result<(), TransportError>;

    /// Release the connection, applying `disposition` to the card
    fn disconnect(self, disposition: Disposition) -> Result<(), TransportError>
    where
        Self: Sized;
}

/// A reader known to the native middleware
pub trait CardTerminal: Send + Sync + fmt::Debug {
    /// Connection type produced by [`connect`](Self::connect)
    type Connection: CardConnection;

    /// Reader name as reported by the middleware
    fn name(&self) -> &str;

    /// Connect to the card (or to the reader for [`ProtocolSelector::direct`])
    fn connect(&self, selector: ProtocolSelector) -> Result<Self::Connection, TransportError>;

    /// Whether a card is currently present, without blocking
    fn is_card_present(&self) -> Result<bool, TransportError>;

    /// Block until a card is present or `timeout` elapses
    ///
    /// Returns `false` when the timeout elapsed without a card.
    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool, TransportError>;

    /// Block until the card is removed or `timeout` elapses
    ///
    /// Returns `false` when the timeout elapsed with the card still present.
    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool, TransportError>;
}

/// Source of the readers currently connected to the system
pub trait TerminalProvider: Send + Sync + fmt::Debug {
    /// Reader type
    type Terminal: CardTerminal;

    /// List the readers currently known to the middleware
    fn list_terminals(&self) -> Result<Vec<Self::Terminal>, TransportError>;
}

#[cfg(test)]
#[derive(Debug, Clone)]
#[allow(missing_docs, unreachable_pub)]
pub struct MockConnection {
    /// Protocol reported to the transceiver
    pub protocol: TransportProtocol,
    /// ATR reported by the connection
    pub atr: Atr,
    /// Mock responses to return, in order
    pub responses: Vec<Result<Bytes, TransportError>>,
    /// Commands that were sent
    pub commands: Vec<Bytes>,
}

#[cfg(test)]
#[allow(unreachable_pub)]
impl MockConnection {
    /// Create a new mock connection returning the given responses in order
    pub fn new(protocol: TransportProtocol, responses: &[&[u8]]) -> Self {
        Self {
            protocol,
            atr: Atr::default(),
            responses: responses
                .iter()
                .map(|r| Ok(Bytes::copy_from_slice(r)))
                .collect(),
            commands: Vec::new(),
        }
    }

    /// Create a mock connection that always answers with the given response
    pub fn repeating(protocol: TransportProtocol, response: &[u8]) -> Self {
        Self::new(protocol, &[response])
    }
}

#[cfg(test)]
impl CardConnection for MockConnection {
    fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    fn atr(&self) -> &Atr {
        &self.atr
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.commands.push(Bytes::copy_from_slice(command));

        if self.responses.is_empty() {
            return Err(TransportError::CardRemoved);
        }

        // Either clone the single response or take the next one
        if self.responses.len() == 1 {
            self.responses[0].clone()
        } else {
            self.responses.remove(0)
        }
    }

    fn control(&mut self, _code: u32, payload: &[u8]) -> Result<Bytes, TransportError> {
        Ok(Bytes::copy_from_slice(payload))
    }

    fn begin_exclusive(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn end_exclusive(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(self, _disposition: Disposition) -> Result<(), TransportError> {
        Ok(())
    }
}

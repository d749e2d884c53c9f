//! Card transport traits and the APDU transceiver
//!
//! This crate provides the foundational pieces for talking to smart cards through a
//! reader middleware such as PC/SC, independently of any particular native library.
//!
//! ## Overview
//!
//! - [`CardTerminal`], [`CardConnection`] and [`TerminalProvider`] describe what the
//!   native middleware must offer: listing readers, connecting to a card, raw
//!   transmission, control (escape) commands, exclusive transactions and presence
//!   waits.
//! - [`ApduTransceiver`] drives one logical APDU exchange over an open connection,
//!   resolving the ISO/IEC 7816-4 `61xx` (GET RESPONSE) and `6Cxx` (wrong Le)
//!   conventions transparently for T=0 and T=1.
//! - [`Atr`] carries the Answer To Reset captured at connect time.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod atr;
pub mod command;
pub mod error;
pub mod transceiver;
pub mod transport;

pub use atr::Atr;
pub use error::Error;
pub use transceiver::ApduTransceiver;
pub use transport::{
    CardConnection, CardTerminal, Disposition, IsoProtocol, ParseSelectorError,
    ProtocolSelector, TerminalProvider, TransportError, TransportProtocol,
};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Atr, Bytes, BytesMut, Error};

    pub use crate::command::{GET_RESPONSE_PROBE, get_response, status_word};
    pub use crate::transceiver::ApduTransceiver;
    pub use crate::transport::{
        CardConnection, CardTerminal, Disposition, IsoProtocol, ProtocolSelector,
        TerminalProvider, TransportError, TransportProtocol,
    };
}

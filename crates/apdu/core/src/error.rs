//! Error type for APDU exchanges

use crate::transport::TransportError;

/// Errors raised while exchanging an APDU with a card
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The caller supplied an unusable command
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The command carries an extended length field but the card speaks T=0
    #[error("Extended length not supported for T=0")]
    ExtendedLengthNotSupported,

    /// The card kept answering `61xx`/`6Cxx` past the exchange ceiling
    #[error("Could not obtain response after {exchanges} exchanges")]
    ResponseChainingExhausted {
        /// Number of native transmissions performed before giving up
        exchanges: usize,
    },

    /// The native transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Whether this error comes from the native transport rather than from the
    /// command or the response chaining
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result alias for APDU exchanges
pub type Result<T> = core::result::Result<T, Error>;

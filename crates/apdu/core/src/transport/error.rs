//! Error types specific to card transport

use thiserror::Error;

/// Failure reported by the native reader middleware
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No card responded in the reader
    #[error("No card present")]
    NoCard,

    /// The card was removed while a connection was open
    #[error("Card was removed")]
    CardRemoved,

    /// The card was reset by another party
    #[error("Card was reset")]
    CardReset,

    /// The card could not complete the transaction
    #[error("Card transaction failed")]
    NotTransacted,

    /// The middleware knows no reader at all
    #[error("No readers available")]
    NoReadersAvailable,

    /// The smart card service is not running
    #[error("Smart card service not available")]
    NoService,

    /// The smart card service was stopped
    #[error("Smart card service stopped")]
    ServiceStopped,

    /// Another process holds the card in exclusive mode
    #[error("Sharing violation")]
    Sharing,

    /// A blocking middleware call timed out
    #[error("Operation timed out")]
    Timeout,

    /// A blocking middleware call was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// The named reader is not known to the middleware
    #[error("Unknown reader: {0}")]
    UnknownReader(String),

    /// Communication with the reader failed
    #[error("Reader communication error: {0}")]
    Communication(String),

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure is attributable to the card (absent, removed, reset or
    /// unable to transact) rather than to the reader or the service
    pub const fn is_card_related(&self) -> bool {
        matches!(
            self,
            Self::NoCard | Self::CardRemoved | Self::CardReset | Self::NotTransacted
        )
    }

    /// Whether the failure means no card answers in the reader
    pub const fn is_card_absent(&self) -> bool {
        matches!(self, Self::NoCard | Self::CardRemoved)
    }

    /// Whether the smart card service itself is unavailable
    pub const fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::NoService | Self::ServiceStopped)
    }
}

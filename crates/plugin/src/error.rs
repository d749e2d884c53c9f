//! Error types for the reader plugin

use cardbridge_apdu_core::TransportError;

/// Monitoring task that can be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum WaitTask {
    /// Waiting for a card to be inserted
    #[display("card insertion")]
    CardInsertion,
    /// Waiting for the card to be removed
    #[display("card removal")]
    CardRemoval,
}

/// Errors raised by the plugin, its readers and their card sessions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No rule is registered under this protocol name
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A protocol rule or reader filter does not compile
    #[error("Bad regular expression {pattern:?}: {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// No card answered when connecting
    #[error("{reader}: card not present")]
    CardNotPresent {
        /// Reader name
        reader: String,
    },

    /// The card failed during an exchange (removed, reset, unable to transact)
    #[error("{reader}: card communication error: {source}")]
    CardCommunication {
        /// Reader name
        reader: String,
        /// Native failure
        source: TransportError,
    },

    /// The reader or the middleware failed
    #[error("{reader}: reader communication error: {source}")]
    ReaderCommunication {
        /// Reader name
        reader: String,
        /// Native failure
        source: TransportError,
    },

    /// The reader list could not be obtained
    #[error("Could not access the reader list: {0}")]
    PluginCommunication(#[source] TransportError),

    /// The card kept chaining responses past the exchange ceiling
    #[error("{reader}: could not obtain response after {exchanges} exchanges")]
    ResponseChainingExhausted {
        /// Reader name
        reader: String,
        /// Native transmissions performed
        exchanges: usize,
    },

    /// A monitoring wait was stopped before the card changed state
    #[error("{reader}: the wait for the {task} task has been cancelled")]
    TaskCanceled {
        /// Reader name
        reader: String,
        /// Cancelled task
        task: WaitTask,
    },

    /// The reader is not in a state allowing the operation
    #[error("{0}")]
    ReaderState(String),
}

impl Error {
    /// Classify a native failure as a card or a reader error
    pub fn transport(reader: &str, source: TransportError) -> Self {
        if source.is_card_related() {
            Self::CardCommunication {
                reader: reader.to_string(),
                source,
            }
        } else {
            Self::ReaderCommunication {
                reader: reader.to_string(),
                source,
            }
        }
    }

    /// Convert a transceiver failure, attaching the reader name
    pub fn apdu(reader: &str, error: cardbridge_apdu_core::Error) -> Self {
        use cardbridge_apdu_core::Error as ApduError;

        match error {
            ApduError::InvalidArgument(message) => Self::InvalidArgument(message.to_string()),
            ApduError::ExtendedLengthNotSupported => {
                Self::InvalidArgument("extended length not supported for T=0".to_string())
            }
            ApduError::ResponseChainingExhausted { exchanges } => Self::ResponseChainingExhausted {
                reader: reader.to_string(),
                exchanges,
            },
            ApduError::Transport(source) => Self::transport(reader, source),
        }
    }

    /// Whether the error is an I/O failure with the card or the reader
    pub const fn is_io(&self) -> bool {
        matches!(
            self,
            Self::CardNotPresent { .. }
                | Self::CardCommunication { .. }
                | Self::ReaderCommunication { .. }
        )
    }

    /// Whether the error reports a cancelled monitoring wait
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::TaskCanceled { .. })
    }
}

/// Result alias for plugin operations
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(matches!(
            Error::transport("r", TransportError::CardRemoved),
            Error::CardCommunication { .. }
        ));
        assert!(matches!(
            Error::transport("r", TransportError::Communication("F_COMM_ERROR".into())),
            Error::ReaderCommunication { .. }
        ));
    }

    #[test]
    fn test_apdu_conversion() {
        let err = Error::apdu(
            "r",
            cardbridge_apdu_core::Error::ResponseChainingExhausted { exchanges: 32 },
        );
        assert_eq!(
            err,
            Error::ResponseChainingExhausted {
                reader: "r".to_string(),
                exchanges: 32
            }
        );
        assert!(!err.is_io());

        let err = Error::apdu("r", cardbridge_apdu_core::Error::InvalidArgument("empty"));
        assert_eq!(err, Error::InvalidArgument("empty".to_string()));
    }

    #[test]
    fn test_cancel_message_names_the_task() {
        let err = Error::TaskCanceled {
            reader: "Reader 0".to_string(),
            task: WaitTask::CardRemoval,
        };
        assert!(err.is_canceled());
        assert_eq!(
            err.to_string(),
            "Reader 0: the wait for the card removal task has been cancelled"
        );
    }
}

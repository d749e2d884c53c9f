//! Mapping of PC/SC errors onto transport errors

use cardbridge_apdu_core::TransportError;

/// Translate a middleware error
pub fn map_error(error: pcsc::Error) -> TransportError {
    match error {
        pcsc::Error::NoSmartcard => TransportError::NoCard,
        pcsc::Error::RemovedCard => TransportError::CardRemoved,
        pcsc::Error::ResetCard => TransportError::CardReset,
        pcsc::Error::NotTransacted => TransportError::NotTransacted,
        pcsc::Error::NoReadersAvailable => TransportError::NoReadersAvailable,
        pcsc::Error::NoService => TransportError::NoService,
        pcsc::Error::ServiceStopped => TransportError::ServiceStopped,
        pcsc::Error::SharingViolation => TransportError::Sharing,
        pcsc::Error::Timeout => TransportError::Timeout,
        pcsc::Error::Cancelled => TransportError::Cancelled,
        pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable => {
            TransportError::UnknownReader(error.to_string())
        }
        pcsc::Error::CommError | pcsc::Error::UnpoweredCard | pcsc::Error::UnresponsiveCard => {
            TransportError::Communication(error.to_string())
        }
        other => TransportError::Other(other.to_string()),
    }
}

/// Translate a middleware error raised while talking to `reader`
pub(crate) fn reader_error(reader: &str, error: pcsc::Error) -> TransportError {
    match map_error(error) {
        TransportError::UnknownReader(_) => TransportError::UnknownReader(reader.to_string()),
        other => other,
    }
}

//! PC/SC card connection

use std::{fmt, thread, time::Duration};

use bytes::Bytes;
use cardbridge_apdu_core::{
    Atr, CardConnection, Disposition, ProtocolSelector, TransportError, TransportProtocol,
};
use pcsc::{Card, Disposition as PcscDisposition, MAX_BUFFER_SIZE_EXTENDED, Protocols, ShareMode};
use tracing::{debug, trace};

use crate::{
    config::{pcsc_disposition, transport_protocol},
    error::reader_error,
};

/// Pause between two attempts to take a card another application holds
const EXCLUSIVE_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Run `attempt` until it stops failing with a sharing violation
///
/// Mirrors the blocking semantics of a card transaction: the caller waits for the
/// other application to release the card instead of failing.
fn retry_while_shared<F>(mut attempt: F, interval: Duration) -> Result<(), pcsc::Error>
where
    F: FnMut() -> Result<(), pcsc::Error>,
{
    let mut waiting = false;
    loop {
        match attempt() {
            Err(pcsc::Error::SharingViolation) => {
                if !waiting {
                    debug!("Card held by another application, waiting for it");
                    waiting = true;
                }
                thread::sleep(interval);
            }
            result => return result,
        }
    }
}

/// An open PC/SC connection
pub struct PcscConnection {
    /// Card handle
    card: Card,
    /// Reader name, for error reporting
    reader: String,
    /// ATR captured at connect time
    atr: Atr,
    /// Negotiated protocol
    protocol: TransportProtocol,
    /// Protocols requested at connect time, reused when reconnecting
    protocols: Protocols,
    /// Whether the card is held in exclusive mode
    exclusive: bool,
}

impl fmt::Debug for PcscConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscConnection")
            .field("reader", &self.reader)
            .field("atr", &self.atr)
            .field("protocol", &self.protocol)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

impl PcscConnection {
    /// Wrap a freshly connected card
    pub(crate) fn new(
        card: Card,
        reader: &str,
        selector: ProtocolSelector,
        protocols: Protocols,
    ) -> Result<Self, TransportError> {
        // a direct connection may exist without any card to report on
        let (atr, protocol) = if selector.is_direct() {
            (Atr::default(), TransportProtocol::Raw)
        } else {
            let status = card.status2_owned().map_err(|e| reader_error(reader, e))?;
            (
                Atr::from(status.atr()),
                transport_protocol(status.protocol2()),
            )
        };

        Ok(Self {
            card,
            reader: reader.to_string(),
            atr,
            protocol,
            protocols,
            exclusive: selector.is_exclusive(),
        })
    }

    /// Reader name
    pub fn reader(&self) -> &str {
        &self.reader
    }

    /// Whether the card is held in exclusive mode
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    fn reconnect(&mut self, share_mode: ShareMode) -> Result<(), TransportError> {
        let protocols = self.protocols;
        let card = &mut self.card;
        retry_while_shared(
            || card.reconnect(share_mode, protocols, PcscDisposition::LeaveCard),
            EXCLUSIVE_RETRY_INTERVAL,
        )
        .map_err(|e| reader_error(&self.reader, e))
    }
}

impl CardConnection for PcscConnection {
    fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    fn atr(&self) -> &Atr {
        &self.atr
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let mut buffer = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];
        let response = self
            .card
            .transmit(command, &mut buffer)
            .map_err(|e| reader_error(&self.reader, e))?;
        Ok(Bytes::copy_from_slice(response))
    }

    fn control(&mut self, code: u32, payload: &[u8]) -> Result<Bytes, TransportError> {
        let mut buffer = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];
        let response = self
            .card
            .control(code.into(), payload, &mut buffer)
            .map_err(|e| reader_error(&self.reader, e))?;
        Ok(Bytes::copy_from_slice(response))
    }

    // The card is held through the share mode: a `pcsc::Transaction` borrows the
    // card and cannot outlive a call. Taking it waits while another application
    // holds the card.
    fn begin_exclusive(&mut self) -> Result<(), TransportError> {
        if !self.exclusive {
            self.reconnect(ShareMode::Exclusive)?;
            self.exclusive = true;
            trace!(reader = %self.reader, "Card held in exclusive mode");
        }
        Ok(())
    }

    fn end_exclusive(&mut self) -> Result<(), TransportError> {
        if self.exclusive {
            self.reconnect(ShareMode::Shared)?;
            self.exclusive = false;
            trace!(reader = %self.reader, "Card shared again");
        }
        Ok(())
    }

    fn disconnect(self, disposition: Disposition) -> Result<(), TransportError> {
        trace!(reader = %self.reader, ?disposition, "Disconnecting card");
        self.card
            .disconnect(pcsc_disposition(disposition))
            .map_err(|(_, e)| reader_error(&self.reader, e))
    }
}

//! In-memory terminal and provider for tests

#![allow(unreachable_pub)]

use std::{collections::VecDeque, sync::Arc, thread, time::Duration};

use bytes::Bytes;
use cardbridge_apdu_core::{
    Atr, CardConnection, CardTerminal, Disposition, ProtocolSelector, TerminalProvider,
    TransportError, TransportProtocol,
};
use hex_literal::hex;
use parking_lot::{Mutex, MutexGuard};

/// Card sitting in a mock reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCard {
    pub atr: Atr,
    pub protocol: TransportProtocol,
}

impl MockCard {
    /// Contact card speaking T=1
    pub fn contact() -> Self {
        Self {
            atr: Atr::from(&hex!("3B6E00000031C071D6650000000000900000")[..]),
            protocol: TransportProtocol::T1,
        }
    }

    /// MIFARE Ultralight behind a PC/SC contactless reader
    pub fn mifare_ultralight() -> Self {
        Self {
            atr: Atr::from(&hex!("3B8F8001804F0CA0000003060300030000000068")[..]),
            protocol: TransportProtocol::T1,
        }
    }
}

/// Everything the mock middleware observed, plus knobs to script it
#[derive(Debug, Default)]
pub struct MockState {
    pub card: Option<MockCard>,
    /// Responses to return in order; `9000` once exhausted
    pub responses: VecDeque<Result<Bytes, TransportError>>,
    /// The card disappears after this many more transmissions
    pub remove_after_transmits: Option<usize>,
    pub connect_error: Option<TransportError>,
    pub control_error: Option<TransportError>,
    pub presence_error: Option<TransportError>,
    /// Returned by every disconnection, after it is recorded
    pub disconnect_error: Option<TransportError>,
    pub connects: Vec<ProtocolSelector>,
    pub commands: Vec<Bytes>,
    pub controls: Vec<(u32, Bytes)>,
    pub disconnects: Vec<Disposition>,
    pub exclusive_begun: usize,
    pub exclusive_ended: usize,
    pub present_waits: usize,
    pub absent_waits: usize,
}

/// Reader backed by a shared [`MockState`]
#[derive(Debug, Clone)]
pub struct MockTerminal {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTerminal {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::default(),
        }
    }

    pub fn with_card(name: &str, card: MockCard) -> Self {
        let terminal = Self::empty(name);
        terminal.insert_card(card);
        terminal
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    pub fn insert_card(&self, card: MockCard) {
        self.state.lock().card = Some(card);
    }

    pub fn remove_card(&self) {
        self.state.lock().card = None;
    }

    pub fn push_response(&self, response: &[u8]) {
        self.state
            .lock()
            .responses
            .push_back(Ok(Bytes::copy_from_slice(response)));
    }
}

impl CardTerminal for MockTerminal {
    type Connection = MockConnection;

    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, selector: ProtocolSelector) -> Result<MockConnection, TransportError> {
        let mut state = self.state.lock();
        state.connects.push(selector);
        if let Some(e) = &state.connect_error {
            return Err(e.clone());
        }

        let (atr, protocol) = if selector.is_direct() {
            (Atr::default(), TransportProtocol::Raw)
        } else {
            let card = state.card.as_ref().ok_or(TransportError::NoCard)?;
            (card.atr.clone(), card.protocol)
        };

        Ok(MockConnection {
            state: Arc::clone(&self.state),
            atr,
            protocol,
        })
    }

    fn is_card_present(&self) -> Result<bool, TransportError> {
        let state = self.state.lock();
        match &state.presence_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.card.is_some()),
        }
    }

    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool, TransportError> {
        {
            let mut state = self.state.lock();
            state.present_waits += 1;
            if let Some(e) = &state.presence_error {
                return Err(e.clone());
            }
            if state.card.is_some() {
                return Ok(true);
            }
        }
        thread::sleep(timeout);
        Ok(self.state.lock().card.is_some())
    }

    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool, TransportError> {
        {
            let mut state = self.state.lock();
            state.absent_waits += 1;
            if let Some(e) = &state.presence_error {
                return Err(e.clone());
            }
            if state.card.is_none() {
                return Ok(true);
            }
        }
        thread::sleep(timeout);
        Ok(self.state.lock().card.is_none())
    }
}

/// Connection produced by [`MockTerminal`]
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    atr: Atr,
    protocol: TransportProtocol,
}

impl CardConnection for MockConnection {
    fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    fn atr(&self) -> &Atr {
        &self.atr
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let mut state = self.state.lock();
        state.commands.push(Bytes::copy_from_slice(command));

        if let Some(remaining) = state.remove_after_transmits {
            if remaining == 0 {
                state.card = None;
            } else {
                state.remove_after_transmits = Some(remaining - 1);
            }
        }
        if state.card.is_none() {
            return Err(TransportError::CardRemoved);
        }

        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(Bytes::from_static(b"\x90\x00")))
    }

    fn control(&mut self, code: u32, payload: &[u8]) -> Result<Bytes, TransportError> {
        let mut state = self.state.lock();
        state.controls.push((code, Bytes::copy_from_slice(payload)));
        match &state.control_error {
            Some(e) => Err(e.clone()),
            None => Ok(Bytes::copy_from_slice(payload)),
        }
    }

    fn begin_exclusive(&mut self) -> Result<(), TransportError> {
        self.state.lock().exclusive_begun += 1;
        Ok(())
    }

    fn end_exclusive(&mut self) -> Result<(), TransportError> {
        self.state.lock().exclusive_ended += 1;
        Ok(())
    }

    fn disconnect(self, disposition: Disposition) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.disconnects.push(disposition);
        match &state.disconnect_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Provider over a fixed set of mock readers
#[derive(Debug, Default)]
pub struct MockProvider {
    pub terminals: Mutex<Vec<MockTerminal>>,
    pub error: Mutex<Option<TransportError>>,
}

impl MockProvider {
    pub fn new(terminals: Vec<MockTerminal>) -> Self {
        Self {
            terminals: Mutex::new(terminals),
            error: Mutex::new(None),
        }
    }

    pub fn failing(error: TransportError) -> Self {
        Self {
            terminals: Mutex::default(),
            error: Mutex::new(Some(error)),
        }
    }
}

impl TerminalProvider for MockProvider {
    type Terminal = MockTerminal;

    fn list_terminals(&self) -> Result<Vec<MockTerminal>, TransportError> {
        if let Some(e) = self.error.lock().as_ref() {
            return Err(e.clone());
        }
        Ok(self.terminals.lock().clone())
    }
}

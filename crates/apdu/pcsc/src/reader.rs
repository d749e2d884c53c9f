//! Reader representation for PC/SC devices

use std::{ffi::CString, fmt, time::Duration};

use cardbridge_apdu_core::{CardTerminal, ProtocolSelector, TransportError};
use parking_lot::Mutex;
use pcsc::{Context, ReaderState, Scope, State};
use tracing::trace;

use crate::{
    config::connect_parameters,
    error::{map_error, reader_error},
    transport::PcscConnection,
};

/// A PC/SC card reader
pub struct PcscTerminal {
    /// Name of the reader
    name: String,
    /// Name as handed to the middleware
    name_c: CString,
    /// Context used to connect
    context: Context,
    /// Context dedicated to blocking presence waits, established on first use
    monitor_context: Mutex<Option<Context>>,
}

impl fmt::Debug for PcscTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTerminal")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Whether a reader state reports a card
fn has_card(state: State) -> bool {
    state.contains(State::PRESENT) && !state.contains(State::EMPTY)
}

impl PcscTerminal {
    /// Create a reader from its middleware name
    pub(crate) fn new(context: Context, name: CString) -> Self {
        Self {
            name: name.to_string_lossy().into_owned(),
            name_c: name,
            context,
            monitor_context: Mutex::new(None),
        }
    }

    /// Context for presence waits
    ///
    /// Kept apart from the connection context so that a wait blocking for a whole
    /// monitoring cycle does not hold up APDU exchanges.
    fn monitor_context(&self) -> Result<Context, TransportError> {
        let mut slot = self.monitor_context.lock();
        if let Some(context) = slot.as_ref() {
            return Ok(context.clone());
        }
        let context = Context::establish(Scope::User).map_err(map_error)?;
        *slot = Some(context.clone());
        Ok(context)
    }

    /// Current reader state, without blocking
    fn current_state(&self, context: &Context) -> Result<ReaderState, TransportError> {
        let mut states = [ReaderState::new(self.name_c.clone(), State::UNAWARE)];
        context
            .get_status_change(None, &mut states)
            .map_err(|e| reader_error(&self.name, e))?;
        let [state] = states;
        // some services report a vanished reader through its state only
        if state.event_state().contains(State::UNKNOWN) {
            return Err(TransportError::UnknownReader(self.name.clone()));
        }
        Ok(state)
    }

    /// Block until the card presence equals `present` or `timeout` elapses
    fn wait_for(&self, timeout: Duration, present: bool) -> Result<bool, TransportError> {
        let context = self.monitor_context()?;
        let mut state = self.current_state(&context)?;
        if has_card(state.event_state()) == present {
            return Ok(true);
        }

        state.sync_current_state();
        let mut states = [state];
        match context.get_status_change(Some(timeout), &mut states) {
            Ok(()) => Ok(has_card(states[0].event_state()) == present),
            Err(pcsc::Error::Timeout) => Ok(false),
            Err(e) => {
                // a broken context is rebuilt at the next wait
                *self.monitor_context.lock() = None;
                Err(reader_error(&self.name, e))
            }
        }
    }
}

impl CardTerminal for PcscTerminal {
    type Connection = PcscConnection;

    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, selector: ProtocolSelector) -> Result<PcscConnection, TransportError> {
        let (share_mode, protocols) = connect_parameters(selector);
        trace!(reader = %self.name, %selector, ?share_mode, "Connecting");

        let card = self
            .context
            .connect(&self.name_c, share_mode, protocols)
            .map_err(|e| reader_error(&self.name, e))?;
        PcscConnection::new(card, &self.name, selector, protocols)
    }

    fn is_card_present(&self) -> Result<bool, TransportError> {
        let state = self.current_state(&self.context)?;
        Ok(has_card(state.event_state()))
    }

    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.wait_for(timeout, true)
    }

    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.wait_for(timeout, false)
    }
}

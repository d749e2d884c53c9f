//! Reader enumeration through a PC/SC context

use std::{ffi::CString, fmt};

use cardbridge_apdu_core::{TerminalProvider, TransportError};
use parking_lot::Mutex;
use pcsc::{Context, Scope};
use tracing::debug;

use crate::{error::map_error, reader::PcscTerminal};

/// Lists the readers known to the PC/SC service
pub struct PcscTerminalProvider {
    /// Resource manager context, replaced when the service goes away
    context: Mutex<Context>,
}

impl fmt::Debug for PcscTerminalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTerminalProvider").finish_non_exhaustive()
    }
}

impl PcscTerminalProvider {
    /// Establish a user-scope context
    pub fn establish() -> Result<Self, TransportError> {
        let context = Context::establish(Scope::User).map_err(map_error)?;
        Ok(Self::from_context(context))
    }

    /// Wrap an existing context
    pub fn from_context(context: Context) -> Self {
        Self {
            context: Mutex::new(context),
        }
    }

    /// Reader named `name`, without checking that it is connected
    pub fn terminal(&self, name: &str) -> Result<PcscTerminal, TransportError> {
        let name_c =
            CString::new(name).map_err(|_| TransportError::UnknownReader(name.to_string()))?;
        Ok(PcscTerminal::new(self.context.lock().clone(), name_c))
    }

    fn renew_context(&self) {
        match Context::establish(Scope::User) {
            Ok(context) => {
                debug!("PC/SC context re-established");
                *self.context.lock() = context;
            }
            Err(e) => debug!("PC/SC context still unavailable: {}", e),
        }
    }
}

impl TerminalProvider for PcscTerminalProvider {
    type Terminal = PcscTerminal;

    fn list_terminals(&self) -> Result<Vec<PcscTerminal>, TransportError> {
        let context = self.context.lock().clone();
        match context.list_readers_owned() {
            Ok(names) => Ok(names
                .into_iter()
                .map(|name| PcscTerminal::new(context.clone(), name))
                .collect()),
            Err(e) => {
                // a restarted service invalidates every context created before it
                if matches!(
                    e,
                    pcsc::Error::InvalidHandle | pcsc::Error::NoService | pcsc::Error::ServiceStopped
                ) {
                    self.renew_context();
                }
                Err(map_error(e))
            }
        }
    }
}

//! Card session: one connection to the card in a reader
//!
//! The session owns the native connection and, in exclusive mode, the card
//! transaction lock. It is not synchronised; the owning reader serialises access.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use cardbridge_apdu_core::{
    ApduTransceiver, Atr, CardConnection, CardTerminal, Disposition, IsoProtocol,
    ProtocolSelector, TransportError, TransportProtocol,
};
use tracing::{debug, trace, warn};

use crate::{
    config::{DisconnectionMode, SharingMode},
    control::ControlPlatform,
    error::{Error, Result},
};

/// Connection state for one reader
pub struct CardSession<T: CardTerminal> {
    terminal: Arc<T>,
    transceiver: ApduTransceiver,
    platform: ControlPlatform,
    sharing_mode: SharingMode,
    disconnection_mode: DisconnectionMode,
    selector: ProtocolSelector,
    connection: Option<T::Connection>,
    exclusive: bool,
}

impl<T: CardTerminal> fmt::Debug for CardSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSession")
            .field("reader", &self.terminal.name())
            .field("sharing_mode", &self.sharing_mode)
            .field("disconnection_mode", &self.disconnection_mode)
            .field("selector", &self.selector)
            .field("open", &self.connection.is_some())
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

impl<T: CardTerminal> CardSession<T> {
    /// Closed session on `terminal`
    pub fn new(terminal: Arc<T>) -> Self {
        Self {
            terminal,
            transceiver: ApduTransceiver::new(),
            platform: ControlPlatform::current(),
            sharing_mode: SharingMode::default(),
            disconnection_mode: DisconnectionMode::default(),
            selector: ProtocolSelector::default(),
            connection: None,
            exclusive: false,
        }
    }

    /// Override the control code encoding
    pub fn set_platform(&mut self, platform: ControlPlatform) {
        self.platform = platform;
    }

    /// Reader name
    pub fn name(&self) -> &str {
        self.terminal.name()
    }

    /// Whether a connection is open
    pub const fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the exclusive transaction lock is held
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Selector of the current (or last) connection
    pub const fn selector(&self) -> ProtocolSelector {
        self.selector
    }

    /// Protocol negotiated for the open connection
    pub fn protocol(&self) -> Option<TransportProtocol> {
        self.connection.as_ref().map(CardConnection::protocol)
    }

    /// Control code encoding in use
    pub const fn platform(&self) -> ControlPlatform {
        self.platform
    }

    /// Sharing mode applied to the next opening
    pub const fn sharing_mode(&self) -> SharingMode {
        self.sharing_mode
    }

    /// Disposition mode applied on close
    pub const fn disconnection_mode(&self) -> DisconnectionMode {
        self.disconnection_mode
    }

    /// Connect to the card; does nothing when already open
    pub fn open(&mut self, selector: ProtocolSelector) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        debug!(
            reader = %self.name(),
            protocol = %selector,
            sharing = %self.sharing_mode,
            "Opening card physical channel"
        );

        let mut connection = self
            .terminal
            .connect(selector)
            .map_err(|e| self.connect_error(e))?;

        if self.sharing_mode == SharingMode::Exclusive && !selector.is_direct() {
            if let Err(e) = connection.begin_exclusive() {
                if let Err(release) = connection.disconnect(Disposition::Leave) {
                    warn!(reader = %self.name(), error = %release, "Failed to release connection");
                }
                return Err(Error::transport(self.name(), e));
            }
            self.exclusive = true;
            trace!(reader = %self.name(), "Exclusive access to the card acquired");
        }

        debug!(
            reader = %self.name(),
            atr = %connection.atr(),
            protocol = %connection.protocol(),
            "Card physical channel opened"
        );

        self.selector = selector;
        self.connection = Some(connection);
        Ok(())
    }

    /// Disconnect with the configured disposition; does nothing when closed
    ///
    /// The session is closed afterwards even if the middleware reported an error.
    pub fn close(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        self.exclusive = false;

        let mode = self.disconnection_mode;
        debug!(reader = %self.name(), disposition = %mode, "Closing card physical channel");

        connection
            .disconnect(mode.disposition())
            .map_err(|e| Error::transport(self.name(), e))?;

        if mode == DisconnectionMode::Unpower {
            self.reset_reader_state();
        }
        Ok(())
    }

    /// Bring a powered down card back to a known state with a throwaway connection
    fn reset_reader_state(&self) {
        match self.terminal.connect(ProtocolSelector::new(IsoProtocol::Any)) {
            Ok(connection) => {
                if let Err(e) = connection.disconnect(Disposition::Leave) {
                    trace!(reader = %self.name(), error = %e, "Ignoring reader reset failure");
                }
            }
            Err(e) => trace!(reader = %self.name(), error = %e, "Ignoring reader reset failure"),
        }
    }

    /// Change the sharing mode
    ///
    /// Switching to shared while the exclusive lock is held releases the lock at
    /// once. Switching to exclusive takes effect at the next opening.
    pub fn set_sharing_mode(&mut self, mode: SharingMode) -> Result<()> {
        if mode == SharingMode::Shared && self.exclusive {
            if let Some(connection) = self.connection.as_mut() {
                connection
                    .end_exclusive()
                    .map_err(|e| Error::transport(self.terminal.name(), e))?;
                trace!(reader = %self.terminal.name(), "Exclusive access to the card released");
            }
            self.exclusive = false;
        }
        self.sharing_mode = mode;
        Ok(())
    }

    /// Change the disposition applied on close
    pub fn set_disconnection_mode(&mut self, mode: DisconnectionMode) {
        self.disconnection_mode = mode;
    }

    /// ATR of the connected card
    pub fn atr(&self) -> Result<&Atr> {
        self.connection
            .as_ref()
            .map(CardConnection::atr)
            .ok_or_else(|| self.not_open())
    }

    /// Exchange one APDU, resolving response chaining
    ///
    /// A transport failure closes the session.
    pub fn transmit(&mut self, command: &[u8]) -> Result<Bytes> {
        if command.is_empty() {
            return Err(Error::InvalidArgument("command cannot be empty".to_string()));
        }
        let Some(connection) = self.connection.as_mut() else {
            return Err(self.not_open());
        };

        match self.transceiver.transmit(connection, command) {
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_transport() {
                    self.drop_connection();
                }
                Err(Error::apdu(self.terminal.name(), e))
            }
        }
    }

    /// Send a control command identified by its logical id
    ///
    /// Uses the open connection if any. Otherwise a direct connection to the reader
    /// is made for the command and released right after.
    pub fn transmit_control(&mut self, command_id: u32, payload: &[u8]) -> Result<Bytes> {
        let code = self.platform.control_code(command_id);
        trace!(
            reader = %self.terminal.name(),
            command_id,
            code = format_args!("{code:#010X}"),
            "Transmitting control command"
        );

        if let Some(connection) = self.connection.as_mut() {
            return connection
                .control(code, payload)
                .map_err(|e| self.reader_error(e));
        }

        let mut direct = self
            .terminal
            .connect(ProtocolSelector::direct())
            .map_err(|e| self.reader_error(e))?;
        let result = direct.control(code, payload);
        if let Err(e) = direct.disconnect(Disposition::Leave) {
            warn!(reader = %self.terminal.name(), error = %e, "Failed to release direct connection");
        }
        result.map_err(|e| self.reader_error(e))
    }

    /// Release a connection that can no longer be trusted, without disposition
    fn drop_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.exclusive = false;
            debug!(reader = %self.terminal.name(), "Dropping card physical channel after failure");
            if let Err(e) = connection.disconnect(Disposition::Leave) {
                trace!(reader = %self.terminal.name(), error = %e, "Ignoring disconnection failure");
            }
        }
    }

    fn connect_error(&self, error: TransportError) -> Error {
        if error.is_card_absent() {
            Error::CardNotPresent {
                reader: self.name().to_string(),
            }
        } else {
            self.reader_error(error)
        }
    }

    fn reader_error(&self, source: TransportError) -> Error {
        Error::ReaderCommunication {
            reader: self.terminal.name().to_string(),
            source,
        }
    }

    fn not_open(&self) -> Error {
        Error::ReaderState(format!(
            "{}: card physical channel is not open",
            self.terminal.name()
        ))
    }
}

impl<T: CardTerminal> Drop for CardSession<T> {
    fn drop(&mut self) {
        if self.connection.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close card session on drop");
            }
        }
    }
}

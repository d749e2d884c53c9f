//! Reader adapter
//!
//! One [`ReaderAdapter`] per physical reader. Every method takes `&self`: the card
//! session sits behind a lock so that a monitoring thread can run blocking waits
//! while another thread stops them or exchanges APDUs.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use cardbridge_apdu_core::{
    Atr, CardTerminal, IsoProtocol, ProtocolSelector, TransportError,
    command::GET_RESPONSE_PROBE,
};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    config::{DisconnectionMode, SharingMode},
    control::ControlPlatform,
    error::{Error, Result},
    monitor::{MonitorState, PresenceSource, ReaderMonitor, RemovalStrategy},
    plugin::PluginContext,
    session::CardSession,
    spi::{ChannelTransceiver, NamedReader, PresenceMonitor, ProtocolClassifiable},
};

#[derive(Debug, Clone, Copy, Default)]
struct ReaderSettings {
    iso_protocol: IsoProtocol,
    /// Resolved from the reader name on first use unless set explicitly
    contactless: Option<bool>,
}

/// A physical reader with its card session and presence monitor
#[derive(Debug)]
pub struct ReaderAdapter<T: CardTerminal> {
    name: String,
    terminal: Arc<T>,
    context: Arc<PluginContext>,
    session: Mutex<CardSession<T>>,
    settings: Mutex<ReaderSettings>,
    monitor: ReaderMonitor,
}

impl<T: CardTerminal> ReaderAdapter<T> {
    /// Adapter over `terminal`, sharing the plugin `context`
    pub fn new(terminal: T, context: Arc<PluginContext>) -> Self {
        let name = terminal.name().to_string();
        let terminal = Arc::new(terminal);
        debug!(reader = %name, "Creating reader adapter");
        Self {
            monitor: ReaderMonitor::new(name.clone(), context.card_monitoring_cycle()),
            session: Mutex::new(CardSession::new(Arc::clone(&terminal))),
            settings: Mutex::default(),
            name,
            terminal,
            context,
        }
    }

    /// Override the control code encoding
    pub fn with_control_platform(self, platform: ControlPlatform) -> Self {
        self.session.lock().set_platform(platform);
        self
    }

    /// Reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin configuration
    pub const fn context(&self) -> &Arc<PluginContext> {
        &self.context
    }

    /// Native reader
    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    /// Current monitoring state
    pub fn monitor_state(&self) -> MonitorState {
        self.monitor.state()
    }

    /// Card protocol requested at the next connection
    pub fn iso_protocol(&self) -> IsoProtocol {
        self.settings.lock().iso_protocol
    }

    /// Set the card protocol requested at the next connection
    pub fn set_iso_protocol(&self, protocol: IsoProtocol) -> &Self {
        trace!(reader = %self.name, %protocol, "Setting ISO protocol");
        self.settings.lock().iso_protocol = protocol;
        self
    }

    /// Sharing mode of the card session
    pub fn sharing_mode(&self) -> SharingMode {
        self.session.lock().sharing_mode()
    }

    /// Set the sharing mode; going shared releases a held exclusive lock at once
    pub fn set_sharing_mode(&self, mode: SharingMode) -> Result<&Self> {
        trace!(reader = %self.name, %mode, "Setting sharing mode");
        self.session.lock().set_sharing_mode(mode)?;
        Ok(self)
    }

    /// Disposition mode applied on disconnection
    pub fn disconnection_mode(&self) -> DisconnectionMode {
        self.session.lock().disconnection_mode()
    }

    /// Set the disposition mode applied on disconnection
    pub fn set_disconnection_mode(&self, mode: DisconnectionMode) -> &Self {
        trace!(reader = %self.name, %mode, "Setting disconnection mode");
        self.session.lock().set_disconnection_mode(mode);
        self
    }

    /// Force the contactless flag instead of deriving it from the reader name
    pub fn set_contactless(&self, contactless: bool) -> &Self {
        self.settings.lock().contactless = Some(contactless);
        self
    }

    /// Logical id of the CCID escape command on this platform
    pub fn ccid_escape_command_id(&self) -> u32 {
        self.session.lock().platform().ccid_escape_command_id()
    }

    /// ATR of the connected card
    pub fn atr(&self) -> Result<Atr> {
        self.session.lock().atr().cloned()
    }

    /// Close the card session now, even while observation is active
    pub fn disconnect(&self) -> Result<()> {
        self.session.lock().close()
    }

    /// Block until the card being processed is removed
    ///
    /// Same as [`PresenceMonitor::wait_for_card_removal`]: returns
    /// [`Error::TaskCanceled`] when stopped through
    /// [`stop_card_presence_monitoring_during_processing`](Self::stop_card_presence_monitoring_during_processing).
    pub fn monitor_card_presence_during_processing(&self) -> Result<()> {
        self.wait_for_card_removal()
    }

    /// Stop a pending [`monitor_card_presence_during_processing`](Self::monitor_card_presence_during_processing)
    pub fn stop_card_presence_monitoring_during_processing(&self) {
        self.stop_wait_for_card_removal();
    }

    fn reader_error(&self, source: TransportError) -> Error {
        Error::ReaderCommunication {
            reader: self.name.clone(),
            source,
        }
    }
}

impl<T: CardTerminal> NamedReader for ReaderAdapter<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: CardTerminal> ProtocolClassifiable for ReaderAdapter<T> {
    fn is_protocol_supported(&self, protocol: &str) -> bool {
        self.context.registry().contains(protocol)
    }

    fn activate_protocol(&self, protocol: &str) {
        trace!(reader = %self.name, protocol, "Activating protocol");
        // a host activating a protocol starts a fresh detection cycle
        self.monitor.stop_insertion_wait();
    }

    fn deactivate_protocol(&self, protocol: &str) {
        trace!(reader = %self.name, protocol, "Deactivating protocol");
    }

    fn is_current_protocol(&self, protocol: &str) -> bool {
        self.session
            .lock()
            .atr()
            .is_ok_and(|atr| self.context.classifier().matches_atr(atr, protocol))
    }

    fn is_contactless(&self) -> bool {
        let mut settings = self.settings.lock();
        *settings
            .contactless
            .get_or_insert_with(|| self.context.is_contactless(&self.name))
    }
}

impl<T: CardTerminal> ChannelTransceiver for ReaderAdapter<T> {
    fn open_physical_channel(&self) -> Result<()> {
        let selector = ProtocolSelector::new(self.iso_protocol());
        self.session.lock().open(selector)
    }

    fn close_physical_channel(&self) -> Result<()> {
        if self.monitor.is_observation_active() {
            trace!(reader = %self.name, "Card processing observed, keeping the channel open");
            return Ok(());
        }
        self.disconnect()
    }

    fn is_physical_channel_open(&self) -> bool {
        self.session.lock().is_open()
    }

    fn check_card_presence(&self) -> Result<bool> {
        let present = self
            .terminal
            .is_card_present()
            .map_err(|e| self.reader_error(e))?;
        trace!(reader = %self.name, present, "Card presence checked");
        if let Err(e) = self.disconnect() {
            debug!(reader = %self.name, error = %e, "Ignoring disconnection failure");
        }
        Ok(present)
    }

    fn power_on_data(&self) -> Result<String> {
        self.session.lock().atr().map(Atr::to_hex)
    }

    fn transmit_apdu(&self, command: &[u8]) -> Result<Bytes> {
        if command.is_empty() {
            return Err(Error::InvalidArgument("command cannot be empty".to_string()));
        }
        let selector = ProtocolSelector::new(self.iso_protocol());
        let mut session = self.session.lock();
        session.open(selector)?;
        session.transmit(command)
    }

    fn transmit_control_command(&self, command_id: u32, payload: &[u8]) -> Result<Bytes> {
        self.session.lock().transmit_control(command_id, payload)
    }
}

impl<T: CardTerminal> PresenceSource for ReaderAdapter<T> {
    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool> {
        self.terminal
            .wait_for_card_present(timeout)
            .map_err(|e| self.reader_error(e))
    }

    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool> {
        self.terminal
            .wait_for_card_absent(timeout)
            .map_err(|e| self.reader_error(e))
    }

    fn probe(&self) -> Result<()> {
        self.transmit_apdu(&GET_RESPONSE_PROBE).map(drop)
    }

    fn finalize(&self) -> Result<()> {
        self.disconnect()
    }
}

impl<T: CardTerminal> PresenceMonitor for ReaderAdapter<T> {
    fn wait_for_card_insertion(&self) -> Result<()> {
        self.monitor.wait_for_insertion(self)
    }

    fn stop_wait_for_card_insertion(&self) {
        trace!(reader = %self.name, "Stopping card insertion wait");
        self.monitor.stop_insertion_wait();
    }

    fn wait_for_card_removal(&self) -> Result<()> {
        let strategy = RemovalStrategy::for_mode(self.disconnection_mode());
        self.monitor.wait_for_removal(self, strategy)
    }

    fn stop_wait_for_card_removal(&self) {
        trace!(reader = %self.name, "Stopping card removal wait");
        self.monitor.stop_removal_wait();
    }

    fn on_start_detection(&self) {
        self.monitor.set_observation_active(true);
    }

    fn on_stop_detection(&self) {
        self.monitor.set_observation_active(false);
    }
}

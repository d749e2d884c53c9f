//! Capabilities a reader exposes to the host
//!
//! Hosts depend on the capability they use rather than on a concrete reader type.
//! [`ReaderAdapter`](crate::ReaderAdapter) implements all of them.

use bytes::Bytes;

use crate::error::Result;

/// Any reader
pub trait NamedReader {
    /// Reader name as reported by the middleware
    fn name(&self) -> &str;
}

/// ATR based protocol identification
pub trait ProtocolClassifiable: NamedReader {
    /// Whether a rule exists for `protocol`
    fn is_protocol_supported(&self, protocol: &str) -> bool;

    /// The host started using `protocol`
    fn activate_protocol(&self, protocol: &str);

    /// The host stopped using `protocol`
    fn deactivate_protocol(&self, protocol: &str);

    /// Whether the inserted card's ATR matches the rule of `protocol`
    fn is_current_protocol(&self, protocol: &str) -> bool;

    /// Whether the reader has a contactless interface
    fn is_contactless(&self) -> bool;
}

/// Card channel and APDU exchange
pub trait ChannelTransceiver: NamedReader {
    /// Connect to the card
    fn open_physical_channel(&self) -> Result<()>;

    /// Release the card, unless card processing is being observed
    fn close_physical_channel(&self) -> Result<()>;

    /// Whether a connection to the card is open
    fn is_physical_channel_open(&self) -> bool;

    /// Whether a card sits in the reader
    fn check_card_presence(&self) -> Result<bool>;

    /// Uppercase hexadecimal ATR of the connected card
    fn power_on_data(&self) -> Result<String>;

    /// Exchange one APDU, connecting first when needed
    fn transmit_apdu(&self, command: &[u8]) -> Result<Bytes>;

    /// Send a reader control command identified by its logical id
    fn transmit_control_command(&self, command_id: u32, payload: &[u8]) -> Result<Bytes>;
}

/// Blocking card presence monitoring
pub trait PresenceMonitor: NamedReader {
    /// Block until a card is inserted or the wait is stopped
    fn wait_for_card_insertion(&self) -> Result<()>;

    /// Stop a running insertion wait
    fn stop_wait_for_card_insertion(&self);

    /// Block until the card is removed or the wait is stopped
    fn wait_for_card_removal(&self) -> Result<()>;

    /// Stop a running removal wait
    fn stop_wait_for_card_removal(&self);

    /// The host starts watching card processing
    fn on_start_detection(&self);

    /// The host stops watching card processing
    fn on_stop_detection(&self);
}

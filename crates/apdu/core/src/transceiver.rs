//! APDU transceiver with T=0/T=1 response chaining
//!
//! One call to [`ApduTransceiver::transmit`] is one logical APDU exchange. Behind it
//! the transceiver may perform several native transmissions:
//!
//! - `6C xx` as the whole response: the card asks for the same command again with
//!   Le = `xx`. Nothing is accumulated.
//! - `.. 61 xx`: the data before the status word is accumulated and a
//!   GET RESPONSE `{CLA, C0, 00, 00, xx}` fetches the rest.
//! - anything else ends the exchange; the response, status word included, is
//!   appended to the result.
//!
//! Transport failures are never retried here.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::{
    command::{SW1_MORE_DATA, SW1_WRONG_LENGTH, get_response, outgoing_length},
    error::{Error, Result},
    transport::{CardConnection, TransportProtocol},
};

/// Maximum number of native transmissions for one logical APDU
pub const MAX_EXCHANGES: usize = 32;

/// Drives one logical APDU exchange over an open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApduTransceiver {
    /// Native transmissions allowed before giving up
    max_exchanges: usize,
    /// Resolve `61xx`/`6Cxx` automatically over T=0
    t0_get_response: bool,
    /// Resolve `61xx`/`6Cxx` automatically over T=1
    t1_get_response: bool,
}

impl Default for ApduTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl ApduTransceiver {
    /// Transceiver with automatic GET RESPONSE for both T=0 and T=1
    pub const fn new() -> Self {
        Self {
            max_exchanges: MAX_EXCHANGES,
            t0_get_response: true,
            t1_get_response: true,
        }
    }

    /// Set the exchange ceiling
    pub const fn with_max_exchanges(mut self, max_exchanges: usize) -> Self {
        self.max_exchanges = max_exchanges;
        self
    }

    /// Enable or disable automatic GET RESPONSE over T=0
    pub const fn with_t0_get_response(mut self, enabled: bool) -> Self {
        self.t0_get_response = enabled;
        self
    }

    /// Enable or disable automatic GET RESPONSE over T=1
    pub const fn with_t1_get_response(mut self, enabled: bool) -> Self {
        self.t1_get_response = enabled;
        self
    }

    /// Exchange ceiling
    pub const fn max_exchanges(&self) -> usize {
        self.max_exchanges
    }

    const fn chaining_enabled(&self, protocol: TransportProtocol) -> bool {
        match protocol {
            TransportProtocol::T0 => self.t0_get_response,
            TransportProtocol::T1 => self.t1_get_response,
            TransportProtocol::Raw => false,
        }
    }

    /// Exchange `command` with the card and return the accumulated response
    ///
    /// The returned bytes end with the final status word.
    pub fn transmit<C>(&self, connection: &mut C, command: &[u8]) -> Result<Bytes>
    where
        C: CardConnection + ?Sized,
    {
        if command.is_empty() {
            return Err(Error::InvalidArgument("command cannot be empty"));
        }

        let protocol = connection.protocol();
        let chaining = self.chaining_enabled(protocol);

        // the buffer is rewritten in place by 6Cxx and replaced by 61xx
        let mut buffer = command.to_vec();
        let mut len = outgoing_length(protocol, &buffer)?;

        let mut result = BytesMut::new();
        let mut exchanges = 0;

        loop {
            if exchanges >= self.max_exchanges {
                return Err(Error::ResponseChainingExhausted { exchanges });
            }
            exchanges += 1;

            let response = connection.transmit_raw(&buffer[..len])?;
            let rn = response.len();

            if chaining && rn >= 2 {
                if rn == 2 && response[0] == SW1_WRONG_LENGTH {
                    trace!(le = response[1], "Wrong length, resending with card supplied Le");
                    if len == 4 {
                        // header only, Le has to be appended
                        buffer.truncate(4);
                        buffer.push(response[1]);
                        len = 5;
                    } else {
                        buffer[len - 1] = response[1];
                    }
                    continue;
                }

                if response[rn - 2] == SW1_MORE_DATA {
                    trace!(available = response[rn - 1], "More data available, sending GET RESPONSE");
                    if rn > 2 {
                        result.extend_from_slice(&response[..rn - 2]);
                    }
                    buffer = get_response(buffer[0], response[rn - 1]).to_vec();
                    len = buffer.len();
                    continue;
                }
            }

            result.extend_from_slice(&response);
            return Ok(result.freeze());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockConnection, TransportError};
    use hex_literal::hex;

    #[test]
    fn test_empty_command_is_rejected_before_transmission() {
        let mut connection = MockConnection::repeating(TransportProtocol::T1, &hex!("9000"));
        let err = ApduTransceiver::new()
            .transmit(&mut connection, &[])
            .unwrap_err();
        assert_eq!(err, Error::InvalidArgument("command cannot be empty"));
        assert!(connection.commands.is_empty());
    }

    #[test]
    fn test_plain_exchange() {
        let mut connection =
            MockConnection::repeating(TransportProtocol::T1, &hex!("0102039000"));
        let response = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("00B0000003"))
            .unwrap();
        assert_eq!(&response[..], hex!("0102039000"));
        assert_eq!(connection.commands.len(), 1);
    }

    #[test]
    fn test_wrong_length_resends_with_card_le() {
        let mut connection = MockConnection::new(
            TransportProtocol::T0,
            &[&hex!("6C05"), &hex!("11223344559000")],
        );
        let response = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("00C0000000"))
            .unwrap();

        assert_eq!(connection.commands.len(), 2);
        assert_eq!(&connection.commands[0][..], hex!("00C0000000"));
        assert_eq!(&connection.commands[1][..], hex!("00C0000005"));
        // nothing from the 6C05 answer leaks into the result
        assert_eq!(&response[..], hex!("11223344559000"));
        let (sw1, _) = crate::command::status_word(&response).unwrap();
        assert!(sw1 != 0x61 && sw1 != 0x6C);
    }

    #[test]
    fn test_wrong_length_on_header_only_command_appends_le() {
        let mut connection =
            MockConnection::new(TransportProtocol::T1, &[&hex!("6C02"), &hex!("AABB9000")]);
        ApduTransceiver::new()
            .transmit(&mut connection, &hex!("80CA9F7F"))
            .unwrap();
        assert_eq!(&connection.commands[1][..], hex!("80CA9F7F02"));
    }

    #[test]
    fn test_more_data_triggers_single_get_response() {
        let mut connection = MockConnection::new(
            TransportProtocol::T0,
            &[&hex!("AABBCC610A"), &hex!("000102030405060708099000")],
        );
        let response = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("80CA9F7F00"))
            .unwrap();

        assert_eq!(connection.commands.len(), 2);
        assert_eq!(&connection.commands[1][..], hex!("80C000000A"));
        assert_eq!(
            &response[..],
            hex!("AABBCC000102030405060708099000")
        );
    }

    #[test]
    fn test_get_response_chain_keeps_command_cla() {
        let mut connection = MockConnection::new(
            TransportProtocol::T1,
            &[&hex!("6102"), &hex!("01026101"), &hex!("039000")],
        );
        let response = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("84F2200000"))
            .unwrap();

        assert_eq!(&connection.commands[1][..], hex!("84C0000002"));
        assert_eq!(&connection.commands[2][..], hex!("84C0000001"));
        assert_eq!(&response[..], hex!("0102039000"));
    }

    #[test]
    fn test_le_trimmed_before_first_send() {
        let mut connection = MockConnection::repeating(TransportProtocol::T0, &hex!("6110"));
        let _ = ApduTransceiver::new()
            .with_max_exchanges(2)
            .transmit(&mut connection, &hex!("00A4040002AABB00"));
        assert_eq!(&connection.commands[0][..], hex!("00A4040002AABB"));
    }

    #[test]
    fn test_extended_length_rejected_over_t0() {
        let mut connection = MockConnection::repeating(TransportProtocol::T0, &hex!("9000"));
        let err = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("00A40400000002AABB0000"))
            .unwrap_err();
        assert_eq!(err, Error::ExtendedLengthNotSupported);
        assert!(connection.commands.is_empty());
    }

    #[test]
    fn test_chaining_ceiling() {
        let mut connection = MockConnection::repeating(TransportProtocol::T1, &hex!("6101"));
        let err = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("00B0000000"))
            .unwrap_err();
        assert_eq!(err, Error::ResponseChainingExhausted { exchanges: MAX_EXCHANGES });
        assert_eq!(connection.commands.len(), MAX_EXCHANGES);
    }

    #[test]
    fn test_raw_protocol_passes_status_through() {
        let mut connection = MockConnection::repeating(TransportProtocol::Raw, &hex!("610A"));
        let response = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("FFCA000000"))
            .unwrap();
        assert_eq!(&response[..], hex!("610A"));
        assert_eq!(connection.commands.len(), 1);
    }

    #[test]
    fn test_disabled_get_response() {
        let mut connection = MockConnection::repeating(TransportProtocol::T0, &hex!("6C05"));
        let response = ApduTransceiver::new()
            .with_t0_get_response(false)
            .transmit(&mut connection, &hex!("00C0000000"))
            .unwrap();
        assert_eq!(&response[..], hex!("6C05"));
    }

    #[test]
    fn test_transport_error_propagates_immediately() {
        let mut connection = MockConnection::new(TransportProtocol::T1, &[]);
        let err = ApduTransceiver::new()
            .transmit(&mut connection, &hex!("00B0000000"))
            .unwrap_err();
        assert_eq!(err, Error::Transport(TransportError::CardRemoved));
        assert!(err.is_transport());
        assert_eq!(connection.commands.len(), 1);
    }
}

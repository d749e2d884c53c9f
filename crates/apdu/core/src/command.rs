//! ISO/IEC 7816-4 command helpers used by the transceiver
//!
//! Commands are carried as opaque byte buffers; these helpers only look at the
//! header and length fields needed for response chaining.

use crate::{error::Error, transport::TransportProtocol};

/// GET RESPONSE instruction byte
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// SW1 announcing that SW2 more response bytes are available
pub const SW1_MORE_DATA: u8 = 0x61;

/// SW1 announcing a wrong Le, SW2 carrying the exact length
pub const SW1_WRONG_LENGTH: u8 = 0x6C;

/// GET RESPONSE without data, used as a lightweight presence probe
pub const GET_RESPONSE_PROBE: [u8; 5] = get_response(0x00, 0x00);

/// Build a GET RESPONSE command `{CLA, C0, 00, 00, Le}`
pub const fn get_response(cla: u8, le: u8) -> [u8; 5] {
    [cla, INS_GET_RESPONSE, 0x00, 0x00, le]
}

/// Split the trailing status word off a response
pub fn status_word(response: &[u8]) -> Option<(u8, u8)> {
    match response {
        [.., sw1, sw2] => Some((*sw1, *sw2)),
        _ => None,
    }
}

/// Number of leading command bytes to put on the wire for the first exchange
///
/// For T=0 and T=1 a trailing Le is dropped when the buffer is exactly
/// header + Lc + data + Le, since Le is supplied again by the chaining. T=0 cannot
/// carry an extended length field at all.
pub(crate) fn outgoing_length(protocol: TransportProtocol, command: &[u8]) -> Result<usize, Error> {
    let n = command.len();
    let t0 = protocol == TransportProtocol::T0;
    let t1 = protocol == TransportProtocol::T1;

    if t0 && n >= 7 && command[4] == 0 {
        return Err(Error::ExtendedLengthNotSupported);
    }

    if (t0 || t1) && n >= 7 {
        let lc = command[4] as usize;
        if lc != 0 {
            if n == lc + 6 {
                return Ok(n - 1);
            }
        } else {
            let lc = u16::from_be_bytes([command[5], command[6]]) as usize;
            if n == lc + 9 {
                return Ok(n - 2);
            }
        }
    }

    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_get_response_builder() {
        assert_eq!(get_response(0x80, 0x0A), hex!("80C000000A"));
        assert_eq!(GET_RESPONSE_PROBE, hex!("00C0000000"));
    }

    #[test]
    fn test_status_word() {
        assert_eq!(status_word(&hex!("AABB9000")), Some((0x90, 0x00)));
        assert_eq!(status_word(&hex!("6A82")), Some((0x6A, 0x82)));
        assert_eq!(status_word(&hex!("90")), None);
    }

    #[test]
    fn test_short_le_is_trimmed() {
        // case 4 short: header, Lc=2, 2 data bytes, Le
        let command = hex!("00A4040002AABB00");
        assert_eq!(outgoing_length(TransportProtocol::T1, &command), Ok(7));
        assert_eq!(outgoing_length(TransportProtocol::T0, &command), Ok(7));
        // no trimming outside T=0/T=1
        assert_eq!(outgoing_length(TransportProtocol::Raw, &command), Ok(8));
    }

    #[test]
    fn test_case3_is_not_trimmed() {
        let command = hex!("00A4040002AABB");
        assert_eq!(outgoing_length(TransportProtocol::T1, &command), Ok(7));
    }

    #[test]
    fn test_extended_le_is_trimmed_for_t1() {
        // case 4 extended: header, 00, Lc=0002, 2 data bytes, Le=0000
        let command = hex!("00A40400000002AABB0000");
        assert_eq!(outgoing_length(TransportProtocol::T1, &command), Ok(9));
    }

    #[test]
    fn test_extended_length_rejected_for_t0() {
        let command = hex!("00A40400000002AABB");
        assert_eq!(
            outgoing_length(TransportProtocol::T0, &command),
            Err(Error::ExtendedLengthNotSupported)
        );
    }
}

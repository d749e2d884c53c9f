//! Conversions between transport options and PC/SC connection parameters

use cardbridge_apdu_core::{Disposition, IsoProtocol, ProtocolSelector, TransportProtocol};
use pcsc::{Disposition as PcscDisposition, Protocol, Protocols, ShareMode};

/// Share mode and preferred protocols requested by `selector`
pub(crate) fn connect_parameters(selector: ProtocolSelector) -> (ShareMode, Protocols) {
    if selector.is_direct() {
        return (ShareMode::Direct, Protocols::UNDEFINED);
    }

    let share_mode = if selector.is_exclusive() {
        ShareMode::Exclusive
    } else {
        ShareMode::Shared
    };
    (share_mode, preferred_protocols(selector.protocol()))
}

/// Protocols acceptable for `protocol`
pub(crate) const fn preferred_protocols(protocol: IsoProtocol) -> Protocols {
    match protocol {
        IsoProtocol::T0 => Protocols::T0,
        IsoProtocol::T1 => Protocols::T1,
        IsoProtocol::Any => Protocols::ANY,
        IsoProtocol::Direct => Protocols::UNDEFINED,
    }
}

/// Protocol reported for an active connection
pub(crate) const fn transport_protocol(protocol: Option<Protocol>) -> TransportProtocol {
    match protocol {
        Some(Protocol::T0) => TransportProtocol::T0,
        Some(Protocol::T1) => TransportProtocol::T1,
        _ => TransportProtocol::Raw,
    }
}

/// Middleware disposition for `disposition`
pub(crate) const fn pcsc_disposition(disposition: Disposition) -> PcscDisposition {
    match disposition {
        Disposition::Leave => PcscDisposition::LeaveCard,
        Disposition::Reset => PcscDisposition::ResetCard,
        Disposition::Unpower => PcscDisposition::UnpowerCard,
        Disposition::Eject => PcscDisposition::EjectCard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_parameters() {
        let (mode, protocols) = connect_parameters(ProtocolSelector::new(IsoProtocol::T1));
        assert_eq!(mode, ShareMode::Shared);
        assert_eq!(protocols, Protocols::T1);

        let (mode, protocols) = connect_parameters(ProtocolSelector::exclusive(IsoProtocol::Any));
        assert_eq!(mode, ShareMode::Exclusive);
        assert_eq!(protocols, Protocols::ANY);

        let (mode, protocols) = connect_parameters(ProtocolSelector::direct());
        assert_eq!(mode, ShareMode::Direct);
        assert_eq!(protocols, Protocols::UNDEFINED);
    }

    #[test]
    fn test_protocol_and_disposition() {
        assert_eq!(transport_protocol(Some(Protocol::T0)), TransportProtocol::T0);
        assert_eq!(transport_protocol(None), TransportProtocol::Raw);
        assert_eq!(
            pcsc_disposition(Disposition::Unpower),
            PcscDisposition::UnpowerCard
        );
    }
}

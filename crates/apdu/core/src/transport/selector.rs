//! Connection selectors passed to [`CardTerminal::connect`](super::CardTerminal::connect)

use std::{fmt, str::FromStr};

/// Prefix requesting exclusive native sharing
const EXCLUSIVE_PREFIX: &str = "EXCLUSIVE;";

/// Transport protocol requested when connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsoProtocol {
    /// Let the middleware negotiate T=0 or T=1 (`*`)
    #[default]
    Any,
    /// ISO 7816-3 byte-oriented protocol (`T=0`)
    T0,
    /// ISO 7816-3 block-oriented protocol (`T=1`)
    T1,
    /// Direct reader access without a card, for control commands (`DIRECT`)
    Direct,
}

impl IsoProtocol {
    /// Textual form understood by [`ProtocolSelector::from_str`]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "*",
            Self::T0 => "T=0",
            Self::T1 => "T=1",
            Self::Direct => "DIRECT",
        }
    }
}

impl fmt::Display for IsoProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol and sharing request for a native connect
///
/// The textual form is one of `*`, `T=0`, `T=1` or `DIRECT`, optionally prefixed
/// with `EXCLUSIVE;` to request exclusive native sharing. `DIRECT` always connects
/// in direct sharing mode, the exclusive flag is irrelevant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProtocolSelector {
    protocol: IsoProtocol,
    exclusive: bool,
}

impl ProtocolSelector {
    /// Shared connection with the given protocol
    pub const fn new(protocol: IsoProtocol) -> Self {
        Self {
            protocol,
            exclusive: false,
        }
    }

    /// Exclusive connection with the given protocol
    pub const fn exclusive(protocol: IsoProtocol) -> Self {
        Self {
            protocol,
            exclusive: true,
        }
    }

    /// Direct reader connection for control commands
    pub const fn direct() -> Self {
        Self::new(IsoProtocol::Direct)
    }

    /// Set whether exclusive sharing is requested
    pub const fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Requested protocol
    pub const fn protocol(&self) -> IsoProtocol {
        self.protocol
    }

    /// Whether exclusive native sharing is requested
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive && !self.is_direct()
    }

    /// Whether this is a direct (control only) connection
    pub const fn is_direct(&self) -> bool {
        matches!(self.protocol, IsoProtocol::Direct)
    }
}

impl From<IsoProtocol> for ProtocolSelector {
    fn from(protocol: IsoProtocol) -> Self {
        Self::new(protocol)
    }
}

impl fmt::Display for ProtocolSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exclusive() {
            f.write_str(EXCLUSIVE_PREFIX)?;
        }
        f.write_str(self.protocol.as_str())
    }
}

/// Error returned when a selector string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Protocol should be one of (prepended with EXCLUSIVE;) T=0, T=1, *, DIRECT. Got {0}")]
pub struct ParseSelectorError(pub String);

impl FromStr for ProtocolSelector {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let (exclusive, protocol) = match upper.strip_prefix(EXCLUSIVE_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, upper.as_str()),
        };

        let protocol = match protocol {
            "*" => IsoProtocol::Any,
            "T=0" => IsoProtocol::T0,
            "T=1" => IsoProtocol::T1,
            "DIRECT" => IsoProtocol::Direct,
            _ => return Err(ParseSelectorError(s.to_string())),
        };

        Ok(Self::new(protocol).with_exclusive(exclusive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selectors() {
        assert_eq!(
            "*".parse::<ProtocolSelector>().unwrap(),
            ProtocolSelector::new(IsoProtocol::Any)
        );
        assert_eq!(
            "t=0".parse::<ProtocolSelector>().unwrap(),
            ProtocolSelector::new(IsoProtocol::T0)
        );
        assert_eq!(
            "exclusive;T=1".parse::<ProtocolSelector>().unwrap(),
            ProtocolSelector::exclusive(IsoProtocol::T1)
        );
        assert!("DIRECT".parse::<ProtocolSelector>().unwrap().is_direct());
    }

    #[test]
    fn test_parse_rejects_unknown_protocol() {
        let err = "T=CL".parse::<ProtocolSelector>().unwrap_err();
        assert_eq!(err, ParseSelectorError("T=CL".to_string()));
        assert!("EXCLUSIVE;".parse::<ProtocolSelector>().is_err());
    }

    #[test]
    fn test_display_round_trips_exclusive_prefix() {
        let selector = ProtocolSelector::exclusive(IsoProtocol::T0);
        assert_eq!(selector.to_string(), "EXCLUSIVE;T=0");

        // direct never carries the exclusive prefix
        let direct = ProtocolSelector::direct().with_exclusive(true);
        assert!(!direct.is_exclusive());
        assert_eq!(direct.to_string(), "DIRECT");
    }
}

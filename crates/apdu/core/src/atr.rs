//! Answer To Reset

use std::fmt;

use bytes::Bytes;

/// Answer To Reset captured when a connection is established
///
/// Protocol rules are written against the uppercase hexadecimal form returned by
/// [`Atr::to_hex`], so that is the only representation ever matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Atr(Bytes);

impl Atr {
    /// Wrap raw ATR bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Uppercase hexadecimal form without separators
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no byte was captured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Atr {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Atr {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<Bytes> for Atr {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Atr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Atr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_hex_is_uppercase() {
        let atr = Atr::from(&hex!("3b8f8001804f0ca0000003060300030000000068")[..]);
        assert_eq!(atr.to_hex(), "3B8F8001804F0CA0000003060300030000000068");
        assert_eq!(atr.to_string(), atr.to_hex());
        assert_eq!(atr.len(), 20);
    }

    #[test]
    fn test_empty_atr() {
        let atr = Atr::default();
        assert!(atr.is_empty());
        assert_eq!(atr.to_hex(), "");
    }
}

use cardbridge_apdu_core::Atr;
use tracing::trace;

use super::ProtocolRuleRegistry;

/// Decides which protocols an ATR belongs to
#[derive(Debug, Clone, Copy)]
pub struct AtrClassifier<'a> {
    registry: &'a ProtocolRuleRegistry,
}

impl<'a> AtrClassifier<'a> {
    /// Classifier over `registry`
    pub const fn new(registry: &'a ProtocolRuleRegistry) -> Self {
        Self { registry }
    }

    /// Whether the rule named `protocol` matches `atr_hex`
    ///
    /// An unknown protocol never matches.
    pub fn matches(&self, atr_hex: &str, protocol: &str) -> bool {
        match self.registry.get(protocol) {
            Ok(rule) => rule.matches(atr_hex),
            Err(e) => {
                trace!(error = %e, "No rule to classify ATR");
                false
            }
        }
    }

    /// Whether the rule named `protocol` matches `atr`
    pub fn matches_atr(&self, atr: &Atr, protocol: &str) -> bool {
        self.matches(&atr.to_hex(), protocol)
    }

    /// Names of every protocol whose rule matches `atr`
    pub fn classify(&self, atr: &Atr) -> Vec<&'a str> {
        let atr_hex = atr.to_hex();
        self.registry
            .iter()
            .filter(|rule| rule.matches(&atr_hex))
            .map(|rule| rule.name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CardProtocol;
    use hex_literal::hex;

    const MIFARE_ULTRALIGHT_ATR: &str = "3B8F8001804F0CA0000003060300030000000068";
    const MIFARE_CLASSIC_ATR: &str = "3B8F8001804F0CA000000306030001000000006A";
    const DESFIRE_ATR: &str = "3B8180018080";
    const ISO_14443_4_ATR: &str = "3B8880010000000000718100F9";
    const B_PRIME_ATR: &str = "3B8F8001805A0A0103200311230000009000A6";
    const SRT512_ATR: &str = "3B8F8001804F0CA0000003060600070000000071";
    const CONTACT_ATR: &str = "3B6E00000031C071D6650000000000900000";

    fn matches(atr: &str, protocol: CardProtocol) -> bool {
        let registry = ProtocolRuleRegistry::with_defaults();
        AtrClassifier::new(&registry).matches(atr, protocol.name())
    }

    #[test]
    fn test_mifare_is_not_iso14443_4() {
        assert!(matches(MIFARE_ULTRALIGHT_ATR, CardProtocol::MifareUltralight));
        assert!(!matches(MIFARE_ULTRALIGHT_ATR, CardProtocol::Iso14443));
        assert!(!matches(MIFARE_ULTRALIGHT_ATR, CardProtocol::MifareClassic));

        assert!(matches(MIFARE_CLASSIC_ATR, CardProtocol::MifareClassic));
        assert!(!matches(MIFARE_CLASSIC_ATR, CardProtocol::Iso14443));
    }

    #[test]
    fn test_iso14443_4_card() {
        assert!(matches(ISO_14443_4_ATR, CardProtocol::Iso14443));
        assert!(!matches(ISO_14443_4_ATR, CardProtocol::InnovatronBPrime));
        // the desfire pseudo ATR is also a valid ISO 14443-4 ATR
        assert!(matches(DESFIRE_ATR, CardProtocol::Iso14443));
        assert!(matches(DESFIRE_ATR, CardProtocol::MifareDesfire));
    }

    #[test]
    fn test_b_prime_is_excluded_from_iso14443_4() {
        assert!(matches(B_PRIME_ATR, CardProtocol::InnovatronBPrime));
        assert!(!matches(B_PRIME_ATR, CardProtocol::Iso14443));
    }

    #[test]
    fn test_st25_tag() {
        assert!(matches(SRT512_ATR, CardProtocol::St25Srt512));
        assert!(!matches(SRT512_ATR, CardProtocol::MifareUltralight));
    }

    #[test]
    fn test_contact_card() {
        assert!(matches(CONTACT_ATR, CardProtocol::Iso7816));
        assert!(matches(CONTACT_ATR, CardProtocol::Iso7816T1));
        assert!(!matches(CONTACT_ATR, CardProtocol::Iso14443));
    }

    #[test]
    fn test_unknown_protocol_never_matches() {
        let registry = ProtocolRuleRegistry::with_defaults();
        assert!(!AtrClassifier::new(&registry).matches(CONTACT_ATR, "FELICA"));
    }

    #[test]
    fn test_classify_lists_every_match() {
        let registry = ProtocolRuleRegistry::with_defaults();
        let atr = Atr::from(&hex!("3B8F8001804F0CA0000003060300030000000068")[..]);
        let protocols = AtrClassifier::new(&registry).classify(&atr);

        assert!(protocols.contains(&"MIFARE_ULTRALIGHT"));
        assert!(protocols.contains(&"ISO_7816_3"));
        assert!(!protocols.contains(&"ISO_14443_4"));
    }
}

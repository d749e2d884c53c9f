//! Card protocol identification rules
//!
//! A rule is a regular expression matched against the whole uppercase hexadecimal
//! ATR. Rules are kept in a [`ProtocolRuleRegistry`] seeded with the built-in
//! defaults and refined by the plugin configuration.

mod classifier;

use std::collections::BTreeMap;

use fancy_regex::Regex;

pub use classifier::AtrClassifier;

use crate::error::{Error, Result};

/// Pattern stored for a disabled rule. ATR hex never contains `X`.
pub const DISABLED_RULE: &str = "X";

/// Card protocols known out of the box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum CardProtocol {
    /// ISO 14443-4 contactless cards
    #[display("ISO_14443_4")]
    Iso14443,
    /// Innovatron B Prime contactless cards
    #[display("INNOVATRON_B_PRIME")]
    InnovatronBPrime,
    /// NXP MIFARE Ultralight
    #[display("MIFARE_ULTRALIGHT")]
    MifareUltralight,
    /// NXP MIFARE Classic
    #[display("MIFARE_CLASSIC")]
    MifareClassic,
    /// NXP MIFARE DESFire
    #[display("MIFARE_DESFIRE")]
    MifareDesfire,
    /// STMicroelectronics ST25 / SRT512 memory tags
    #[display("ST25_SRT512")]
    St25Srt512,
    /// ISO 7816-3 contact cards, any protocol
    #[display("ISO_7816_3")]
    Iso7816,
    /// ISO 7816-3 contact cards over T=0
    #[display("ISO_7816_3_T0")]
    Iso7816T0,
    /// ISO 7816-3 contact cards over T=1
    #[display("ISO_7816_3_T1")]
    Iso7816T1,
}

impl CardProtocol {
    /// Every built-in protocol
    pub const ALL: [Self; 9] = [
        Self::Iso14443,
        Self::InnovatronBPrime,
        Self::MifareUltralight,
        Self::MifareClassic,
        Self::MifareDesfire,
        Self::St25Srt512,
        Self::Iso7816,
        Self::Iso7816T0,
        Self::Iso7816T1,
    ];

    /// Name under which the rule is registered
    pub const fn name(self) -> &'static str {
        match self {
            Self::Iso14443 => "ISO_14443_4",
            Self::InnovatronBPrime => "INNOVATRON_B_PRIME",
            Self::MifareUltralight => "MIFARE_ULTRALIGHT",
            Self::MifareClassic => "MIFARE_CLASSIC",
            Self::MifareDesfire => "MIFARE_DESFIRE",
            Self::St25Srt512 => "ST25_SRT512",
            Self::Iso7816 => "ISO_7816_3",
            Self::Iso7816T0 => "ISO_7816_3_T0",
            Self::Iso7816T1 => "ISO_7816_3_T1",
        }
    }

    /// Built-in identification rule
    ///
    /// Contactless ATRs are the PC/SC Part 3 pseudo-ATRs built by the reader. The
    /// ISO 14443-4 rule excludes B Prime (`5A0A`) and the storage card header
    /// (`804F0CA000000306`).
    pub const fn default_rule(self) -> &'static str {
        match self {
            Self::Iso14443 => "3B8[0-9A-F]8001(?!.*5A0A)(?!804F0CA000000306).*",
            Self::InnovatronBPrime => "3B8.8001(80)?5A0A.*",
            Self::MifareUltralight => "3B8F8001804F0CA0000003060300030.*",
            Self::MifareClassic => "3B8F8001804F0CA000000306030001.*",
            Self::MifareDesfire => "3B8180018080",
            Self::St25Srt512 => "3B8F8001804F0CA0000003060(5|6|7)0007.*",
            Self::Iso7816 | Self::Iso7816T0 | Self::Iso7816T1 => "3.*",
        }
    }

    /// Whether the protocol is carried over a contactless interface
    pub const fn is_contactless(self) -> bool {
        !matches!(self, Self::Iso7816 | Self::Iso7816T0 | Self::Iso7816T1)
    }

    /// Look up a built-in protocol by its registered name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// A named protocol rule with its compiled matcher
#[derive(Debug, Clone)]
pub struct ProtocolRule {
    name: String,
    pattern: String,
    matcher: Regex,
}

impl ProtocolRule {
    /// Compile a rule; an empty pattern yields a disabled rule
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let pattern = if pattern.is_empty() {
            DISABLED_RULE
        } else {
            pattern
        };
        Ok(Self {
            name: name.into(),
            pattern: pattern.to_string(),
            matcher: compile_full_match(pattern)?,
        })
    }

    /// Rule that matches no ATR
    pub fn disabled(name: impl Into<String>) -> Result<Self> {
        Self::new(name, DISABLED_RULE)
    }

    /// Protocol name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the rule was disabled
    pub fn is_disabled(&self) -> bool {
        self.pattern == DISABLED_RULE
    }

    /// Whether the rule matches the whole of `atr_hex`
    pub fn matches(&self, atr_hex: &str) -> bool {
        match self.matcher.is_match(atr_hex) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::debug!(protocol = %self.name, error = %e, "Protocol rule evaluation failed");
                false
            }
        }
    }
}

/// Compile `pattern` so that it only matches an entire input
pub(crate) fn compile_full_match(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Protocol name to rule table
#[derive(Debug, Clone, Default)]
pub struct ProtocolRuleRegistry {
    rules: BTreeMap<String, ProtocolRule>,
}

impl ProtocolRuleRegistry {
    /// Registry without any rule
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rules
    pub fn with_defaults() -> Self {
        let rules = CardProtocol::ALL
            .into_iter()
            .filter_map(|protocol| ProtocolRule::new(protocol.name(), protocol.default_rule()).ok())
            .map(|rule| (rule.name.clone(), rule))
            .collect();
        Self { rules }
    }

    /// Register `pattern` under `name`, replacing any existing rule
    ///
    /// An empty pattern disables the protocol.
    pub fn add_or_replace(&mut self, name: &str, pattern: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "protocol name cannot be empty".to_string(),
            ));
        }
        let rule = ProtocolRule::new(name, pattern)?;
        tracing::trace!(protocol = name, rule = rule.pattern(), "Registering protocol rule");
        self.rules.insert(name.to_string(), rule);
        Ok(())
    }

    /// Apply a set of overrides on top of the current rules
    ///
    /// Nothing is changed when one of the overrides is invalid.
    pub fn merge<'a, I>(&mut self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut merged = self.clone();
        for (name, pattern) in overrides {
            merged.add_or_replace(name, pattern)?;
        }
        *self = merged;
        Ok(())
    }

    /// Rule registered under `name`
    pub fn get(&self, name: &str) -> Result<&ProtocolRule> {
        self.rules
            .get(name)
            .ok_or_else(|| Error::UnknownProtocol(name.to_string()))
    }

    /// Pattern registered under `name`
    pub fn rule(&self, name: &str) -> Result<&str> {
        self.get(name).map(ProtocolRule::pattern)
    }

    /// Whether a rule exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered rules ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &ProtocolRule> {
        self.rules.values()
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule is registered
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

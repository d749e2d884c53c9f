//! Plugin and reader configuration

use std::{collections::BTreeMap, str::FromStr, time::Duration};

use cardbridge_apdu_core::Disposition;
use fancy_regex::Regex;

use crate::{
    error::{Error, Result},
    protocol::{ProtocolRule, ProtocolRuleRegistry, compile_full_match},
};

/// Reader name filter identifying contactless readers
pub const DEFAULT_CONTACTLESS_READER_FILTER: &str = "(?i).*(contactless|ask logo|acs acr122).*";

/// Default timeout of one native card presence wait, in milliseconds
pub const DEFAULT_CARD_MONITORING_CYCLE_MS: u64 = 500;

/// How a session shares the card with other applications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum SharingMode {
    /// Hold the card transaction lock while the session is open
    #[default]
    #[display("EXCLUSIVE")]
    Exclusive,
    /// Let other applications access the card
    #[display("SHARED")]
    Shared,
}

/// What happens to the card when a session is closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DisconnectionMode {
    /// Warm reset
    #[default]
    #[display("RESET")]
    Reset,
    /// Leave the card untouched
    #[display("LEAVE")]
    Leave,
    /// Power the card down
    #[display("UNPOWER")]
    Unpower,
    /// Eject the card
    #[display("EJECT")]
    Eject,
}

impl DisconnectionMode {
    /// Disposition passed to the middleware
    pub const fn disposition(self) -> Disposition {
        match self {
            Self::Reset => Disposition::Reset,
            Self::Leave => Disposition::Leave,
            Self::Unpower => Disposition::Unpower,
            Self::Eject => Disposition::Eject,
        }
    }
}

impl FromStr for SharingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EXCLUSIVE" => Ok(Self::Exclusive),
            "SHARED" => Ok(Self::Shared),
            _ => Err(Error::InvalidArgument(format!("unknown sharing mode {s:?}"))),
        }
    }
}

impl FromStr for DisconnectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RESET" => Ok(Self::Reset),
            "LEAVE" => Ok(Self::Leave),
            "UNPOWER" => Ok(Self::Unpower),
            "EJECT" => Ok(Self::Eject),
            _ => Err(Error::InvalidArgument(format!(
                "unknown disconnection mode {s:?}"
            ))),
        }
    }
}

/// Plugin configuration, validated as it is built
///
/// ```
/// use cardbridge_plugin::PluginConfig;
///
/// let config = PluginConfig::default()
///     .with_protocol_rule("ISO_7816_3", "")?
///     .with_card_monitoring_cycle(250)?;
/// assert_eq!(config.card_monitoring_cycle().as_millis(), 250);
/// # Ok::<(), cardbridge_plugin::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct PluginConfig {
    contactless_reader_filter: String,
    protocol_rules: BTreeMap<String, String>,
    card_monitoring_cycle: Duration,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            contactless_reader_filter: DEFAULT_CONTACTLESS_READER_FILTER.to_string(),
            protocol_rules: BTreeMap::new(),
            card_monitoring_cycle: Duration::from_millis(DEFAULT_CARD_MONITORING_CYCLE_MS),
        }
    }
}

impl PluginConfig {
    /// Regular expression matched against the whole reader name to spot
    /// contactless readers
    pub fn with_contactless_reader_filter(mut self, filter: &str) -> Result<Self> {
        if filter.is_empty() {
            return Err(Error::InvalidArgument(
                "contactless reader filter cannot be empty".to_string(),
            ));
        }
        compile_full_match(filter)?;
        self.contactless_reader_filter = filter.to_string();
        Ok(self)
    }

    /// Add or override one protocol rule; an empty rule disables the protocol
    pub fn with_protocol_rule(mut self, protocol: &str, rule: &str) -> Result<Self> {
        if protocol.is_empty() {
            return Err(Error::InvalidArgument(
                "protocol name cannot be empty".to_string(),
            ));
        }
        ProtocolRule::new(protocol, rule)?;
        self.protocol_rules
            .insert(protocol.to_string(), rule.to_string());
        Ok(self)
    }

    /// Add or override several protocol rules
    pub fn with_protocol_rules<I, K, V>(self, rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        rules.into_iter().try_fold(self, |config, (protocol, rule)| {
            config.with_protocol_rule(protocol.as_ref(), rule.as_ref())
        })
    }

    /// Timeout of one native presence wait, at least one millisecond
    pub fn with_card_monitoring_cycle(mut self, millis: u64) -> Result<Self> {
        if millis == 0 {
            return Err(Error::InvalidArgument(
                "card monitoring cycle must be at least 1 ms".to_string(),
            ));
        }
        self.card_monitoring_cycle = Duration::from_millis(millis);
        Ok(self)
    }

    /// Contactless reader filter pattern
    pub fn contactless_reader_filter(&self) -> &str {
        &self.contactless_reader_filter
    }

    /// Protocol rule overrides, by protocol name
    pub const fn protocol_rules(&self) -> &BTreeMap<String, String> {
        &self.protocol_rules
    }

    /// Timeout of one native presence wait
    pub const fn card_monitoring_cycle(&self) -> Duration {
        self.card_monitoring_cycle
    }

    /// Compiled contactless reader filter
    pub(crate) fn contactless_matcher(&self) -> Result<Regex> {
        compile_full_match(&self.contactless_reader_filter)
    }

    /// Built-in rules with the configured overrides applied
    pub fn build_registry(&self) -> Result<ProtocolRuleRegistry> {
        let mut registry = ProtocolRuleRegistry::with_defaults();
        registry.merge(
            self.protocol_rules
                .iter()
                .map(|(name, rule)| (name.as_str(), rule.as_str())),
        )?;
        Ok(registry)
    }
}

/// On-disk form of [`PluginConfig`]
///
/// ```json
/// {
///   "contactless_reader_filter": "(?i).*(contactless|ask logo|acs acr122).*",
///   "protocol_rules": { "ISO_7816_3": "" },
///   "card_monitoring_cycle_ms": 500
/// }
/// ```
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfigFile {
    /// See [`PluginConfig::with_contactless_reader_filter`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contactless_reader_filter: Option<String>,
    /// See [`PluginConfig::with_protocol_rules`]
    pub protocol_rules: BTreeMap<String, String>,
    /// See [`PluginConfig::with_card_monitoring_cycle`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_monitoring_cycle_ms: Option<u64>,
}

#[cfg(feature = "serde")]
impl TryFrom<PluginConfigFile> for PluginConfig {
    type Error = Error;

    fn try_from(file: PluginConfigFile) -> Result<Self> {
        let mut config = Self::default().with_protocol_rules(&file.protocol_rules)?;
        if let Some(filter) = &file.contactless_reader_filter {
            config = config.with_contactless_reader_filter(filter)?;
        }
        if let Some(millis) = file.card_monitoring_cycle_ms {
            config = config.with_card_monitoring_cycle(millis)?;
        }
        Ok(config)
    }
}

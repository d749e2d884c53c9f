//! Plugin: reader discovery and the configuration shared by its readers

use std::{fmt, sync::Arc, time::Duration};

use cardbridge_apdu_core::{CardTerminal, TerminalProvider, TransportError};
use fancy_regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    config::PluginConfig,
    error::{Error, Result},
    protocol::{AtrClassifier, ProtocolRuleRegistry},
    reader::ReaderAdapter,
};

/// Name under which the plugin registers
pub const PLUGIN_NAME: &str = "PcscPlugin";

/// Interval at which the host refreshes the reader list
pub const MONITORING_CYCLE: Duration = Duration::from_millis(1000);

/// Configuration shared by the plugin and every reader it creates
///
/// Immutable once built, so readers on different threads read it freely.
pub struct PluginContext {
    registry: ProtocolRuleRegistry,
    contactless_filter: String,
    contactless_matcher: Regex,
    card_monitoring_cycle: Duration,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("protocols", &self.registry.len())
            .field("contactless_filter", &self.contactless_filter)
            .field("card_monitoring_cycle", &self.card_monitoring_cycle)
            .finish()
    }
}

impl PluginContext {
    /// Compile `config`
    pub fn new(config: &PluginConfig) -> Result<Self> {
        Ok(Self {
            registry: config.build_registry()?,
            contactless_filter: config.contactless_reader_filter().to_string(),
            contactless_matcher: config.contactless_matcher()?,
            card_monitoring_cycle: config.card_monitoring_cycle(),
        })
    }

    /// Protocol rules in effect
    pub const fn registry(&self) -> &ProtocolRuleRegistry {
        &self.registry
    }

    /// Classifier over the rules in effect
    pub const fn classifier(&self) -> AtrClassifier<'_> {
        AtrClassifier::new(&self.registry)
    }

    /// Rule registered for `protocol`
    pub fn protocol_rule(&self, protocol: &str) -> Result<&str> {
        self.registry.rule(protocol)
    }

    /// Whether the reader name designates a contactless reader
    pub fn is_contactless(&self, reader_name: &str) -> bool {
        self.contactless_matcher
            .is_match(reader_name)
            .unwrap_or_default()
    }

    /// Timeout of one native presence wait
    pub const fn card_monitoring_cycle(&self) -> Duration {
        self.card_monitoring_cycle
    }
}

/// Reader discovery over a native middleware
#[derive(Debug)]
pub struct Plugin<P: TerminalProvider> {
    provider: P,
    context: Arc<PluginContext>,
}

impl<P: TerminalProvider> Plugin<P> {
    /// Plugin over `provider` configured with `config`
    pub fn new(provider: P, config: PluginConfig) -> Result<Self> {
        let context = PluginContext::new(&config)?;
        info!(
            protocols = context.registry().len(),
            contactless_filter = %context.contactless_filter,
            cycle_ms = context.card_monitoring_cycle().as_millis() as u64,
            "Reader plugin initialised"
        );
        Ok(Self {
            provider,
            context: Arc::new(context),
        })
    }

    /// Plugin name
    pub const fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// Interval at which the host should refresh the reader list
    pub const fn monitoring_cycle(&self) -> Duration {
        MONITORING_CYCLE
    }

    /// Configuration shared with the readers
    pub const fn context(&self) -> &Arc<PluginContext> {
        &self.context
    }

    /// Native middleware
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Rule registered for `protocol`
    pub fn protocol_rule(&self, protocol: &str) -> Result<&str> {
        self.context.protocol_rule(protocol)
    }

    /// Whether the reader name designates a contactless reader
    pub fn is_contactless(&self, reader_name: &str) -> bool {
        self.context.is_contactless(reader_name)
    }

    /// Readers currently known to the middleware
    ///
    /// Conditions meaning "no reader right now" (no reader, service down or
    /// restarting, transient communication failure) yield an empty list. Anything
    /// else is an error.
    fn terminals(&self) -> Result<Vec<P::Terminal>> {
        match self.provider.list_terminals() {
            Ok(terminals) => Ok(terminals),
            Err(
                e @ (TransportError::NoReadersAvailable
                | TransportError::NoService
                | TransportError::ServiceStopped
                | TransportError::Communication(_)),
            ) => {
                debug!(error = %e, "No reader available");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "Failed to list readers");
                Err(Error::PluginCommunication(e))
            }
        }
    }

    /// Names of the readers currently connected
    pub fn list_reader_names(&self) -> Result<Vec<String>> {
        Ok(self
            .terminals()?
            .iter()
            .map(|terminal| terminal.name().to_string())
            .collect())
    }

    /// One reader adapter for each reader currently connected
    pub fn search_available_readers(&self) -> Result<Vec<ReaderAdapter<P::Terminal>>> {
        let readers: Vec<_> = self
            .terminals()?
            .into_iter()
            .map(|terminal| ReaderAdapter::new(terminal, Arc::clone(&self.context)))
            .collect();
        debug!(count = readers.len(), "Available readers");
        Ok(readers)
    }

    /// Reader adapter for the reader named `name`, if connected
    pub fn search_reader(&self, name: &str) -> Result<Option<ReaderAdapter<P::Terminal>>> {
        Ok(self
            .terminals()?
            .into_iter()
            .find(|terminal| terminal.name() == name)
            .map(|terminal| ReaderAdapter::new(terminal, Arc::clone(&self.context))))
    }

    /// Reader adapter for the reader named `name`
    ///
    /// Fails when no such reader is connected.
    pub fn create_reader_for(&self, name: &str) -> Result<ReaderAdapter<P::Terminal>> {
        self.search_reader(name)?
            .ok_or_else(|| Error::ReaderState(format!("Reader {name:?} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCard, MockProvider, MockTerminal};

    fn plugin(provider: MockProvider) -> Plugin<MockProvider> {
        Plugin::new(provider, PluginConfig::default()).unwrap()
    }

    #[test]
    fn test_identity() {
        let plugin = plugin(MockProvider::default());
        assert_eq!(plugin.name(), "PcscPlugin");
        assert_eq!(plugin.monitoring_cycle(), Duration::from_millis(1000));
        assert_eq!(
            plugin.context().card_monitoring_cycle(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_lists_readers() {
        let plugin = plugin(MockProvider::new(vec![
            MockTerminal::empty("Reader A"),
            MockTerminal::with_card("Reader B", MockCard::contact()),
        ]));

        assert_eq!(plugin.list_reader_names().unwrap(), vec!["Reader A", "Reader B"]);

        let readers = plugin.search_available_readers().unwrap();
        assert_eq!(readers.len(), 2);
        assert_eq!(readers[1].name(), "Reader B");
        // readers share the plugin configuration
        assert!(Arc::ptr_eq(readers[0].context(), plugin.context()));
    }

    #[test]
    fn test_transient_conditions_yield_no_reader() {
        for error in [
            TransportError::NoReadersAvailable,
            TransportError::NoService,
            TransportError::ServiceStopped,
            TransportError::Communication("SCARD_F_COMM_ERROR".into()),
        ] {
            let plugin = plugin(MockProvider::failing(error));
            assert!(plugin.list_reader_names().unwrap().is_empty());
            assert!(plugin.search_available_readers().unwrap().is_empty());
        }
    }

    #[test]
    fn test_other_failures_are_reported() {
        let plugin = plugin(MockProvider::failing(TransportError::Other(
            "SCARD_E_NO_MEMORY".into(),
        )));
        assert_eq!(
            plugin.list_reader_names().unwrap_err(),
            Error::PluginCommunication(TransportError::Other("SCARD_E_NO_MEMORY".into()))
        );
    }

    #[test]
    fn test_search_reader_by_name() {
        let plugin = plugin(MockProvider::new(vec![MockTerminal::empty("Reader A")]));

        assert!(plugin.search_reader("Reader A").unwrap().is_some());
        assert!(plugin.search_reader("Reader Z").unwrap().is_none());
        assert!(matches!(
            plugin.create_reader_for("Reader Z"),
            Err(Error::ReaderState(_))
        ));
    }

    #[test]
    fn test_contactless_filter() {
        let plugin = plugin(MockProvider::default());

        assert!(plugin.is_contactless("ACS ACR122U PICC Interface"));
        assert!(plugin.is_contactless("SCM Microsystems SCL011 Contactless Reader"));
        assert!(plugin.is_contactless("ASK LoGO 00 00"));
        assert!(!plugin.is_contactless("Identiv uTrust 2700 R Smart Card Reader"));
    }

    #[test]
    fn test_protocol_rule_lookup() {
        let plugin = plugin(MockProvider::default());
        assert_eq!(plugin.protocol_rule("MIFARE_DESFIRE").unwrap(), "3B8180018080");
        assert!(matches!(
            plugin.protocol_rule("FELICA"),
            Err(Error::UnknownProtocol(_))
        ));
    }
}

use cardbridge_apdu_core::TerminalProvider;
use cardbridge_plugin::{ChannelTransceiver, Plugin, ReaderAdapter};

/// Reader named `name`, or the first reader holding a card
pub fn select_reader<P: TerminalProvider>(
    plugin: &Plugin<P>,
    name: Option<&str>,
) -> Result<ReaderAdapter<P::Terminal>, Box<dyn std::error::Error>> {
    if let Some(name) = name {
        return plugin
            .search_reader(name)?
            .ok_or_else(|| format!("Reader '{}' not found", name).into());
    }

    let readers = plugin.search_available_readers()?;
    if readers.is_empty() {
        return Err("No readers found!".into());
    }

    readers
        .into_iter()
        .find(|reader| reader.check_card_presence().unwrap_or(false))
        .ok_or_else(|| "No card found in any reader!".into())
}

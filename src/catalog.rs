//! Table of contents: the shows the device can load.
//!
//! Fetched once at startup and projected into per-player selection lists.
//! No state beyond the parsed entries.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Serialize;

use crate::error::DeviceError;
use crate::protocol::ShowId;
use crate::status::lenient_attributes;

/// Label used for the `"00"` entry of every selection list.
pub const NO_SHOW_LABEL: &str = "(no show)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowEntry {
    pub id: ShowId,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    entries: Vec<ShowEntry>,
}

impl Catalog {
    #[must_use]
    pub fn new(entries: Vec<ShowEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[ShowEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display label for a show id, if the device listed it.
    #[must_use]
    pub fn label(&self, id: &ShowId) -> Option<&str> {
        if id.is_none() {
            return Some(NO_SHOW_LABEL);
        }
        self.entries.iter().find(|e| &e.id == id).map(|e| e.label.as_str())
    }

    /// Selection list for a player: the "no show" entry, then the catalog.
    #[must_use]
    pub fn options(&self) -> Vec<ShowEntry> {
        let none = ShowEntry { id: ShowId::none(), label: NO_SHOW_LABEL.to_owned() };
        std::iter::once(none)
            .chain(self.entries.iter().filter(|e| !e.id.is_none()).cloned())
            .collect()
    }
}

/// Parse `<show index="SS">Label</show>` elements.
///
/// # Errors
///
/// [`DeviceError::Parse`] for malformed XML.
pub fn parse_catalog(xml: &str) -> Result<Catalog, DeviceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut open: Option<ShowEntry> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"show" => {
                let attrs = lenient_attributes(&e)?;
                let id = ShowId::new(attrs.get("index").map_or("", String::as_str));
                open = Some(ShowEntry { id, label: String::new() });
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"show" => {
                let attrs = lenient_attributes(&e)?;
                let id = ShowId::new(attrs.get("index").map_or("", String::as_str));
                entries.push(ShowEntry { label: id.to_string(), id });
            }
            Ok(Event::Text(text)) => {
                if let Some(entry) = open.as_mut() {
                    let text = text.unescape().map_err(|e| DeviceError::Parse(e.to_string()))?;
                    entry.label.push_str(&text);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"show" => {
                if let Some(mut entry) = open.take() {
                    if entry.label.is_empty() {
                        entry.label = entry.id.to_string();
                    }
                    entries.push(entry);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DeviceError::Parse(format!("at byte {}: {e}", reader.error_position())));
            }
        }
    }
    Ok(Catalog::new(entries))
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;

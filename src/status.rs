//! Live status resource: parsing and display helpers.
//!
//! The device reports one `player` element per slot:
//!
//! ```text
//! <status>
//!   <player index index="1" status="PLAY" show="03" time="00h01m12s"/>
//! </status>
//! ```
//!
//! The repeated, valueless `index` is real device output, so attributes are
//! read in lenient (HTML) mode with duplicate checks off. The last non-empty
//! value of a key wins.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Serialize;

use crate::error::DeviceError;
use crate::protocol::{MAX_PLAYERS, PlayerId, ShowId};

/// Shown instead of the elapsed time when nothing is loaded.
pub const TIME_PLACEHOLDER: &str = "--:--:--";

/// One player's state as of a single poll. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerStatus {
    pub index: PlayerId,
    /// Verb currently executing, lowercase.
    pub status: String,
    pub show: ShowId,
    /// Raw device time, e.g. `01h02m03s`.
    pub time: String,
}

impl PlayerStatus {
    #[must_use]
    pub fn time_display(&self) -> String {
        format_time(&self.show, &self.time)
    }
}

/// Render device time for display.
///
/// `"01h02m03s"` becomes `"01:02:03"`. A `"00"` show always yields
/// [`TIME_PLACEHOLDER`] whatever the raw value says.
#[must_use]
pub fn format_time(show: &ShowId, raw: &str) -> String {
    if show.is_none() {
        return TIME_PLACEHOLDER.to_owned();
    }
    let raw = raw.trim();
    let raw = raw.strip_suffix('s').or_else(|| raw.strip_suffix('S')).unwrap_or(raw);
    raw.replace(['h', 'H', 'm', 'M'], ":")
}

/// Parse the status document into per-player records, in document order.
///
/// # Errors
///
/// [`DeviceError::Parse`] for malformed XML, [`DeviceError::ProtocolAnomaly`]
/// when the document has no player elements or a player has no usable index.
pub fn parse_status(xml: &str) -> Result<Vec<PlayerStatus>, DeviceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut statuses = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) if e.local_name().as_ref() == b"player" => {
                statuses.push(player_from_element(&e)?);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DeviceError::Parse(format!("at byte {}: {e}", reader.error_position())));
            }
        }
    }

    if statuses.is_empty() {
        return Err(DeviceError::ProtocolAnomaly("status response has no player elements".into()));
    }
    Ok(statuses)
}

fn player_from_element(element: &BytesStart<'_>) -> Result<PlayerStatus, DeviceError> {
    let mut attrs = lenient_attributes(element)?;

    let raw_index = attrs.remove("index").unwrap_or_default();
    let index = raw_index
        .trim()
        .parse::<PlayerId>()
        .ok()
        .filter(|i| (1..=MAX_PLAYERS).contains(i))
        .ok_or_else(|| DeviceError::ProtocolAnomaly(format!("player element has invalid index `{raw_index}`")))?;

    Ok(PlayerStatus {
        index,
        status: attrs.remove("status").unwrap_or_default().trim().to_ascii_lowercase(),
        show: ShowId::new(&attrs.remove("show").unwrap_or_default()),
        time: attrs.remove("time").unwrap_or_default(),
    })
}

/// Collect attributes keyed by lowercase name.
pub(crate) fn lenient_attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>, DeviceError> {
    let mut attributes = element.html_attributes();
    attributes.with_checks(false);

    let mut out = HashMap::new();
    for attr in attributes {
        let attr = attr.map_err(|e| DeviceError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = attr.unescape_value().map_err(|e| DeviceError::Parse(e.to_string()))?;
        if !value.is_empty() || !out.contains_key(&key) {
            out.insert(key, value.into_owned());
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;

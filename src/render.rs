//! Plain-text presentation of a session snapshot.
//!
//! Pure functions of their inputs: the interactive loop re-renders on every
//! revision and on a blink timer, so nothing here keeps state.
//!
//! Control glyphs:
//!
//! ```text
//!   .play.   disabled
//!    play    enabled
//!   [play]   active (the verb the device reports)
//!   *play*   in flight, blinking against " play "
//! ```

use std::time::Instant;

use crate::catalog::Catalog;
use crate::control::{Control, PlayerPanel, VisualState};
use crate::session::SessionView;
use crate::status::PlayerStatus;

/// Width of one control cell, brackets included.
const CELL: usize = 10;

/// The full board: mode line, then one block per visible player.
#[must_use]
pub fn render_board(view: &SessionView, now: Instant) -> String {
    let mode = view.mode.map_or("none", |m| m.label());
    let switching = match view.selector {
        selector if selector == view.mode => String::new(),
        selector => format!(" (switching to {})", selector.map_or("none", |m| m.label())),
    };
    let polling = if view.polling_active { "live" } else { "held" };
    let mut out = format!("mode: {mode}{switching}  polling: {polling}\n");

    let visible = usize::from(view.active_player_count());
    if visible == 0 {
        out.push_str("no mode selected; choose one with `mode NAME`\n");
        return out;
    }
    for panel in view.controls.players().iter().take(visible) {
        out.push_str(&render_panel(panel, &view.catalog, now));
    }
    out
}

fn render_panel(panel: &PlayerPanel, catalog: &Catalog, now: Instant) -> String {
    let show = panel.selection();
    let label = catalog.label(show).unwrap_or("?");
    let pending = if panel.has_pending_selection() { " (selected)" } else { "" };
    let cells: String = panel
        .controls()
        .iter()
        .map(|control| format!(" {:<CELL$}", glyph(control, now)))
        .collect();
    format!(
        "player {}  show {show} {label}{pending}  {}\n {cells}\n",
        panel.id(),
        panel.time_display()
    )
}

/// One control cell.
#[must_use]
pub fn glyph(control: &Control, now: Instant) -> String {
    let name = control.verb().name();
    match control.state() {
        VisualState::Disabled => format!(".{name}."),
        VisualState::Enabled => format!(" {name} "),
        VisualState::Active => format!("[{name}]"),
        VisualState::InFlight if control.blink_on(now) => format!("*{name}*"),
        VisualState::InFlight => format!(" {name} "),
    }
}

/// One line per player from a raw status poll.
#[must_use]
pub fn render_statuses(statuses: &[PlayerStatus]) -> String {
    statuses
        .iter()
        .map(|s| {
            let status = if s.status.is_empty() { "-" } else { s.status.as_str() };
            format!("player {}  {status:<8} show {}  {}\n", s.index, s.show, s.time_display())
        })
        .collect()
}

/// The selection list every player is offered.
#[must_use]
pub fn render_catalog(catalog: &Catalog) -> String {
    catalog
        .options()
        .iter()
        .map(|entry| format!("{}  {}\n", entry.id, entry.label))
        .collect()
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;

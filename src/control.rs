//! Per-control visual state machine and the keyed control grid.
//!
//! DESIGN
//! ======
//! One `Control` per player × verb, built once and never destroyed. The
//! visible state is local and may run ahead of the device: a click moves a
//! control to `InFlight` immediately, and only a reconciliation pass or a
//! failed send takes it out again.
//!
//! ```text
//!   Disabled ──(show selected / mode widens)──▶ Enabled
//!   Enabled | Active ──press──▶ InFlight
//!   InFlight ──settle (poll)──▶ Disabled | Enabled | Active
//!   InFlight ──fail──▶ prior state
//!   any ──disable (mode narrows)──▶ Disabled
//! ```

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::protocol::{self, Mode, PlayerId, ShowId, Verb};
use crate::status::TIME_PLACEHOLDER;

/// Length of one blink phase while in flight: two phases per cycle, three
/// cycles per second.
pub const BLINK_PHASE: Duration = Duration::from_millis(167);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualState {
    Disabled,
    Enabled,
    Active,
    InFlight,
}

/// Why a press did not start a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PressRejected {
    #[error("control is disabled")]
    Disabled,
    #[error("control already has a command in flight")]
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flight {
    since: Instant,
    prior: VisualState,
}

// =============================================================================
// CONTROL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    player: PlayerId,
    verb: Verb,
    state: VisualState,
    /// Set exactly while `state == InFlight`.
    flight: Option<Flight>,
}

impl Control {
    #[must_use]
    pub fn new(player: PlayerId, verb: Verb) -> Self {
        Self { player, verb, state: VisualState::Disabled, flight: None }
    }

    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.player
    }

    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    #[must_use]
    pub fn state(&self) -> VisualState {
        self.state
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.state == VisualState::InFlight
    }

    /// The verb a press sends right now. Hold is a toggle: once playback is
    /// held, the same control sends continue.
    #[must_use]
    pub fn effective_verb(&self) -> Verb {
        if self.verb == Verb::Hold && self.state == VisualState::Active {
            Verb::Continue
        } else {
            self.verb
        }
    }

    /// Start a command from this control.
    ///
    /// # Errors
    ///
    /// Rejects disabled controls and controls already in flight; re-clicks
    /// never submit a second concurrent command.
    pub fn press(&mut self, now: Instant) -> Result<Verb, PressRejected> {
        match self.state {
            VisualState::Disabled => Err(PressRejected::Disabled),
            VisualState::InFlight => Err(PressRejected::InFlight),
            prior @ (VisualState::Enabled | VisualState::Active) => {
                let verb = self.effective_verb();
                self.flight = Some(Flight { since: now, prior });
                self.state = VisualState::InFlight;
                Ok(verb)
            }
        }
    }

    /// The send failed: fall back to the state held before the press.
    /// Returns false when the control was no longer in flight.
    pub fn fail(&mut self) -> bool {
        match self.flight.take() {
            Some(flight) => {
                self.state = flight.prior;
                true
            }
            None => false,
        }
    }

    /// Apply reconciled device truth. Clears any in-flight state
    /// unconditionally. Returns true when an in-flight state was cleared.
    pub fn settle(&mut self, state: VisualState) -> bool {
        let was_in_flight = self.flight.take().is_some();
        self.state = if state == VisualState::InFlight { VisualState::Enabled } else { state };
        was_in_flight
    }

    pub fn disable(&mut self) {
        self.flight = None;
        self.state = VisualState::Disabled;
    }

    /// When the control went in flight, if it is.
    #[must_use]
    pub fn in_flight_since(&self) -> Option<Instant> {
        self.flight.map(|f| f.since)
    }

    /// Blink phase for the in-flight indicator. Always false otherwise.
    #[must_use]
    pub fn blink_on(&self, now: Instant) -> bool {
        let Some(since) = self.in_flight_since() else {
            return false;
        };
        let phase = now.saturating_duration_since(since).as_millis() / BLINK_PHASE.as_millis();
        phase % 2 == 0
    }
}

// =============================================================================
// PLAYER PANEL
// =============================================================================

/// Everything shown for one player: show selection, time, and its controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPanel {
    id: PlayerId,
    selection: ShowId,
    /// Local choice not yet confirmed by a sent command.
    pending_selection: bool,
    time_display: String,
    controls: Vec<Control>,
}

impl PlayerPanel {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            selection: ShowId::none(),
            pending_selection: false,
            time_display: TIME_PLACEHOLDER.to_owned(),
            controls: Verb::CONTROLS.into_iter().map(|verb| Control::new(id, verb)).collect(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PlayerId {
        self.id
    }

    #[must_use]
    pub fn selection(&self) -> &ShowId {
        &self.selection
    }

    #[must_use]
    pub fn has_pending_selection(&self) -> bool {
        self.pending_selection
    }

    #[must_use]
    pub fn time_display(&self) -> &str {
        &self.time_display
    }

    pub fn set_time_display(&mut self, time: String) {
        self.time_display = time;
    }

    #[must_use]
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> impl Iterator<Item = &mut Control> {
        self.controls.iter_mut()
    }

    #[must_use]
    pub fn control(&self, verb: Verb) -> Option<&Control> {
        self.controls.iter().find(|c| c.verb == verb)
    }

    pub fn control_mut(&mut self, verb: Verb) -> Option<&mut Control> {
        self.controls.iter_mut().find(|c| c.verb == verb)
    }

    /// Fold the device-reported show into the selection. A pending local
    /// choice survives until the device reports the same show.
    pub fn sync_selection(&mut self, device_show: &ShowId) {
        if !self.pending_selection {
            self.selection = device_show.clone();
        } else if &self.selection == device_show {
            self.pending_selection = false;
        }
    }

    /// The local choice went out with a command; device truth takes over.
    pub fn commit_selection(&mut self) {
        self.pending_selection = false;
    }
}

// =============================================================================
// CONTROL SET
// =============================================================================

/// The full player × verb grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSet {
    players: Vec<PlayerPanel>,
}

impl ControlSet {
    #[must_use]
    pub fn new() -> Self {
        Self { players: protocol::players().map(PlayerPanel::new).collect() }
    }

    #[must_use]
    pub fn players(&self) -> &[PlayerPanel] {
        &self.players
    }

    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&PlayerPanel> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerPanel> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    #[must_use]
    pub fn control(&self, player: PlayerId, verb: Verb) -> Option<&Control> {
        self.player(player).and_then(|p| p.control(verb))
    }

    pub fn control_mut(&mut self, player: PlayerId, verb: Verb) -> Option<&mut Control> {
        self.player_mut(player).and_then(|p| p.control_mut(verb))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.players.iter().flat_map(|p| p.controls.iter())
    }

    /// Record a local show choice for `player`. `"00"` forces every control
    /// of that player to `Disabled`; any other show enables the controls the
    /// mode allows.
    pub fn select_show(&mut self, player: PlayerId, show: ShowId, mode: Option<Mode>) -> bool {
        let Some(panel) = self.player_mut(player) else {
            return false;
        };
        let none = show.is_none();
        panel.selection = show;
        panel.pending_selection = true;
        for control in &mut panel.controls {
            if none {
                control.disable();
            } else if control.state == VisualState::Disabled && mode.is_some_and(|m| m.allows(player, control.verb)) {
                control.state = VisualState::Enabled;
            }
        }
        true
    }

    /// Re-derive availability after a mode change: controls the mode no
    /// longer allows are disabled, newly allowed ones with a show selected
    /// become enabled.
    pub fn apply_mode(&mut self, mode: Option<Mode>) {
        for panel in &mut self.players {
            let has_show = !panel.selection.is_none();
            for control in &mut panel.controls {
                let allowed = mode.is_some_and(|m| m.allows(panel.id, control.verb));
                if !allowed {
                    control.disable();
                } else if has_show && control.state == VisualState::Disabled {
                    control.state = VisualState::Enabled;
                }
            }
        }
    }
}

impl Default for ControlSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "control_test.rs"]
mod tests;

//! Reconciler: folds a polled status snapshot into the control grid.
//!
//! DESIGN
//! ======
//! Server truth always wins. For every reported player the time display and
//! every control state are recomputed from the snapshot (and the current
//! mode); any `InFlight` state is cleared whether or not the device did what
//! the click asked for. A pending local show choice survives only as the
//! displayed selection: it never enables a player the device reports as
//! empty, and a verb is only `Active` when the device plays the selected
//! show. Players missing from the snapshot are left alone. Running the same
//! snapshot twice yields the same grid.

use tracing::warn;

use crate::control::{ControlSet, VisualState};
use crate::protocol::{Mode, PlayerId, Verb};
use crate::status::{PlayerStatus, format_time};

/// What a reconciliation pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub players: usize,
    pub cleared_in_flight: usize,
}

/// Merge `statuses` into `controls`.
pub fn reconcile(statuses: &[PlayerStatus], controls: &mut ControlSet, mode: Option<Mode>) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();

    for status in statuses {
        let Some(panel) = controls.player_mut(status.index) else {
            warn!(player = status.index, "status for unknown player; skipping");
            continue;
        };
        summary.players += 1;

        panel.sync_selection(&status.show);
        panel.set_time_display(format_time(&status.show, &status.time));

        let selection_matches = panel.selection() == &status.show;
        let player = panel.id();
        for control in panel.controls_mut() {
            let state = derive_state(mode, player, control.verb(), status, selection_matches);
            if control.settle(state) {
                summary.cleared_in_flight += 1;
            }
        }
    }

    summary
}

fn derive_state(
    mode: Option<Mode>,
    player: PlayerId,
    verb: Verb,
    status: &PlayerStatus,
    selection_matches: bool,
) -> VisualState {
    if status.show.is_none() || !mode.is_some_and(|m| m.allows(player, verb)) {
        VisualState::Disabled
    } else if selection_matches && verb.name().eq_ignore_ascii_case(status.status.trim()) {
        VisualState::Active
    } else {
        VisualState::Enabled
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;

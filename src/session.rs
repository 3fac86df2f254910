//! Player control session: the one owner of top-level mutable state.
//!
//! ARCHITECTURE
//! ============
//! The session composes the encoder, the control grid, the reconciler, the
//! mode guard and the poller around a single in-memory model. The model is
//! the source of truth for presentation: renderers take a `SessionView`
//! snapshot whenever the revision counter moves, and never mutate anything.
//!
//! Writers of the control grid are exactly two: user actions (`click`,
//! `select_show`, `change_mode`) and the poller's sink running the
//! reconciler. Both take the model lock briefly and never across an
//! `.await`; the poller never starts a second reconciliation pass before
//! the first returns. A click presses its control and suspends polling
//! under the model lock, and the sink checks snapshot freshness under the
//! same lock, so a snapshot fetched before a click never clears its
//! `InFlight` state.
//!
//! ERROR HANDLING
//! ==============
//! Device failures never tear the session down. A failed command reverts its
//! control out of `InFlight` and resumes polling at once; a failed mode
//! switch rolls the selector back. Preference write failures are logged.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, parse_catalog};
use crate::config::Timings;
use crate::control::{ControlSet, PressRejected};
use crate::error::DeviceError;
use crate::mode_guard::{ConfirmPrompt, Decision, request_change};
use crate::poller::{Poller, Snapshot};
use crate::prefs::{LAST_MODE_KEY, PreferenceStore};
use crate::protocol::{self, Mode, PlayerId, ShowId, Verb, encode, encode_mode};
use crate::reconcile::{ReconcileSummary, reconcile};
use crate::status::PlayerStatus;
use crate::transport::DeviceTransport;

// =============================================================================
// ERRORS / OUTCOMES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClickError {
    #[error("no {verb} control for player {player}")]
    UnknownControl { player: PlayerId, verb: Verb },
    #[error("{verb} is not available for player {player} in the current mode")]
    Unavailable { player: PlayerId, verb: Verb },
    #[error("player {player} {verb} is disabled")]
    Disabled { player: PlayerId, verb: Verb },
    #[error("player {player} {verb} already has a command in flight")]
    InFlight { player: PlayerId, verb: Verb },
    #[error("command send failed: {0}")]
    Send(#[from] DeviceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOutcome {
    /// The device was switched and the choice persisted.
    Applied(Mode),
    /// Requested mode is already current.
    Unchanged,
    /// The user declined; the selector is back on the previous mode.
    Cancelled,
}

// =============================================================================
// MODEL
// =============================================================================

#[derive(Debug, Default)]
struct Model {
    /// Applied mode. `None` only until the first mode is chosen or restored.
    mode: Option<Mode>,
    /// What the mode selector shows; differs from `mode` only while a
    /// transition is awaiting confirmation or a send.
    selector: Option<Mode>,
    controls: ControlSet,
    catalog: Catalog,
}

/// Read-only snapshot for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub mode: Option<Mode>,
    pub selector: Option<Mode>,
    pub controls: ControlSet,
    pub catalog: Catalog,
    pub polling_active: bool,
}

impl SessionView {
    /// Players shown for the current mode.
    #[must_use]
    pub fn active_player_count(&self) -> PlayerId {
        protocol::active_player_count(self.mode)
    }
}

// =============================================================================
// SESSION
// =============================================================================

pub struct Session {
    model: Arc<Mutex<Model>>,
    transport: Arc<dyn DeviceTransport>,
    prefs: Arc<dyn PreferenceStore>,
    poller: Poller,
    timings: Timings,
    revision: Arc<watch::Sender<u64>>,
}

impl Session {
    #[must_use]
    pub fn new(transport: Arc<dyn DeviceTransport>, prefs: Arc<dyn PreferenceStore>, timings: Timings) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            model: Arc::new(Mutex::new(Model::default())),
            poller: Poller::new(transport.clone(), timings.poll_interval),
            transport,
            prefs,
            timings,
            revision: Arc::new(revision),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Model> {
        lock_model(&self.model)
    }

    fn bump(&self) {
        bump_revision(&self.revision);
    }

    /// Restore the persisted mode, load the show list, start polling.
    pub async fn start(&self) {
        self.restore_mode().await;
        match self.load_catalog().await {
            Ok(count) => info!(count, "show catalog loaded"),
            Err(e) => warn!(error = %e, code = e.error_code(), "show catalog unavailable; continuing without labels"),
        }
        self.start_polling();
    }

    /// Stop polling. Safe to call repeatedly.
    pub fn stop(&self) {
        self.poller.stop();
    }

    /// Start the poller with the reconciler as its sink. A no-op if running.
    pub fn start_polling(&self) {
        let model = self.model.clone();
        let poller = self.poller.clone();
        let revision = self.revision.clone();
        self.poller.start(Arc::new(move |snapshot: Snapshot| {
            let Some(summary) = apply_snapshot(&model, &poller, &snapshot) else {
                debug!("discarding status snapshot superseded by a command");
                return;
            };
            if summary.cleared_in_flight > 0 {
                debug!(cleared = summary.cleared_in_flight, "reconciliation cleared in-flight controls");
            }
            bump_revision(&revision);
        }));
    }

    /// The mode saved by the last confirmed change, if readable and known.
    #[must_use]
    pub fn persisted_mode(&self) -> Option<Mode> {
        let stored = match self.prefs.get(LAST_MODE_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "could not read persisted mode");
                return None;
            }
        };
        let Some(id) = stored else {
            info!("no persisted mode; waiting for a mode selection");
            return None;
        };
        let mode = Mode::from_id(&id);
        if mode.is_none() {
            warn!(%id, "persisted mode id is unknown; ignoring");
        }
        mode
    }

    async fn restore_mode(&self) {
        let Some(mode) = self.persisted_mode() else {
            return;
        };
        self.assume_mode(mode);
        let wire = encode_mode(mode);
        match self.transport.send_command(&wire).await {
            Ok(()) => info!(%mode, %wire, "restored persisted mode"),
            Err(e) => warn!(%mode, error = %e, code = e.error_code(), "could not push restored mode to device"),
        }
    }

    /// Fetch and store the show catalog. Returns the number of shows.
    ///
    /// # Errors
    ///
    /// Transport or parse failure; the previous catalog is kept.
    pub async fn load_catalog(&self) -> Result<usize, DeviceError> {
        let xml = self.transport.fetch_catalog().await?;
        let catalog = parse_catalog(&xml)?;
        let count = catalog.entries().len();
        self.lock().catalog = catalog;
        self.bump();
        Ok(count)
    }

    /// One-off status fetch, outside the polling loop. Does not reconcile.
    ///
    /// # Errors
    ///
    /// Transport, parse or protocol failure.
    pub async fn poll_once(&self) -> Result<Vec<PlayerStatus>, DeviceError> {
        self.poller.poll_once().await
    }

    #[must_use]
    pub fn mode(&self) -> Option<Mode> {
        self.lock().mode
    }

    #[must_use]
    pub fn active_player_count(&self) -> PlayerId {
        protocol::active_player_count(self.mode())
    }

    #[must_use]
    pub fn is_polling_active(&self) -> bool {
        self.poller.is_active()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionView {
        let polling_active = self.poller.is_active();
        let model = self.lock();
        SessionView {
            mode: model.mode,
            selector: model.selector,
            controls: model.controls.clone(),
            catalog: model.catalog.clone(),
            polling_active,
        }
    }

    /// Revision counter, bumped on every model change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Choose a show for `player`. Returns false for an unknown player.
    pub fn select_show(&self, player: PlayerId, show: ShowId) -> bool {
        let changed = {
            let mut model = self.lock();
            let mode = model.mode;
            model.controls.select_show(player, show, mode)
        };
        if changed {
            self.bump();
        }
        changed
    }

    /// Press a control: encode, mark `InFlight`, send, and gate polling.
    /// Returns the wire command that was sent.
    ///
    /// # Errors
    ///
    /// Rejected presses leave every state untouched. A failed send reverts
    /// the control and resumes polling immediately.
    pub async fn click(&self, player: PlayerId, verb: Verb) -> Result<String, ClickError> {
        let (wire, sent_verb) = {
            let mut model = self.lock();
            let mode = model.mode;
            let show = model
                .controls
                .player(player)
                .filter(|_| verb != Verb::Mode)
                .map(|panel| panel.selection().clone())
                .ok_or(ClickError::UnknownControl { player, verb })?;
            if !mode.is_some_and(|m| m.allows(player, verb)) {
                return Err(ClickError::Unavailable { player, verb });
            }
            let control = model
                .controls
                .control_mut(player, verb)
                .ok_or(ClickError::UnknownControl { player, verb })?;
            let sent_verb = control.press(std::time::Instant::now()).map_err(|rejected| match rejected {
                PressRejected::Disabled => ClickError::Disabled { player, verb },
                PressRejected::InFlight => ClickError::InFlight { player, verb },
            })?;
            self.poller.suspend();
            (encode(player, sent_verb, Some(show.as_str())), sent_verb)
        };

        self.bump();
        info!(player, verb = %sent_verb, %wire, "sending command");

        match self.transport.send_command(&wire).await {
            Ok(()) => {
                if sent_verb.carries_show() {
                    if let Some(panel) = self.lock().controls.player_mut(player) {
                        panel.commit_selection();
                    }
                }
                self.poller.resume_after(self.timings.settle_delay);
                Ok(wire)
            }
            Err(e) => {
                warn!(
                    player,
                    verb = %sent_verb,
                    %wire,
                    error = %e,
                    code = e.error_code(),
                    retryable = e.retryable(),
                    "command failed; reverting control"
                );
                if let Some(control) = self.lock().controls.control_mut(player, verb) {
                    control.fail();
                }
                self.poller.resume_now();
                self.bump();
                Err(ClickError::Send(e))
            }
        }
    }

    /// Request a mode change, asking `prompt` first when it would stop
    /// players.
    ///
    /// # Errors
    ///
    /// The mode command failed to send; the selector is rolled back and
    /// nothing is persisted.
    pub async fn change_mode(&self, to: Mode, prompt: &dyn ConfirmPrompt) -> Result<ModeOutcome, DeviceError> {
        let from = self.mode();
        let target = match request_change(from, to) {
            Decision::Unchanged => return Ok(ModeOutcome::Unchanged),
            Decision::Proceed(mode) => {
                self.set_selector(Some(mode));
                mode
            }
            Decision::Confirm(pending) => {
                self.set_selector(Some(pending.requested()));
                if prompt.confirm(&pending.prompt()).await {
                    pending.confirm()
                } else {
                    let previous = pending.cancel();
                    self.set_selector(Some(previous));
                    info!(mode = %previous, declined = %to, "mode change declined");
                    return Ok(ModeOutcome::Cancelled);
                }
            }
        };

        let wire = encode_mode(target);
        self.poller.suspend();
        match self.transport.send_command(&wire).await {
            Ok(()) => {
                self.poller.resume_after(self.timings.settle_delay);
                self.assume_mode(target);
                if let Err(e) = self.prefs.set(LAST_MODE_KEY, target.id()) {
                    warn!(error = %e, "could not persist mode");
                }
                info!(from = ?from, to = %target, %wire, "mode changed");
                Ok(ModeOutcome::Applied(target))
            }
            Err(e) => {
                self.poller.resume_now();
                self.set_selector(from);
                warn!(to = %target, error = %e, code = e.error_code(), "mode change failed; selector rolled back");
                Err(e)
            }
        }
    }

    fn set_selector(&self, selector: Option<Mode>) {
        self.lock().selector = selector;
        self.bump();
    }

    /// Take `mode` as current without sending anything or persisting it.
    pub fn assume_mode(&self, mode: Mode) {
        {
            let mut model = self.lock();
            model.mode = Some(mode);
            model.selector = Some(mode);
            model.controls.apply_mode(Some(mode));
        }
        self.bump();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.poller.stop();
    }
}

/// Reconcile `snapshot` unless a command started after its fetch. The
/// freshness check and the reconciliation happen under one model lock.
fn apply_snapshot(model: &Mutex<Model>, poller: &Poller, snapshot: &Snapshot) -> Option<ReconcileSummary> {
    let mut model = lock_model(model);
    if !poller.is_fresh(snapshot) {
        return None;
    }
    let mode = model.mode;
    Some(reconcile(&snapshot.statuses, &mut model.controls, mode))
}

fn lock_model(model: &Mutex<Model>) -> MutexGuard<'_, Model> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bump_revision(revision: &watch::Sender<u64>) {
    revision.send_modify(|rev| *rev = rev.wrapping_add(1));
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

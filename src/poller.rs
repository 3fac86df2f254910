//! Status poller: cancellable periodic fetch of the live status resource.
//!
//! DESIGN
//! ======
//! One spawned task per running poller. Each cycle fetches, parses, then
//! hands the snapshot to the sink before the next tick can start, so two
//! reconciliation passes never interleave. Missed ticks are skipped.
//!
//! Commands gate the loop: `suspend` is called before a command goes out,
//! `resume_after` once it has completed (polling stays quiet for the settle
//! delay, then polls immediately), `resume_now` when it failed. A snapshot
//! whose fetch overlapped a command is discarded: it may predate the
//! device acting on it. Each delivered `Snapshot` carries its epoch so a
//! sink can repeat that check under its own lock with `is_fresh`.
//!
//! Cancellation bumps a generation counter and aborts the task; a task
//! from an older generation never delivers. `stop` is safe from inside the
//! sink.
//!
//! ERROR HANDLING
//! ==============
//! Network, parse and protocol failures skip the cycle with a warning. The
//! loop itself never exits on a failed fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::DeviceError;
use crate::status::{PlayerStatus, parse_status};
use crate::transport::DeviceTransport;

/// One parsed status document, tagged with the command epoch its fetch
/// started in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub statuses: Vec<PlayerStatus>,
    epoch: u64,
}

/// Receives every successfully parsed snapshot, in order.
pub type StatusSink = Arc<dyn Fn(Snapshot) + Send + Sync>;

#[derive(Debug, Default)]
struct Gate {
    commands_in_flight: usize,
    hold_until: Option<Instant>,
    /// Bumped on every `suspend`; a fetch is only delivered if it is unchanged.
    epoch: u64,
}

impl Gate {
    fn is_open(&self, now: Instant) -> bool {
        self.commands_in_flight == 0 && self.hold_until.is_none_or(|until| now >= until)
    }
}

struct PollerInner {
    transport: Arc<dyn DeviceTransport>,
    interval: Duration,
    generation: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
    gate: Mutex<Gate>,
    wake: Notify,
}

impl PollerInner {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Epoch to tag a fetch with, or `None` while a command is in flight.
    fn open_epoch(&self) -> Option<u64> {
        let gate = self.gate();
        (gate.commands_in_flight == 0).then_some(gate.epoch)
    }

    fn hold_remaining(&self, now: Instant) -> Option<Duration> {
        self.gate()
            .hold_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }
}

// =============================================================================
// POLLER
// =============================================================================

/// Cheap to clone; clones drive the same task.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

impl Poller {
    #[must_use]
    pub fn new(transport: Arc<dyn DeviceTransport>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                transport,
                interval,
                generation: AtomicU64::new(0),
                task: Mutex::new(None),
                gate: Mutex::new(Gate::default()),
                wake: Notify::new(),
            }),
        }
    }

    /// Fetch and parse one status snapshot.
    ///
    /// # Errors
    ///
    /// Transport failures, malformed XML, or a document without players.
    pub async fn poll_once(&self) -> Result<Vec<PlayerStatus>, DeviceError> {
        let xml = self.inner.transport.fetch_status().await?;
        parse_status(&xml)
    }

    /// Start polling. A no-op if already running.
    pub fn start(&self, sink: StatusSink) {
        let mut task = self.inner.task();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("poller already running");
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(interval = ?self.inner.interval, generation, "status polling started");
        *task = Some(tokio::spawn(run(self.inner.clone(), generation, sink)));
    }

    /// Stop polling. A no-op if already stopped. No tick scheduled before
    /// the call delivers after it.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.task().take() {
            handle.abort();
            info!("status polling stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.task().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Polling is running and not held back by a command or settle window.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_running() && self.inner.gate().is_open(Instant::now())
    }

    /// No command has been issued since `snapshot` started fetching, and
    /// none is in flight.
    #[must_use]
    pub fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        self.inner.open_epoch() == Some(snapshot.epoch)
    }

    /// A command is about to go out: hold polling until it completes.
    pub fn suspend(&self) {
        let mut gate = self.inner.gate();
        gate.commands_in_flight += 1;
        gate.epoch = gate.epoch.wrapping_add(1);
    }

    /// The command round-trip completed: poll again once `settle` has passed.
    pub fn resume_after(&self, settle: Duration) {
        {
            let mut gate = self.inner.gate();
            gate.commands_in_flight = gate.commands_in_flight.saturating_sub(1);
            let until = Instant::now() + settle;
            gate.hold_until = Some(gate.hold_until.map_or(until, |prev| prev.max(until)));
        }
        self.inner.wake.notify_one();
    }

    /// The command failed: resume without waiting for the settle window.
    pub fn resume_now(&self) {
        {
            let mut gate = self.inner.gate();
            gate.commands_in_flight = gate.commands_in_flight.saturating_sub(1);
        }
        self.inner.wake.notify_one();
    }
}

async fn run(inner: Arc<PollerInner>, generation: u64, sink: StatusSink) {
    let mut ticker = tokio::time::interval(inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = inner.wake.notified() => {}
        }
        if !inner.is_current(generation) {
            return;
        }

        while let Some(wait) = inner.hold_remaining(Instant::now()) {
            tokio::time::sleep(wait).await;
            if !inner.is_current(generation) {
                return;
            }
        }

        let Some(epoch) = inner.open_epoch() else {
            continue;
        };

        let result = inner.transport.fetch_status().await.and_then(|xml| parse_status(&xml));
        ticker.reset();

        if !inner.is_current(generation) {
            return;
        }
        match result {
            Ok(statuses) if inner.open_epoch() == Some(epoch) => sink(Snapshot { statuses, epoch }),
            Ok(_) => debug!("discarding status snapshot that overlapped a command"),
            Err(e) => warn!(
                error = %e,
                code = e.error_code(),
                retryable = e.retryable(),
                "status poll failed; skipping cycle"
            ),
        }
    }
}

#[cfg(test)]
impl Poller {
    /// Tag `statuses` with the current epoch, as if fetched just now.
    pub(crate) fn snapshot_now(&self, statuses: Vec<PlayerStatus>) -> Snapshot {
        Snapshot { statuses, epoch: self.inner.gate().epoch }
    }
}

#[cfg(test)]
#[path = "poller_test.rs"]
mod tests;

//! Mode transition guard.
//!
//! DESIGN
//! ======
//! Narrowing from a multi-player mode to single or recording stops players
//! 2–4 on the device, so it needs a yes/no from the user first. The guard is
//! pure: it classifies `(from, to)` and hands back a `PendingChange` that
//! resolves to the mode the selector must show afterwards. Applying,
//! persisting and sending belong to the session.

use crate::protocol::Mode;

/// Outcome of asking to change mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Already in the requested mode; nothing to do.
    Unchanged,
    /// Safe transition, apply straight away.
    Proceed(Mode),
    /// Destructive transition, ask first.
    Confirm(PendingChange),
}

/// A destructive transition waiting on the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    from: Mode,
    to: Mode,
}

impl PendingChange {
    #[must_use]
    pub fn previous(&self) -> Mode {
        self.from
    }

    #[must_use]
    pub fn requested(&self) -> Mode {
        self.to
    }

    /// Question to put to the user.
    #[must_use]
    pub fn prompt(&self) -> String {
        format!(
            "Switching from {} to {} stops players 2-4. Continue?",
            self.from.label(),
            self.to.label()
        )
    }

    /// User agreed: the mode to apply.
    #[must_use]
    pub fn confirm(self) -> Mode {
        self.to
    }

    /// User declined: the mode the selector rolls back to.
    #[must_use]
    pub fn cancel(self) -> Mode {
        self.from
    }
}

/// True iff the transition narrows a multi-player mode to one player.
#[must_use]
pub fn requires_confirmation(from: Option<Mode>, to: Mode) -> bool {
    from.is_some_and(Mode::is_multi) && matches!(to, Mode::Single | Mode::Recording)
}

/// Classify a requested mode change.
#[must_use]
pub fn request_change(from: Option<Mode>, to: Mode) -> Decision {
    match from {
        Some(current) if current == to => Decision::Unchanged,
        Some(current) if requires_confirmation(from, to) => Decision::Confirm(PendingChange { from: current, to }),
        _ => Decision::Proceed(to),
    }
}

/// Yes/no question channel to the user.
#[async_trait::async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Fixed answer, for non-interactive callers (`--yes`) and tests.
pub struct AutoConfirm(pub bool);

#[async_trait::async_trait]
impl ConfirmPrompt for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

#[cfg(test)]
#[path = "mode_guard_test.rs"]
mod tests;

//! Command protocol: players, verbs, modes and the wire encoder.
//!
//! DESIGN
//! ======
//! The device takes one command per request as a bare query string:
//! `<player><code>[<show>]` for per-player verbs, `MS<mode>` for the global
//! mode switch. Encoding is pure and total; an unknown verb can't reach the
//! encoder because verbs are a closed enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Player slot on the device, 1-based.
pub type PlayerId = u8;

/// Number of player slots the device exposes.
pub const MAX_PLAYERS: PlayerId = 4;

/// Iterate every player slot in display order.
pub fn players() -> impl Iterator<Item = PlayerId> {
    1..=MAX_PLAYERS
}

// =============================================================================
// SHOW ID
// =============================================================================

/// Two-character zero-padded show identifier. `"00"` means nothing loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowId(String);

impl ShowId {
    /// Sentinel for "no show loaded".
    pub const NONE: &'static str = "00";

    /// Normalise a raw id: trimmed, left-padded with zeros to two characters.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::none();
        }
        Self(format!("{trimmed:0>2}"))
    }

    #[must_use]
    pub fn none() -> Self {
        Self(Self::NONE.to_owned())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShowId {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for ShowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShowId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// =============================================================================
// VERB
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
    #[error("unknown mode `{0}`")]
    UnknownMode(String),
}

/// Logical device action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Load,
    Play,
    Loop,
    Stop,
    Hold,
    Continue,
    Restart,
    Record,
    /// Device-global mode switch. Never bound to a control.
    Mode,
}

impl Verb {
    /// Verbs that exist as per-player controls, in display order.
    pub const CONTROLS: [Verb; 8] = [
        Verb::Load,
        Verb::Play,
        Verb::Loop,
        Verb::Stop,
        Verb::Hold,
        Verb::Continue,
        Verb::Restart,
        Verb::Record,
    ];

    /// Two-letter wire code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Verb::Load => "LD",
            Verb::Play => "ST",
            Verb::Loop => "LP",
            Verb::Stop => "SP",
            Verb::Hold => "HD",
            Verb::Continue => "CT",
            Verb::Restart => "RS",
            Verb::Record => "RC",
            Verb::Mode => "MS",
        }
    }

    /// Lowercase name, as the device reports it in `status`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Verb::Load => "load",
            Verb::Play => "play",
            Verb::Loop => "loop",
            Verb::Stop => "stop",
            Verb::Hold => "hold",
            Verb::Continue => "continue",
            Verb::Restart => "restart",
            Verb::Record => "record",
            Verb::Mode => "mode",
        }
    }

    /// Whether the wire command carries a show id.
    #[must_use]
    pub fn carries_show(self) -> bool {
        matches!(self, Verb::Load | Verb::Play | Verb::Loop | Verb::Record)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Verb {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Verb::CONTROLS
            .into_iter()
            .chain(std::iter::once(Verb::Mode))
            .find(|v| v.name() == lowered)
            .ok_or_else(|| ParseError::UnknownVerb(s.to_owned()))
    }
}

// =============================================================================
// MODE
// =============================================================================

/// Device operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Single,
    MultiHtp,
    MultiLtp,
    MultiPriority,
    Recording,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Single, Mode::MultiHtp, Mode::MultiLtp, Mode::MultiPriority, Mode::Recording];

    /// Logical id, used for persistence. Recording has its own id here even
    /// though it shares a wire code with Single.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Mode::Single => "0",
            Mode::MultiHtp => "1",
            Mode::MultiLtp => "2",
            Mode::MultiPriority => "3",
            Mode::Recording => "4",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Mode::ALL.into_iter().find(|m| m.id() == id.trim())
    }

    /// Code sent after `MS`. The device has no recording transport value.
    #[must_use]
    pub fn wire_code(self) -> &'static str {
        match self {
            Mode::Recording => Mode::Single.id(),
            other => other.id(),
        }
    }

    #[must_use]
    pub fn is_multi(self) -> bool {
        matches!(self, Mode::MultiHtp | Mode::MultiLtp | Mode::MultiPriority)
    }

    #[must_use]
    pub fn active_player_count(self) -> PlayerId {
        if self.is_multi() { MAX_PLAYERS } else { 1 }
    }

    /// Whether `verb` is operable on `player` in this mode.
    #[must_use]
    pub fn allows(self, player: PlayerId, verb: Verb) -> bool {
        if player == 0 || player > self.active_player_count() || verb == Verb::Mode {
            return false;
        }
        match self {
            Mode::Recording => matches!(verb, Verb::Record | Verb::Stop),
            _ => verb != Verb::Record,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Mode::Single => "single",
            Mode::MultiHtp => "htp",
            Mode::MultiLtp => "ltp",
            Mode::MultiPriority => "priority",
            Mode::Recording => "recording",
        }
    }
}

/// Players operable in `mode`; zero when no mode has been chosen yet.
#[must_use]
pub fn active_player_count(mode: Option<Mode>) -> PlayerId {
    mode.map_or(0, Mode::active_player_count)
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    /// Accepts either the label (`htp`) or the logical id (`1`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Mode::ALL
            .into_iter()
            .find(|m| m.label() == lowered || m.id() == lowered)
            .ok_or_else(|| ParseError::UnknownMode(s.to_owned()))
    }
}

// =============================================================================
// ENCODER
// =============================================================================

/// Encode an action as the device's wire command.
///
/// For [`Verb::Mode`] `arg` is the mode wire code and no player prefix is
/// written. For show-carrying verbs `arg` is the show id, zero-padded to two
/// digits (`"00"` when absent). Other verbs ignore `arg`.
#[must_use]
pub fn encode(player: PlayerId, verb: Verb, arg: Option<&str>) -> String {
    match verb {
        Verb::Mode => format!("{}{}", verb.code(), arg.unwrap_or(Mode::Single.wire_code())),
        v if v.carries_show() => {
            let show = ShowId::new(arg.unwrap_or(ShowId::NONE));
            format!("{player}{}{show}", v.code())
        }
        v => format!("{player}{}", v.code()),
    }
}

/// Encode the mode switch for a logical mode.
#[must_use]
pub fn encode_mode(mode: Mode) -> String {
    encode(0, Verb::Mode, Some(mode.wire_code()))
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;

//! # showdeck
//!
//! Remote controller for a networked show-playback device. The device
//! exposes up to four players; this crate polls its status document, sends
//! single-line transport commands, and keeps a local visual state for every
//! player × verb control that is reconciled against each poll.
//!
//! `session::Session` is the entry point. Everything below it is usable on
//! its own: the encoder in `protocol`, the XML parsers in `status` and
//! `catalog`, the control state machine in `control`, the reconciler, the
//! mode guard and the poller.

pub mod catalog;
pub mod config;
pub mod control;
pub mod error;
pub mod mode_guard;
pub mod poller;
pub mod prefs;
pub mod protocol;
pub mod reconcile;
pub mod render;
pub mod session;
pub mod status;
pub mod transport;

pub use config::ControllerConfig;
pub use error::DeviceError;
pub use protocol::{Mode, PlayerId, ShowId, Verb};
pub use session::{ClickError, ModeOutcome, Session, SessionView};
pub use transport::{DeviceTransport, HttpTransport};

//! Replay scripted agent sessions through the `ctxprune` context manager.
//!
//! Useful for tuning prunability thresholds and nudge templates against a
//! recorded or hand-written session without a language model in the loop.
//! See [`script`] for the script format.

pub mod config;
pub mod replay;
pub mod script;

pub use config::{Overrides, ReplayConfig};
pub use replay::{ReplayReport, Replayer, TurnReport};
pub use script::SessionScript;

//! Configuration for the [`ContextManager`](crate::session::ContextManager).
//!
//! Every threshold has a documented default; an empty JSON object is a
//! valid configuration.
//!
//! ```ignore
//! let config = ContextConfig::default()
//!     .with_metric(MetricKind::Bytes)
//!     .with_prunability(PrunabilityConfig::default().with_min_entry_size(256))
//!     .with_nudges(NudgeConfig::default().with_critical_budget(40_000));
//! ```
//!
//! Nudges can be switched off without losing their settings:
//!
//! ```ignore
//! let config = ContextConfig {
//!     nudges: Toggle::disabled(),
//!     ..ContextConfig::default()
//! };
//! ```

use crate::context::metric::MetricKind;
use crate::context::nudge::{NudgeConfig, NudgeEngine};
use crate::context::prunable::PrunabilityConfig;
use serde::{Deserialize, Serialize};

// ── Generic toggle ────────────────────────────────────────────────

/// Generic enabled/disabled wrapper for a module configuration.
///
/// When `enabled` is `false` the module is skipped regardless of the inner
/// config values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Toggle<T: Default> {
    pub enabled: bool,
    pub config: T,
}

impl<T: Default> Toggle<T> {
    /// Create a disabled instance with default inner config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }

    /// Create an enabled instance with `config`.
    pub fn enabled(config: T) -> Self {
        Self {
            enabled: true,
            config,
        }
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            config: T::default(),
        }
    }
}

/// Nudge engine configuration.
pub type NudgeToggle = Toggle<NudgeConfig>;

// ── Context config ─────────────────────────────────────────────────

/// Session-level configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// How history content is measured. Default: tokens at 3.5 chars each.
    pub metric: MetricKind,
    pub prunability: PrunabilityConfig,
    pub nudges: NudgeToggle,
}

impl ContextConfig {
    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_prunability(mut self, prunability: PrunabilityConfig) -> Self {
        self.prunability = prunability;
        self
    }

    /// Enable nudges with `config`.
    pub fn with_nudges(mut self, config: NudgeConfig) -> Self {
        self.nudges = Toggle::enabled(config);
        self
    }

    pub fn without_nudges(mut self) -> Self {
        self.nudges.enabled = false;
        self
    }

    /// Build the nudge engine this configuration describes.
    pub fn nudge_engine(&self) -> NudgeEngine {
        if self.nudges.enabled {
            NudgeEngine::new(self.nudges.config.clone())
        } else {
            NudgeEngine::disabled()
        }
    }
}

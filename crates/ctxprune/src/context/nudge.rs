//! Prune reminders ("nudges") injected with the context info after a turn.
//!
//! The [`NudgeEngine`] is a small rule engine evaluated once per committed
//! turn, after the prunable list is known:
//!
//! - context is over the critical budget and the orchestrator says the agent
//!   is between phases: ask for a `squash`;
//! - otherwise, something is prunable and the agent has not pruned for
//!   `grace_turns`: ask for a `discard`;
//! - otherwise stay quiet.
//!
//! The same kind is never emitted on two consecutive turns. A rule whose
//! kind repeats the previous nudge is skipped and evaluation falls through
//! to the next rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Default squash reminder. `{active}` and `{budget}` are substituted.
pub const DEFAULT_SQUASH_TEMPLATE: &str = "\
<context-reminder kind=\"squash\">
Context holds ~{active} units of tool output, over the {budget} budget, and you \
have just finished a phase of work. Use `squash` to replace the completed turns \
with a short summary of what was done, what was learned and what remains. Keep \
file paths, identifiers and open questions verbatim.
</context-reminder>";

/// Default discard reminder. `{count}` is substituted.
pub const DEFAULT_DISCARD_TEMPLATE: &str = "\
<context-reminder kind=\"discard\">
{count} tool output(s) in <prunable-tools> can be pruned. Use `discard` for \
outputs you no longer need, or `extract` to keep only the facts you still rely \
on. Pruning what you are done with keeps the context focused.
</context-reminder>";

/// Kind of reminder chosen for a turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Nudge {
    #[default]
    None,
    Squash,
    Discard,
}

impl fmt::Display for Nudge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nudge::None => write!(f, "none"),
            Nudge::Squash => write!(f, "squash"),
            Nudge::Discard => write!(f, "discard"),
        }
    }
}

/// Phase signal from the orchestrator. The engine never infers phases.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseSignal {
    #[default]
    Continuing,
    BetweenPhases,
}

/// Configuration for [`NudgeEngine`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NudgeConfig {
    /// Active tool-output cost above which a squash is suggested.
    pub critical_budget: u64,
    /// Turns without a successful prune before a discard is suggested.
    pub grace_turns: u32,
    pub squash_template: String,
    pub discard_template: String,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            critical_budget: 60_000,
            grace_turns: 2,
            squash_template: DEFAULT_SQUASH_TEMPLATE.to_string(),
            discard_template: DEFAULT_DISCARD_TEMPLATE.to_string(),
        }
    }
}

impl NudgeConfig {
    pub fn with_critical_budget(mut self, budget: u64) -> Self {
        self.critical_budget = budget;
        self
    }

    pub fn with_grace_turns(mut self, turns: u32) -> Self {
        self.grace_turns = turns;
        self
    }

    pub fn with_squash_template(mut self, template: impl Into<String>) -> Self {
        self.squash_template = template.into();
        self
    }

    pub fn with_discard_template(mut self, template: impl Into<String>) -> Self {
        self.discard_template = template.into();
        self
    }
}

/// What the engine looks at each turn.
#[derive(Debug, Clone, Copy)]
pub struct NudgeInput {
    /// Total size of `Active` outputs.
    pub active_cost: u64,
    /// Length of the freshly computed prunable list.
    pub prunable_len: usize,
    pub phase: PhaseSignal,
}

/// Rule-based reminder policy with anti-spam state.
#[derive(Debug, Clone)]
pub struct NudgeEngine {
    config: NudgeConfig,
    enabled: bool,
    turns_since_last_nudge: u32,
    turns_since_last_prune: u32,
    last: Nudge,
}

impl NudgeEngine {
    pub fn new(config: NudgeConfig) -> Self {
        Self {
            config,
            enabled: true,
            turns_since_last_nudge: 0,
            turns_since_last_prune: 0,
            last: Nudge::None,
        }
    }

    /// An engine that never nudges.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(NudgeConfig::default())
        }
    }

    pub fn config(&self) -> &NudgeConfig {
        &self.config
    }

    pub fn turns_since_last_nudge(&self) -> u32 {
        self.turns_since_last_nudge
    }

    pub fn turns_since_last_prune(&self) -> u32 {
        self.turns_since_last_prune
    }

    /// Nudge emitted on the previous evaluation.
    pub fn last(&self) -> Nudge {
        self.last
    }

    /// A prune call succeeded; restart the grace period.
    pub fn record_prune(&mut self) {
        self.turns_since_last_prune = 0;
    }

    /// Decide this turn's nudge and advance the per-turn counters.
    pub fn evaluate(&mut self, input: NudgeInput) -> Nudge {
        let nudge = if self.enabled {
            self.choose(input)
        } else {
            Nudge::None
        };

        if nudge == Nudge::None {
            self.turns_since_last_nudge = self.turns_since_last_nudge.saturating_add(1);
        } else {
            self.turns_since_last_nudge = 0;
            debug!(
                "nudge: {nudge} (active={}, prunable={}, since_prune={})",
                input.active_cost, input.prunable_len, self.turns_since_last_prune
            );
        }
        self.turns_since_last_prune = self.turns_since_last_prune.saturating_add(1);
        self.last = nudge;
        nudge
    }

    fn choose(&self, input: NudgeInput) -> Nudge {
        let rules = [
            (
                Nudge::Squash,
                input.active_cost > self.config.critical_budget
                    && input.phase == PhaseSignal::BetweenPhases,
            ),
            (
                Nudge::Discard,
                input.prunable_len > 0 && self.turns_since_last_prune >= self.config.grace_turns,
            ),
        ];
        rules
            .into_iter()
            .find(|(kind, fires)| *fires && *kind != self.last)
            .map_or(Nudge::None, |(kind, _)| kind)
    }

    /// Instruction text for `nudge`, or `None` for [`Nudge::None`].
    pub fn render(&self, nudge: Nudge, input: NudgeInput) -> Option<String> {
        match nudge {
            Nudge::None => None,
            Nudge::Squash => Some(
                self.config
                    .squash_template
                    .replace("{active}", &input.active_cost.to_string())
                    .replace("{budget}", &self.config.critical_budget.to_string()),
            ),
            Nudge::Discard => Some(
                self.config
                    .discard_template
                    .replace("{count}", &input.prunable_len.to_string()),
            ),
        }
    }
}

impl Default for NudgeEngine {
    fn default() -> Self {
        Self::new(NudgeConfig::default())
    }
}

//! Context window policy: measuring, ranking, reminding and filtering.
//!
//! 1. **[`metric`]**: [`SizeMetric`] prices history content (bytes or
//!    estimated tokens).
//! 2. **[`prunable`]**: [`PrunabilityCalculator`] ranks active tool outputs
//!    into the prunable list after every turn.
//! 3. **[`nudge`]**: [`NudgeEngine`] decides whether to remind the agent to
//!    `squash` or `discard`.
//! 4. **[`info`]**: the live [`ContextSnapshot`] and the rendered
//!    `<prunable-tools>` context-info message.
//! 5. **[`guard`]**: [`InjectionGuard`] strips all of the above out of user
//!    transcripts.

pub mod guard;
pub mod info;
pub mod metric;
pub mod nudge;
pub mod prunable;

pub use guard::InjectionGuard;
pub use info::{ContextInfo, ContextSnapshot};
pub use metric::{ByteLength, DEFAULT_CHARS_PER_TOKEN, MetricKind, SizeMetric, TokenEstimate};
pub use nudge::{Nudge, NudgeConfig, NudgeEngine, NudgeInput, PhaseSignal};
pub use prunable::{PrunabilityCalculator, PrunabilityConfig, PrunableEntry};

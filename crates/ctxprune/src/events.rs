//! Events and handlers for the [`ContextManager`](crate::session::ContextManager).
//!
//! The manager reports every state change through [`ContextEvent`]:
//! committed and aborted turns, freshly computed snapshots, and the outcome
//! of each prune call. Callers implement [`EventHandler`] to observe them
//! for logging, metrics or a transcript recorder.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests, or when nothing needs observing |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::context::nudge::Nudge;
use crate::error::PruneError;
use crate::history::{EntryId, SquashGroupId, TurnIndex};
use crate::prune::PruneOutcome;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the context manager.
#[derive(Debug)]
pub enum ContextEvent<'a> {
    /// A turn was committed to history.
    TurnCommitted {
        turn: TurnIndex,
        /// Committed history cost after the turn.
        committed_cost: u64,
        active_cost: u64,
    },
    /// An in-flight turn was rolled back.
    TurnAborted { turn: TurnIndex },
    /// The prunable list was recomputed.
    SnapshotComputed {
        turn: TurnIndex,
        prunable: &'a [EntryId],
        nudge: Nudge,
    },
    /// An output's content was dropped.
    Discarded {
        id: EntryId,
        outcome: &'a PruneOutcome,
    },
    /// An output was replaced by a summary.
    Extracted {
        id: EntryId,
        outcome: &'a PruneOutcome,
    },
    /// A turn range was replaced by a summary.
    Squashed {
        group: SquashGroupId,
        lo: TurnIndex,
        hi: TurnIndex,
        outcome: &'a PruneOutcome,
    },
    /// A prune call was refused. History is unchanged.
    PruneRejected {
        tool: &'a str,
        error: &'a PruneError,
    },
}

/// Handler for context events.
///
/// The default implementation ignores every event.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ContextEvent<'_>) {
        let _ = event;
    }
}

/// Ignores all events.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let ContextEvent::Discarded { id, .. } = event {
///         println!("discarded {id}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ContextEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ContextEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ContextEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ContextEvent<'_>) {
        (self.0)(event);
    }
}

/// An event handler that delegates to multiple inner handlers, in
/// registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(record, recorder);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &ContextEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ContextEvent<'_>) {
        match event {
            ContextEvent::TurnCommitted {
                turn,
                committed_cost,
                active_cost,
            } => {
                debug!(
                    "Turn {turn} committed (history={committed_cost}, active outputs={active_cost})"
                );
            }
            ContextEvent::TurnAborted { turn } => {
                warn!("Turn {turn} aborted; history rolled back");
            }
            ContextEvent::SnapshotComputed {
                turn,
                prunable,
                nudge,
            } => {
                debug!(
                    "Snapshot after turn {turn}: {} prunable, nudge={nudge}",
                    prunable.len()
                );
            }
            ContextEvent::Discarded { id, outcome } => {
                info!("Discarded output {id}, freed {}", outcome.freed());
            }
            ContextEvent::Extracted { id, outcome } => {
                info!("Extracted output {id}, freed {}", outcome.freed());
            }
            ContextEvent::Squashed {
                group,
                lo,
                hi,
                outcome,
            } => {
                info!(
                    "Squashed turns {lo}-{hi} into {group} ({} output(s), freed {})",
                    outcome.targets.len(),
                    outcome.freed()
                );
            }
            ContextEvent::PruneRejected { tool, error } => {
                info!("Rejected {tool} call: {error}");
            }
        }
    }
}

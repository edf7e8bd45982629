//! Per-session orchestration of history, prunability, nudges and pruning.
//!
//! The [`ContextManager`] owns all state for one agent session. Each turn
//! follows the same lifecycle:
//!
//! 1. [`begin_turn`](ContextManager::begin_turn) checkpoints the session and
//!    appends the new turn;
//! 2. the agent's tool calls are recorded and completed (or failed), and
//!    prune calls run through
//!    [`invoke_prune_tool`](ContextManager::invoke_prune_tool) against the
//!    snapshot computed after the previous turn;
//! 3. [`commit_turn`](ContextManager::commit_turn) recomputes the prunable
//!    list, evaluates the nudge engine and returns the context info for the
//!    model, or [`abort_turn`](ContextManager::abort_turn) restores the
//!    checkpoint so the store is exactly as it was before the turn.
//!
//! Two projections of the history are available: the model view (squashed
//! ranges collapsed to their summary, the latest context info appended) and
//! the user view (everything internal filtered out by the
//! [`InjectionGuard`]).

use crate::config::ContextConfig;
use crate::context::guard::InjectionGuard;
use crate::context::info::{ContextInfo, ContextSnapshot};
use crate::context::nudge::{Nudge, NudgeEngine, NudgeInput, PhaseSignal};
use crate::context::prunable::PrunabilityCalculator;
use crate::error::{PruneError, Result};
use crate::events::{ContextEvent, EventHandler, NoopHandler};
use crate::history::{EntryId, HistoryStore, HistoryView, NoteKind, Role, TurnIndex, ViewItem};
use crate::prune::tools::{self, ToolDef};
use crate::prune::{PruneOperations, PruneOp, PruneOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

// ── Statistics and audit ───────────────────────────────────────────

/// Running totals for a session.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub turns_committed: u32,
    pub turns_aborted: u32,
    pub discards: u32,
    pub extractions: u32,
    pub squashes: u32,
    /// Outputs moved to `SquashedAway` across all squashes.
    pub outputs_squashed: u32,
    /// Prune calls refused with an error.
    pub rejections: u32,
    /// Total committed-history cost removed by pruning.
    pub freed: u64,
}

impl PruneStats {
    fn record(&mut self, outcome: &PruneOutcome) {
        match outcome.op {
            PruneOp::Discard => self.discards += 1,
            PruneOp::Extract => self.extractions += 1,
            PruneOp::Squash => {
                self.squashes += 1;
                self.outputs_squashed += outcome.targets.len() as u32;
            }
        }
        self.freed += outcome.freed();
    }

    /// Successful prune operations.
    pub fn prunes(&self) -> u32 {
        self.discards + self.extractions + self.squashes
    }
}

/// One prune call, successful or not.
#[derive(Serialize, Debug, Clone)]
pub struct PruneRecord {
    pub at: DateTime<Utc>,
    pub turn: TurnIndex,
    pub call_id: String,
    pub tool: String,
    pub targets: Vec<EntryId>,
    pub freed: u64,
    /// Error code when the call was rejected.
    pub error: Option<String>,
}

// ── Turn checkpoint ────────────────────────────────────────────────

/// State restored when an in-flight turn is aborted.
#[derive(Clone)]
struct Checkpoint {
    store: HistoryStore,
    snapshot: Option<ContextSnapshot>,
    nudges: NudgeEngine,
    stats: PruneStats,
    audit_len: usize,
}

/// A result for a call of an earlier turn, delivered while a turn was in
/// flight. Replayed onto the checkpoint if that turn aborts.
enum LateDelivery {
    Completed {
        id: EntryId,
        content: String,
        resource: Option<String>,
    },
    Failed(EntryId),
}

struct InFlight {
    turn: TurnIndex,
    checkpoint: Checkpoint,
    late: Vec<LateDelivery>,
}

// ── Manager ────────────────────────────────────────────────────────

/// Owns the history of one session and mediates every change to it.
pub struct ContextManager {
    config: ContextConfig,
    store: HistoryStore,
    calculator: PrunabilityCalculator,
    nudges: NudgeEngine,
    snapshot: Option<ContextSnapshot>,
    in_flight: Option<InFlight>,
    stats: PruneStats,
    audit: Vec<PruneRecord>,
    guard: InjectionGuard,
    handler: Box<dyn EventHandler>,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            store: HistoryStore::new(config.metric.build()),
            calculator: PrunabilityCalculator::new(config.prunability.clone()),
            nudges: config.nudge_engine(),
            snapshot: None,
            in_flight: None,
            stats: PruneStats::default(),
            audit: Vec::new(),
            guard: InjectionGuard::default(),
            handler: Box::new(NoopHandler),
            config,
        }
    }

    /// Route [`ContextEvent`]s to `handler`.
    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Replace the guard applied by [`user_view`](Self::user_view).
    pub fn with_guard(mut self, guard: InjectionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// The live snapshot, if a turn has been committed.
    pub fn snapshot(&self) -> Option<&ContextSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn stats(&self) -> &PruneStats {
        &self.stats
    }

    pub fn audit_log(&self) -> &[PruneRecord] {
        &self.audit
    }

    pub fn nudge_engine(&self) -> &NudgeEngine {
        &self.nudges
    }

    /// Index of the turn being produced, if any.
    pub fn current_turn(&self) -> Option<TurnIndex> {
        self.in_flight.as_ref().map(|f| f.turn)
    }

    /// Definitions of the prune tools to offer the model.
    pub fn tool_definitions(&self) -> Vec<ToolDef> {
        tools::definitions()
    }

    // ── Turn lifecycle ──

    /// Start a new turn. Tool outputs whose call id appears in `text` count
    /// as referenced by this turn.
    pub fn begin_turn(&mut self, role: Role, text: impl Into<String>) -> Result<TurnIndex> {
        if let Some(turn) = self.current_turn() {
            return Err(PruneError::TurnInProgress(turn));
        }
        let checkpoint = Checkpoint {
            store: self.store.clone(),
            snapshot: self.snapshot.clone(),
            nudges: self.nudges.clone(),
            stats: self.stats.clone(),
            audit_len: self.audit.len(),
        };

        let text = text.into();
        let turn = self.store.append_turn(role, text.as_str());
        let touched = self.touch_references(&text, turn);
        debug!("Turn {turn} started ({role}, {touched} reference(s))");
        self.in_flight = Some(InFlight {
            turn,
            checkpoint,
            late: Vec::new(),
        });
        Ok(turn)
    }

    /// Record a tool call issued during the current turn.
    pub fn record_tool_call(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Result<EntryId> {
        let turn = self.current_turn().ok_or(PruneError::NoTurnInProgress)?;
        let tool_name = tool_name.into();
        let internal = tools::is_prune_tool(&tool_name);
        self.store
            .append_tool_call(turn, call_id, tool_name, input, internal)
    }

    /// Attach a result from the tool-execution layer. Results for calls of
    /// already committed turns are accepted too.
    pub fn complete_tool_call(
        &mut self,
        call_id: &str,
        content: impl Into<String>,
        resource: Option<String>,
    ) -> Result<EntryId> {
        let id = self.lookup_call(call_id)?;
        let content = content.into();
        self.store
            .append_tool_output(id, content.as_str(), resource.clone())?;
        if let Some(flight) = self.late_delivery(id) {
            flight.late.push(LateDelivery::Completed {
                id,
                content,
                resource,
            });
        }
        Ok(id)
    }

    /// The tool-execution layer reported a failure for `call_id`.
    pub fn fail_tool_call(&mut self, call_id: &str) -> Result<EntryId> {
        let id = self.lookup_call(call_id)?;
        self.store.fail_tool_call(id)?;
        if let Some(flight) = self.late_delivery(id) {
            flight.late.push(LateDelivery::Failed(id));
        }
        debug!("Tool call {call_id} failed");
        Ok(id)
    }

    /// Record that the current turn relies on output `id`.
    pub fn mark_referenced(&mut self, id: EntryId) -> Result<()> {
        let turn = self
            .current_turn()
            .or(self.store.last_turn())
            .ok_or(PruneError::UnknownEntry(id))?;
        self.store.touch(id, turn)
    }

    /// Run a prune tool call issued by the agent.
    ///
    /// The call and its result text (or `"Error: ..."`) are recorded in the
    /// current turn as internal entries either way.
    pub fn invoke_prune_tool(
        &mut self,
        call_id: &str,
        name: &str,
        arguments: &str,
    ) -> Result<PruneOutcome> {
        let turn = self.current_turn().ok_or(PruneError::NoTurnInProgress)?;
        let input = serde_json::from_str(arguments)
            .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()));
        let id = self.store.append_tool_call(turn, call_id, name, input, true)?;

        let result = tools::parse_call(name, arguments).and_then(|call| {
            PruneOperations::new(&mut self.store, self.snapshot.as_mut(), Some(turn)).apply(call)
        });

        let (text, record) = match &result {
            Ok(outcome) => {
                self.stats.record(outcome);
                self.nudges.record_prune();
                self.emit_outcome(outcome);
                let record = PruneRecord {
                    at: Utc::now(),
                    turn,
                    call_id: call_id.to_string(),
                    tool: name.to_string(),
                    targets: outcome.targets.clone(),
                    freed: outcome.freed(),
                    error: None,
                };
                (outcome.message(self.store.metric().unit()), record)
            }
            Err(error) => {
                self.stats.rejections += 1;
                self.handler.on_event(&ContextEvent::PruneRejected { tool: name, error });
                let record = PruneRecord {
                    at: Utc::now(),
                    turn,
                    call_id: call_id.to_string(),
                    tool: name.to_string(),
                    targets: Vec::new(),
                    freed: 0,
                    error: Some(error.code().to_string()),
                };
                (error.to_tool_result(), record)
            }
        };
        self.audit.push(record);
        self.store.append_tool_output(id, text, None)?;
        result
    }

    /// Recompute the prunable list for the current state. Clears staleness.
    pub fn refresh_snapshot(&mut self) -> &ContextSnapshot {
        let turn = self
            .current_turn()
            .or(self.store.last_turn())
            .unwrap_or(0);
        let nudge = self.snapshot.as_ref().map_or(Nudge::None, |s| s.nudge);
        let prunable = self.calculator.compute(&self.store, turn);
        self.handler.on_event(&ContextEvent::SnapshotComputed {
            turn,
            prunable: &prunable,
            nudge,
        });
        self.snapshot.insert(ContextSnapshot::new(turn, prunable, nudge))
    }

    /// Commit the in-flight turn and synthesize the context info for the
    /// next model call.
    pub fn commit_turn(&mut self, phase: PhaseSignal) -> Result<ContextInfo> {
        let turn = self
            .in_flight
            .take()
            .map(|f| f.turn)
            .ok_or(PruneError::NoTurnInProgress)?;

        let entries = self.calculator.rank(&self.store, turn);
        let prunable: Vec<EntryId> = entries.iter().map(|e| e.id).collect();
        let input = NudgeInput {
            active_cost: self.store.active_cost(),
            prunable_len: prunable.len(),
            phase,
        };
        let nudge = self.nudges.evaluate(input);
        let nudge_text = self.nudges.render(nudge, input);

        let info = ContextInfo {
            turn,
            prunable: entries,
            nudge,
            nudge_text,
        };
        self.store.append_note(
            turn,
            NoteKind::ContextInfo,
            crate::context::info::render_prunable_tools(&info.prunable, &self.store),
        );
        if let Some(text) = &info.nudge_text {
            self.store.append_note(turn, NoteKind::Nudge, text.as_str());
        }
        self.stats.turns_committed += 1;

        let committed_cost = self.store.committed_cost();
        let active_cost = input.active_cost;
        self.handler.on_event(&ContextEvent::TurnCommitted {
            turn,
            committed_cost,
            active_cost,
        });
        self.handler.on_event(&ContextEvent::SnapshotComputed {
            turn,
            prunable: &prunable,
            nudge,
        });
        self.snapshot = Some(ContextSnapshot::new(turn, prunable, nudge));
        info!(
            "Turn {turn} committed: {} prunable, nudge={nudge}, history ~{committed_cost} {}",
            info.prunable.len(),
            self.store.metric().unit()
        );
        Ok(info)
    }

    /// Roll back the in-flight turn. Store, snapshot, nudge state, stats and
    /// audit log return to where they were before `begin_turn`.
    ///
    /// Results delivered meanwhile for calls of earlier turns belong to
    /// those turns and are kept.
    pub fn abort_turn(&mut self) -> Result<TurnIndex> {
        let InFlight {
            turn,
            checkpoint,
            late,
        } = self.in_flight.take().ok_or(PruneError::NoTurnInProgress)?;
        self.store = checkpoint.store;
        self.snapshot = checkpoint.snapshot;
        self.nudges = checkpoint.nudges;
        self.stats = checkpoint.stats;
        self.audit.truncate(checkpoint.audit_len);
        self.stats.turns_aborted += 1;

        let kept = late.len();
        for delivery in late {
            let applied = match delivery {
                LateDelivery::Completed {
                    id,
                    content,
                    resource,
                } => self.store.append_tool_output(id, content, resource),
                LateDelivery::Failed(id) => self.store.fail_tool_call(id),
            };
            if let Err(e) = applied {
                warn!("Could not keep late result across abort: {e}");
            }
        }
        warn!("Turn {turn} aborted ({kept} late result(s) kept)");
        self.handler.on_event(&ContextEvent::TurnAborted { turn });
        Ok(turn)
    }

    // ── Views ──

    /// History as shown to the user: no context info, nudges, prune calls
    /// or squash summaries.
    pub fn user_view(&self) -> HistoryView<'_> {
        self.guard.filter(&self.store.snapshot())
    }

    /// History as sent to the model: squashed ranges collapse to their
    /// summary and only the most recent context info is kept.
    pub fn model_view(&self) -> HistoryView<'_> {
        let notes = self.store.notes();
        let latest_info = notes
            .iter()
            .rev()
            .find(|n| n.kind == NoteKind::ContextInfo);
        let latest_turn = latest_info.map(|n| n.after_turn);

        let items = self
            .store
            .snapshot()
            .into_items()
            .into_iter()
            .filter(|item| match item {
                ViewItem::Summary(_) => true,
                ViewItem::Turn { squashed_by, .. } => squashed_by.is_none(),
                ViewItem::Call { call, .. } => self.store.group_covering(call.turn).is_none(),
                ViewItem::Note(note) => match note.kind {
                    NoteKind::ContextInfo => latest_info.is_some_and(|l| std::ptr::eq(*note, l)),
                    NoteKind::Nudge => Some(note.after_turn) == latest_turn,
                },
            })
            .collect();
        HistoryView::new(items)
    }

    // ── Internals ──

    /// The in-flight turn, when `id` belongs to an earlier turn.
    fn late_delivery(&mut self, id: EntryId) -> Option<&mut InFlight> {
        let call_turn = self.store.get_call(id).ok()?.turn;
        self.in_flight.as_mut().filter(|f| call_turn < f.turn)
    }

    fn lookup_call(&self, call_id: &str) -> Result<EntryId> {
        self.store
            .find_by_call_id(call_id)
            .ok_or_else(|| PruneError::UnknownCall(call_id.to_string()))
    }

    /// Touch every output whose call id occurs in `text`.
    fn touch_references(&mut self, text: &str, turn: TurnIndex) -> usize {
        if text.is_empty() {
            return 0;
        }
        let referenced: Vec<EntryId> = self
            .store
            .outputs()
            .filter_map(|o| self.store.get_call(o.id).ok())
            .filter(|c| cites(text, &c.call_id))
            .map(|c| c.id)
            .collect();
        for id in &referenced {
            if let Err(e) = self.store.touch(*id, turn) {
                trace!("skipped reference to {id}: {e}");
            }
        }
        referenced.len()
    }

    fn emit_outcome(&self, outcome: &PruneOutcome) {
        let event = match (outcome.op, outcome.group, outcome.range) {
            (PruneOp::Squash, Some(group), Some((lo, hi))) => ContextEvent::Squashed {
                group,
                lo,
                hi,
                outcome,
            },
            (PruneOp::Extract, ..) => ContextEvent::Extracted {
                id: outcome.targets.first().copied().unwrap_or(EntryId(0)),
                outcome,
            },
            _ => ContextEvent::Discarded {
                id: outcome.targets.first().copied().unwrap_or(EntryId(0)),
                outcome,
            },
        };
        self.handler.on_event(&event);
    }
}

/// Whether `text` mentions `call_id` as a whole token, so `c10` does not
/// count as a mention of `c1`.
fn cites(text: &str, call_id: &str) -> bool {
    if call_id.is_empty() {
        return false;
    }
    let is_id_char = |c: char| c.is_alphanumeric() || c == '_' || c == '-';
    text.match_indices(call_id).any(|(at, _)| {
        let before = text.get(..at).and_then(|s| s.chars().next_back());
        let after = text
            .get(at + call_id.len()..)
            .and_then(|s| s.chars().next());
        !before.is_some_and(is_id_char) && !after.is_some_and(is_id_char)
    })
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::metric::MetricKind;
    use crate::context::nudge::NudgeConfig;
    use crate::context::prunable::PrunabilityConfig;
    use crate::events::FnEventHandler;
    use crate::history::OutputStatusKind;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn manager() -> ContextManager {
        ContextManager::new(
            ContextConfig::default()
                .with_metric(MetricKind::Bytes)
                .with_prunability(PrunabilityConfig::default().with_min_entry_size(10)),
        )
    }

    /// Commit one agent turn with a single 100-byte read.
    fn read_turn(m: &mut ContextManager, call_id: &str) -> EntryId {
        m.begin_turn(Role::Agent, "reading").unwrap();
        m.record_tool_call(call_id, "read_file", json!({"path": call_id}))
            .unwrap();
        let id = m.complete_tool_call(call_id, "x".repeat(100), None).unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();
        id
    }

    #[test]
    fn turn_lifecycle_errors() {
        let mut m = manager();
        assert_eq!(
            m.record_tool_call("c1", "grep", json!({})).unwrap_err(),
            PruneError::NoTurnInProgress
        );
        assert_eq!(
            m.commit_turn(PhaseSignal::Continuing).unwrap_err(),
            PruneError::NoTurnInProgress
        );
        m.begin_turn(Role::User, "hi").unwrap();
        assert_eq!(
            m.begin_turn(Role::Agent, "again").unwrap_err(),
            PruneError::TurnInProgress(1)
        );
        assert_eq!(
            m.complete_tool_call("nope", "x", None).unwrap_err(),
            PruneError::UnknownCall("nope".into())
        );
    }

    #[test]
    fn outputs_become_prunable_after_cooling_off() {
        let mut m = manager();
        let first = read_turn(&mut m, "c1");
        assert!(!m.snapshot().unwrap().contains(first));
        read_turn(&mut m, "c2");
        assert!(m.snapshot().unwrap().contains(first));
    }

    #[test]
    fn prune_through_tool_call() {
        let mut m = manager();
        let first = read_turn(&mut m, "c1");
        read_turn(&mut m, "c2");

        m.begin_turn(Role::Agent, "").unwrap();
        let outcome = m
            .invoke_prune_tool("p1", "discard", &format!(r#"{{"id": {}}}"#, first.0))
            .unwrap();
        assert_eq!(outcome.freed(), 100);
        let err = m
            .invoke_prune_tool("p2", "discard", r#"{"id": 2}"#)
            .unwrap_err();
        assert_eq!(err, PruneError::StaleSnapshot);
        m.commit_turn(PhaseSignal::Continuing).unwrap();

        assert_eq!(m.stats().discards, 1);
        assert_eq!(m.stats().rejections, 1);
        assert_eq!(m.audit_log().len(), 2);
        assert_eq!(m.audit_log()[1].error.as_deref(), Some("stale_snapshot"));

        let p2 = m.store().find_by_call_id("p2").unwrap();
        let result = m.store().get_output(p2).unwrap();
        assert!(result.content.as_deref().unwrap().starts_with("Error:"));
        assert!(result.internal);
    }

    #[test]
    fn abort_restores_everything() {
        let mut m = manager();
        let first = read_turn(&mut m, "c1");
        read_turn(&mut m, "c2");
        let before = m.store().committed_cost();

        m.begin_turn(Role::Agent, "mistake").unwrap();
        m.record_tool_call("c3", "grep", json!({})).unwrap();
        m.invoke_prune_tool("p1", "squash", r#"{"from_turn": 1, "to_turn": 1, "summary": "r"}"#)
            .unwrap();
        assert_eq!(m.abort_turn().unwrap(), 3);

        assert_eq!(m.store().turns().len(), 2);
        assert_eq!(m.store().committed_cost(), before);
        assert!(m.store().groups().is_empty());
        assert!(m.store().find_by_call_id("c3").is_none());
        assert!(m.store().get_output(first).unwrap().is_active());
        assert!(!m.snapshot().unwrap().is_stale());
        assert_eq!(m.stats().squashes, 0);
        assert_eq!(m.stats().turns_aborted, 1);
        assert!(m.audit_log().is_empty());
    }

    #[test]
    fn late_results_for_committed_turns() {
        let mut m = manager();
        m.begin_turn(Role::Agent, "").unwrap();
        m.record_tool_call("slow", "grep", json!({})).unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();

        m.begin_turn(Role::Agent, "").unwrap();
        let err = m
            .invoke_prune_tool("p", "squash", r#"{"from_turn": 1, "to_turn": 1, "summary": "s"}"#)
            .unwrap_err();
        assert_eq!(err, PruneError::IncompleteRange(1));
        m.commit_turn(PhaseSignal::Continuing).unwrap();

        let id = m.complete_tool_call("slow", "match", None).unwrap();
        assert_eq!(m.store().get_call(id).unwrap().turn, 1);
        assert!(m.store().get_output(id).unwrap().is_active());
    }

    #[test]
    fn references_keep_outputs_hot() {
        let mut m = manager();
        let first = read_turn(&mut m, "call_a");
        m.begin_turn(Role::Agent, "as shown in call_a, the config is fine")
            .unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();
        assert_eq!(m.store().get_output(first).unwrap().last_referenced, 2);
        assert!(!m.snapshot().unwrap().contains(first));
    }

    #[test]
    fn citing_longer_id_leaves_prefix_untouched() {
        let mut m = manager();
        m.begin_turn(Role::Agent, "reading everything").unwrap();
        for n in 1..=10 {
            let call_id = format!("c{n}");
            m.record_tool_call(call_id.as_str(), "read_file", json!({"n": n}))
                .unwrap();
            m.complete_tool_call(&call_id, "x".repeat(100), None).unwrap();
        }
        m.commit_turn(PhaseSignal::Continuing).unwrap();

        m.begin_turn(Role::Agent, "per c10, done").unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();

        let c1 = m.store().find_by_call_id("c1").unwrap();
        let c10 = m.store().find_by_call_id("c10").unwrap();
        assert_eq!(m.store().get_output(c1).unwrap().last_referenced, 1);
        assert_eq!(m.store().get_output(c10).unwrap().last_referenced, 2);
        assert!(m.snapshot().unwrap().contains(c1));
        assert!(!m.snapshot().unwrap().contains(c10));
    }

    #[test]
    fn call_ids_match_as_whole_tokens() {
        assert!(cites("see c1.", "c1"));
        assert!(cites("c1", "c1"));
        assert!(cites("(c1) and c10", "c1"));
        assert!(!cites("per c10, done", "c1"));
        assert!(!cites("abc1", "c1"));
        assert!(!cites("call_a_b", "call_a"));
        assert!(!cites("anything", ""));
    }

    #[test]
    fn late_result_stays_hot_on_arrival() {
        let mut m = manager();
        m.begin_turn(Role::Agent, "").unwrap();
        m.record_tool_call("slow", "build", json!({})).unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();
        for _ in 2..5 {
            m.begin_turn(Role::Agent, "").unwrap();
            m.commit_turn(PhaseSignal::Continuing).unwrap();
        }

        assert_eq!(m.begin_turn(Role::Agent, "").unwrap(), 5);
        let id = m.complete_tool_call("slow", "x".repeat(100), None).unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();
        assert_eq!(m.store().get_output(id).unwrap().created_at, 1);
        assert!(!m.snapshot().unwrap().contains(id));

        m.begin_turn(Role::Agent, "").unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();
        assert!(m.snapshot().unwrap().contains(id));
    }

    #[test]
    fn abort_keeps_late_results_of_earlier_turns() {
        let mut m = manager();
        m.begin_turn(Role::Agent, "").unwrap();
        m.record_tool_call("slow", "build", json!({})).unwrap();
        m.record_tool_call("flaky", "test", json!({})).unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();

        m.begin_turn(Role::Agent, "").unwrap();
        m.record_tool_call("c2", "grep", json!({})).unwrap();
        let slow = m.complete_tool_call("slow", "build ok", None).unwrap();
        m.fail_tool_call("flaky").unwrap();
        m.complete_tool_call("c2", "match", None).unwrap();
        m.abort_turn().unwrap();

        assert!(m.store().find_by_call_id("c2").is_none());
        assert!(!m.store().has_pending_calls(1));
        assert_eq!(
            m.store().get_output(slow).unwrap().content.as_deref(),
            Some("build ok")
        );

        m.begin_turn(Role::Agent, "").unwrap();
        m.invoke_prune_tool("p1", "squash", r#"{"from_turn": 1, "to_turn": 1, "summary": "b"}"#)
            .unwrap();
    }

    #[test]
    fn discard_nudge_after_grace_period() {
        let mut m = ContextManager::new(
            ContextConfig::default()
                .with_metric(MetricKind::Bytes)
                .with_prunability(PrunabilityConfig::default().with_min_entry_size(10))
                .with_nudges(NudgeConfig::default().with_grace_turns(1)),
        );
        read_turn(&mut m, "c1");
        m.begin_turn(Role::Agent, "").unwrap();
        let info = m.commit_turn(PhaseSignal::Continuing).unwrap();
        assert_eq!(info.nudge, Nudge::Discard);
        assert!(info.render(m.store()).contains("<context-reminder kind=\"discard\">"));
    }

    #[test]
    fn views_diverge_after_squash() {
        let mut m = manager();
        read_turn(&mut m, "c1");
        read_turn(&mut m, "c2");
        m.begin_turn(Role::Agent, "").unwrap();
        m.invoke_prune_tool(
            "p1",
            "squash",
            r#"{"from_turn": 1, "to_turn": 1, "summary": "read c1"}"#,
        )
        .unwrap();
        m.commit_turn(PhaseSignal::Continuing).unwrap();

        let model = m.model_view().render();
        assert!(model.contains("read c1"));
        assert!(!model.contains(r#"{"path":"c1"}"#));
        assert!(model.contains(r#"{"path":"c2"}"#));
        assert_eq!(model.matches("<prunable-tools>").count(), 1);

        let user = m.user_view().render();
        assert!(!user.contains("read c1"));
        assert!(!user.contains("<prunable-tools>"));
        assert!(!user.contains("squash("));
        assert!(user.contains("[cleared: squashed_away 100]"));
        assert_eq!(
            m.store()
                .get_output(m.store().find_by_call_id("c1").unwrap())
                .unwrap()
                .status
                .kind(),
            OutputStatusKind::SquashedAway
        );
    }

    #[test]
    fn events_follow_the_lifecycle() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut m = manager().with_event_handler(FnEventHandler::new(move |event| {
            let name = match event {
                ContextEvent::TurnCommitted { .. } => "commit",
                ContextEvent::TurnAborted { .. } => "abort",
                ContextEvent::SnapshotComputed { .. } => "snapshot",
                ContextEvent::Discarded { .. } => "discard",
                ContextEvent::Extracted { .. } => "extract",
                ContextEvent::Squashed { .. } => "squash",
                ContextEvent::PruneRejected { .. } => "rejected",
            };
            sink.lock().unwrap().push(name);
        }));
        read_turn(&mut m, "c1");
        m.begin_turn(Role::Agent, "").unwrap();
        let _ = m.invoke_prune_tool("p", "discard", r#"{"id": 1}"#);
        m.abort_turn().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["commit", "snapshot", "rejected", "abort"]
        );
    }

    #[test]
    fn refresh_clears_staleness() {
        let mut m = manager();
        let first = read_turn(&mut m, "c1");
        let second = read_turn(&mut m, "c2");
        read_turn(&mut m, "c3");
        m.begin_turn(Role::Agent, "").unwrap();
        m.invoke_prune_tool("p1", "discard", &format!(r#"{{"id": {}}}"#, first.0))
            .unwrap();
        assert!(m.refresh_snapshot().contains(second));
        m.invoke_prune_tool("p2", "discard", &format!(r#"{{"id": {}}}"#, second.0))
            .unwrap();
        assert_eq!(m.stats().discards, 2);
    }
}

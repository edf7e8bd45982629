//! Prunability: which tool outputs the agent may discard or extract.
//!
//! Tool outputs are the single largest context consumer in an agent loop,
//! and most of them stop mattering a few turns after the agent read them.
//! After every committed turn the [`PrunabilityCalculator`] ranks the active
//! outputs so the ones most worth dropping come first:
//!
//! 1. outputs superseded by a newer output for the same resource (re-reading
//!    a file makes the earlier read redundant);
//! 2. older outputs, with age capped at `max_age_turns`;
//! 3. larger outputs.
//!
//! Outputs the agent cited recently (`supersession_window`), outputs smaller
//! than `min_entry_size`, protected tools and internal outputs never appear.

use crate::history::{EntryId, HistoryStore, ToolOutput, TurnIndex};
use crate::prune::tools::{DISCARD_TOOL, EXTRACT_TOOL, SQUASH_TOOL};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Thresholds for [`PrunabilityCalculator`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PrunabilityConfig {
    /// Outputs costing less than this are never worth pruning.
    pub min_entry_size: u64,
    /// Age (in turns) beyond which all outputs rank as equally old.
    pub max_age_turns: u32,
    /// Outputs referenced within this many turns of the current turn are
    /// still hot and stay out of the list.
    pub supersession_window: u32,
    /// Tools whose outputs are never prunable.
    pub protected_tools: BTreeSet<String>,
}

impl Default for PrunabilityConfig {
    fn default() -> Self {
        Self {
            min_entry_size: 64,
            max_age_turns: 10,
            supersession_window: 1,
            protected_tools: [DISCARD_TOOL, EXTRACT_TOOL, SQUASH_TOOL]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl PrunabilityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a protected tool name (its outputs will never be prunable).
    pub fn protect_tool(mut self, name: impl Into<String>) -> Self {
        self.protected_tools.insert(name.into());
        self
    }

    pub fn with_min_entry_size(mut self, size: u64) -> Self {
        self.min_entry_size = size;
        self
    }

    pub fn with_max_age(mut self, turns: u32) -> Self {
        self.max_age_turns = turns;
        self
    }

    pub fn with_supersession_window(mut self, turns: u32) -> Self {
        self.supersession_window = turns;
        self
    }
}

/// One ranked entry of the prunable list.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PrunableEntry {
    pub id: EntryId,
    pub tool_name: String,
    pub size: u64,
    /// Turns since creation (uncapped).
    pub age: u32,
    pub superseded: bool,
}

/// Ranks active outputs for pruning.
#[derive(Debug, Clone, Default)]
pub struct PrunabilityCalculator {
    config: PrunabilityConfig,
}

impl PrunabilityCalculator {
    pub fn new(config: PrunabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PrunabilityConfig {
        &self.config
    }

    /// Ordered ids of prunable outputs as of `current_turn`.
    pub fn compute(&self, store: &HistoryStore, current_turn: TurnIndex) -> Vec<EntryId> {
        self.rank(store, current_turn)
            .into_iter()
            .map(|e| e.id)
            .collect()
    }

    /// Ranked prunable entries with the data used to rank them.
    pub fn rank(&self, store: &HistoryStore, current_turn: TurnIndex) -> Vec<PrunableEntry> {
        let newest = newest_per_resource(store);
        let cap = self.config.max_age_turns;

        let mut ranked: Vec<PrunableEntry> = store
            .outputs()
            .filter(|o| o.is_active() && !o.internal)
            .filter(|o| o.size >= self.config.min_entry_size)
            .filter(|o| !self.is_hot(o, current_turn))
            .filter_map(|o| {
                let call = store.get_call(o.id).ok()?;
                if self.config.protected_tools.contains(&call.tool_name) {
                    return None;
                }
                let superseded = o
                    .resource
                    .as_deref()
                    .and_then(|r| newest.get(r))
                    .is_some_and(|newest_id| *newest_id > o.id);
                Some(PrunableEntry {
                    id: o.id,
                    tool_name: call.tool_name.clone(),
                    size: o.size,
                    age: current_turn.saturating_sub(o.created_at),
                    superseded,
                })
            })
            .collect();

        ranked.sort_by_key(|e| (!e.superseded, Reverse(e.age.min(cap)), Reverse(e.size), e.id));

        debug!(
            "prunable at turn {current_turn}: {} entr{} ({} superseded)",
            ranked.len(),
            if ranked.len() == 1 { "y" } else { "ies" },
            ranked.iter().filter(|e| e.superseded).count(),
        );
        ranked
    }

    fn is_hot(&self, output: &ToolOutput, current_turn: TurnIndex) -> bool {
        current_turn.saturating_sub(output.last_referenced) < self.config.supersession_window
    }
}

/// Newest output id for each resource tag, across every non-internal output.
fn newest_per_resource(store: &HistoryStore) -> HashMap<&str, EntryId> {
    let mut newest: HashMap<&str, EntryId> = HashMap::new();
    for output in store.outputs().filter(|o| !o.internal) {
        if let Some(resource) = output.resource.as_deref() {
            let slot = newest.entry(resource).or_insert(output.id);
            *slot = (*slot).max(output.id);
        }
    }
    newest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::metric::ByteLength;
    use crate::history::{Role, StatusChange};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        store: HistoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: HistoryStore::new(Arc::new(ByteLength)),
            }
        }

        fn turn(&mut self) -> TurnIndex {
            self.store.append_turn(Role::Agent, "")
        }

        fn output(&mut self, tool: &str, size: usize, resource: Option<&str>) -> EntryId {
            let turn = self.store.last_turn().unwrap();
            let call_id = format!("c{}", self.store.calls().len() + 1);
            let id = self
                .store
                .append_tool_call(turn, call_id, tool, json!({}), false)
                .unwrap();
            self.store
                .append_tool_output(id, "x".repeat(size), resource.map(String::from))
                .unwrap();
            id
        }
    }

    fn calc() -> PrunabilityCalculator {
        PrunabilityCalculator::new(
            PrunabilityConfig::new()
                .with_min_entry_size(10)
                .with_supersession_window(1),
        )
    }

    #[test]
    fn superseded_outputs_rank_first() {
        let mut f = Fixture::new();
        f.turn();
        let unrelated = f.output("grep", 50_000, Some("pattern"));
        let mut reads = Vec::new();
        for _ in 0..5 {
            f.turn();
            reads.push(f.output("read_file", 10_000, Some("R")));
        }
        let t = f.turn();
        let latest = f.output("read_file", 10_000, Some("R"));

        let ids = calc().compute(&f.store, t);
        assert_eq!(&ids[..5], &reads[..]);
        assert_eq!(ids[5], unrelated);
        assert!(!ids.contains(&latest));
    }

    #[test]
    fn older_then_larger() {
        let mut f = Fixture::new();
        f.turn();
        let old_small = f.output("grep", 100, None);
        f.turn();
        let young_big = f.output("grep", 5_000, None);
        let young_small = f.output("grep", 200, None);
        let t = f.turn();

        let ids = calc().compute(&f.store, t);
        assert_eq!(ids, vec![old_small, young_big, young_small]);
    }

    #[test]
    fn age_cap_lets_size_decide_among_old_entries() {
        let mut f = Fixture::new();
        f.turn();
        let oldest_small = f.output("grep", 100, None);
        f.turn();
        let old_big = f.output("grep", 9_000, None);
        for _ in 0..10 {
            f.turn();
        }
        let t = f.store.last_turn().unwrap();

        let capped = PrunabilityCalculator::new(
            PrunabilityConfig::new().with_min_entry_size(10).with_max_age(3),
        );
        assert_eq!(capped.compute(&f.store, t), vec![old_big, oldest_small]);
        let uncapped = PrunabilityCalculator::new(
            PrunabilityConfig::new().with_min_entry_size(10).with_max_age(100),
        );
        assert_eq!(uncapped.compute(&f.store, t), vec![oldest_small, old_big]);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let mut f = Fixture::new();
        f.turn();
        let a = f.output("grep", 300, None);
        let b = f.output("grep", 300, None);
        let t = f.turn();
        assert_eq!(calc().compute(&f.store, t), vec![a, b]);
    }

    #[test]
    fn small_hot_protected_and_inactive_excluded() {
        let mut f = Fixture::new();
        f.turn();
        let tiny = f.output("grep", 5, None);
        let protected = f.output("discard", 500, None);
        let gone = f.output("grep", 500, None);
        f.store.mark_status(gone, StatusChange::Discard).unwrap();
        let t2 = f.turn();
        let hot = f.output("grep", 500, None);

        let ids = calc().compute(&f.store, t2);
        assert!(!ids.contains(&tiny));
        assert!(!ids.contains(&protected));
        assert!(!ids.contains(&gone));
        assert!(!ids.contains(&hot));
        assert!(ids.is_empty());
    }

    #[test]
    fn recent_reference_keeps_entry_hot() {
        let mut f = Fixture::new();
        f.turn();
        let id = f.output("read_file", 500, None);
        f.turn();
        let t3 = f.turn();
        f.store.touch(id, t3).unwrap();

        let wide = PrunabilityCalculator::new(
            PrunabilityConfig::new()
                .with_min_entry_size(10)
                .with_supersession_window(2),
        );
        assert!(wide.compute(&f.store, t3).is_empty());
        let t4 = f.turn();
        assert!(wide.compute(&f.store, t4).is_empty());
        let t5 = f.turn();
        assert_eq!(wide.compute(&f.store, t5), vec![id]);
    }

    #[test]
    fn deterministic_for_identical_state() {
        let mut f = Fixture::new();
        for i in 0..8 {
            f.turn();
            f.output("grep", 100 + (i % 3) * 50, Some(if i % 2 == 0 { "a" } else { "b" }));
        }
        let t = f.turn();
        let first = calc().compute(&f.store, t);
        let second = calc().compute(&f.store.clone(), t);
        assert_eq!(first, second);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: PrunabilityConfig =
            serde_json::from_str(r#"{"min_entry_size": 1000}"#).unwrap();
        assert_eq!(config.min_entry_size, 1000);
        assert_eq!(config.max_age_turns, 10);
        assert!(config.protected_tools.contains("squash"));
    }
}

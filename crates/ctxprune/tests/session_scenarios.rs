//! End-to-end behaviour of a pruning session driven through `ContextManager`.

use ctxprune::prelude::*;
use serde_json::json;

fn bytes_config() -> ContextConfig {
    ContextConfig::default().with_metric(MetricKind::Bytes)
}

/// Run one agent turn whose calls all complete immediately, then commit.
fn turn(
    ctx: &mut ContextManager,
    calls: &[(&str, &str, usize, Option<&str>)],
    phase: PhaseSignal,
) -> (Vec<EntryId>, ContextInfo) {
    ctx.begin_turn(Role::Agent, "working").unwrap();
    let mut ids = Vec::new();
    for (call_id, tool, size, resource) in calls {
        ctx.record_tool_call(*call_id, *tool, json!({"target": call_id}))
            .unwrap();
        let id = ctx
            .complete_tool_call(call_id, "r".repeat(*size), resource.map(String::from))
            .unwrap();
        ids.push(id);
    }
    let info = ctx.commit_turn(phase).unwrap();
    (ids, info)
}

fn prune(
    ctx: &mut ContextManager,
    call_id: &str,
    tool: &str,
    args: serde_json::Value,
) -> Result<PruneOutcome> {
    ctx.invoke_prune_tool(call_id, tool, &args.to_string())
}

#[test]
fn superseded_resource_outputs_rank_first() {
    let mut ctx = ContextManager::new(bytes_config());
    let mut r_outputs = Vec::new();
    let mut unrelated = Vec::new();
    for n in 1..=5 {
        let read = format!("read{n}");
        let grep = format!("grep{n}");
        let (ids, _) = turn(
            &mut ctx,
            &[
                (read.as_str(), "read_file", 10_000, Some("R")),
                (grep.as_str(), "grep", 800, None),
            ],
            PhaseSignal::Continuing,
        );
        r_outputs.push(ids[0]);
        unrelated.push(ids[1]);
    }
    let (latest, info) = turn(
        &mut ctx,
        &[("read6", "read_file", 10_000, Some("R"))],
        PhaseSignal::Continuing,
    );

    let listed: Vec<EntryId> = info.prunable.iter().map(|e| e.id).collect();
    assert_eq!(&listed[..5], r_outputs.as_slice());
    assert!(info.prunable[..5].iter().all(|e| e.superseded));
    assert!(unrelated.iter().all(|id| listed.contains(id)));
    assert!(!listed.contains(&latest[0]));

    ctx.begin_turn(Role::Agent, "").unwrap();
    let outcome = prune(&mut ctx, "p1", "discard", json!({"id": r_outputs[0].0})).unwrap();
    assert_eq!(outcome.freed(), 10_000);

    let output = ctx.store().get_output(r_outputs[0]).unwrap();
    assert_eq!(output.status, OutputStatus::Discarded);
    assert!(output.content.is_none());
    assert_eq!(output.size, 10_000);
    assert_eq!(output.id, r_outputs[0]);
}

#[test]
fn squash_over_extracted_output_clears_summary() {
    let mut ctx = ContextManager::new(bytes_config());
    let mut outputs = Vec::new();
    for n in 1..=4 {
        let call = format!("c{n}");
        let (ids, _) = turn(
            &mut ctx,
            &[(call.as_str(), "read_file", 2_000, None)],
            PhaseSignal::Continuing,
        );
        outputs.push(ids[0]);
    }

    ctx.begin_turn(Role::Agent, "").unwrap();
    prune(
        &mut ctx,
        "p1",
        "extract",
        json!({"id": outputs[2].0, "summary": "turn 3 read: port=8080"}),
    )
    .unwrap();
    ctx.commit_turn(PhaseSignal::Continuing).unwrap();
    assert_eq!(
        ctx.store().get_output(outputs[2]).unwrap().extraction_summary(),
        Some("turn 3 read: port=8080")
    );

    ctx.begin_turn(Role::Agent, "").unwrap();
    let outcome = prune(
        &mut ctx,
        "p2",
        "squash",
        json!({"from_turn": 2, "to_turn": 4, "summary": "read three config files"}),
    )
    .unwrap();
    assert_eq!(outcome.targets, outputs[1..4].to_vec());

    let squashed = ctx.store().get_output(outputs[2]).unwrap();
    assert_eq!(squashed.status.kind(), OutputStatusKind::SquashedAway);
    assert!(squashed.extraction_summary().is_none());
    assert!(squashed.content.is_none());
    assert!(ctx.store().get_output(outputs[0]).unwrap().is_active());
}

#[test]
fn extract_of_unlisted_active_output_is_not_prunable() {
    let mut ctx = ContextManager::new(bytes_config());
    turn(&mut ctx, &[("c1", "read_file", 500, None)], PhaseSignal::Continuing);
    let (fresh, info) = turn(
        &mut ctx,
        &[("c2", "read_file", 500, None)],
        PhaseSignal::Continuing,
    );
    assert!(!info.prunable.iter().any(|e| e.id == fresh[0]));

    ctx.begin_turn(Role::Agent, "").unwrap();
    let args = json!({"id": fresh[0].0, "summary": "s"});
    let err = prune(&mut ctx, "p1", "extract", args).unwrap_err();
    assert_eq!(err, PruneError::NotPrunable(fresh[0]));
    assert!(ctx.store().get_output(fresh[0]).unwrap().is_active());
}

#[test]
fn double_discard_is_refused() {
    let mut ctx = ContextManager::new(bytes_config());
    let (ids, _) = turn(&mut ctx, &[("c1", "read_file", 500, None)], PhaseSignal::Continuing);
    turn(&mut ctx, &[], PhaseSignal::Continuing);

    ctx.begin_turn(Role::Agent, "").unwrap();
    prune(&mut ctx, "p1", "discard", json!({"id": ids[0].0})).unwrap();
    let err = prune(&mut ctx, "p2", "discard", json!({"id": ids[0].0})).unwrap_err();
    assert_eq!(err, PruneError::StaleSnapshot);

    ctx.refresh_snapshot();
    let err = prune(&mut ctx, "p3", "discard", json!({"id": ids[0].0})).unwrap_err();
    assert_eq!(err, PruneError::NotPrunable(ids[0]));
}

#[test]
fn prune_tool_results_never_reach_the_user() {
    let mut ctx = ContextManager::new(bytes_config());
    let (ids, _) = turn(&mut ctx, &[("c1", "read_file", 500, None)], PhaseSignal::Continuing);
    turn(&mut ctx, &[], PhaseSignal::Continuing);
    ctx.begin_turn(Role::Agent, "").unwrap();
    prune(&mut ctx, "p1", "extract", json!({"id": ids[0].0, "summary": "short"})).unwrap();
    let _ = prune(&mut ctx, "p2", "squash", json!({"from_turn": 9, "to_turn": 9, "summary": "s"}));
    ctx.commit_turn(PhaseSignal::Continuing).unwrap();

    let full = ctx.store().snapshot();
    let visible = ctx.user_view();
    assert!(visible.len() < full.len());
    for item in visible.items() {
        assert!(!item.is_internal());
        let text = item.render();
        assert!(!text.contains("<prunable-tools>"));
        assert!(!text.starts_with("  extract("));
        assert!(!text.contains("Error:"));
    }
}

#[test]
fn invalid_arguments_are_reported_as_tool_errors() {
    let mut ctx = ContextManager::new(bytes_config());
    turn(&mut ctx, &[("c1", "read_file", 500, None)], PhaseSignal::Continuing);
    ctx.begin_turn(Role::Agent, "").unwrap();

    let err = ctx.invoke_prune_tool("p1", "discard", r#"{"id": -3}"#).unwrap_err();
    assert!(matches!(err, PruneError::InvalidArguments { .. }));
    let err = ctx.invoke_prune_tool("p2", "forget", "{}").unwrap_err();
    assert_eq!(err, PruneError::UnknownTool("forget".into()));
    assert_eq!(ctx.stats().rejections, 2);

    let p1 = ctx.store().find_by_call_id("p1").unwrap();
    let text = ctx.store().get_output(p1).unwrap().content.clone().unwrap();
    assert!(text.starts_with("Error: invalid arguments for 'discard'"));
}

#[test]
fn squash_nudge_between_phases_only() {
    let config = bytes_config().with_nudges(
        NudgeConfig::default()
            .with_critical_budget(1_000)
            .with_grace_turns(100),
    );
    let mut ctx = ContextManager::new(config);
    let (_, info) = turn(&mut ctx, &[("c1", "read_file", 5_000, None)], PhaseSignal::Continuing);
    assert_eq!(info.nudge, Nudge::None);
    let (_, info) = turn(&mut ctx, &[], PhaseSignal::BetweenPhases);
    assert_eq!(info.nudge, Nudge::Squash);
    let (_, info) = turn(&mut ctx, &[], PhaseSignal::BetweenPhases);
    assert_eq!(info.nudge, Nudge::None);
    let (_, info) = turn(&mut ctx, &[], PhaseSignal::BetweenPhases);
    assert_eq!(info.nudge, Nudge::Squash);
}

/// Deterministic xorshift so the sequence is reproducible.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

#[test]
fn random_sessions_hold_invariants() {
    for seed in [0x9e37_79b9_7f4a_7c15_u64, 0x2545_f491_4f6c_dd1d, 0xdead_beef_cafe_f00d] {
        let mut rng = Rng(seed);
        let mut ctx = ContextManager::new(
            bytes_config().with_nudges(NudgeConfig::default().with_critical_budget(3_000)),
        );
        let mut previous_nudge = Nudge::None;
        let mut call = 0;
        let mut prunes = 0;

        for _ in 0..40 {
            ctx.begin_turn(Role::Agent, "step").unwrap();
            for _ in 0..rng.next() % 3 {
                call += 1;
                let call_id = format!("c{call}");
                let resource = format!("file{}", rng.next() % 4);
                ctx.record_tool_call(call_id.as_str(), "read_file", json!({}))
                    .unwrap();
                let content = "z".repeat(100 + (rng.next() % 900) as usize);
                ctx.complete_tool_call(&call_id, content, Some(resource))
                    .unwrap();
            }

            for _ in 0..rng.next() % 3 {
                prunes += 1;
                let active_before = ctx.store().active_cost();
                let committed_before = ctx.store().committed_cost();
                let committed = ctx.store().last_turn().unwrap_or(1).saturating_sub(1).max(1);
                let listed = ctx.snapshot().map(|s| s.prunable.clone()).unwrap_or_default();
                let pick = listed.first().map_or(1, |id| id.0);
                let args = match rng.next() % 3 {
                    0 => ("discard", json!({"id": pick})),
                    1 => ("extract", json!({"id": pick, "summary": "kept facts"})),
                    _ => {
                        let lo = 1 + (rng.next() % committed as u64) as u32;
                        let hi = lo + (rng.next() % 3) as u32;
                        ("squash", json!({"from_turn": lo, "to_turn": hi, "summary": "done"}))
                    }
                };
                let call_id = format!("p{prunes}");
                if let Ok(outcome) = ctx.invoke_prune_tool(&call_id, args.0, &args.1.to_string()) {
                    assert!(ctx.store().active_cost() <= active_before);
                    assert!(outcome.cost_after <= outcome.cost_before);

                    // The tool's own result message is appended after the operation.
                    let store = ctx.store();
                    let message = store
                        .find_by_call_id(&call_id)
                        .and_then(|id| store.get_output(id).ok())
                        .map_or(0, |o| store.retained_cost(o));
                    assert!(store.committed_cost() - message <= committed_before);
                }
            }

            if rng.next() % 7 == 0 {
                ctx.abort_turn().unwrap();
                continue;
            }
            let phase = if rng.next() % 2 == 0 {
                PhaseSignal::Continuing
            } else {
                PhaseSignal::BetweenPhases
            };
            let info = ctx.commit_turn(phase).unwrap();
            assert!(info.nudge == Nudge::None || info.nudge != previous_nudge);
            previous_nudge = info.nudge;
        }

        let groups = ctx.store().groups();
        for (i, a) in groups.iter().enumerate() {
            for b in &groups[i + 1..] {
                assert!(a.hi < b.lo || b.hi < a.lo, "{a:?} overlaps {b:?}");
            }
        }
        for output in ctx.store().outputs() {
            let is_active = output.status.kind() == OutputStatusKind::Active;
            assert_eq!(output.content.is_some(), is_active);
        }
    }
}

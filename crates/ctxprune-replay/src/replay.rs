//! Drive a [`ContextManager`] through a [`SessionScript`].
//!
//! Each turn's ordinary tool calls run concurrently as simulated tool
//! executions (`join_all`); their results are then fed back into the
//! manager one at a time in issue order, followed by late results, then
//! the turn's prune calls. Rejected prune calls are part of the report,
//! not replay failures; anything else the manager rejects aborts the replay.

use crate::script::{ScriptedCall, ScriptedTurn, SessionScript};
use anyhow::{Context, Result};
use ctxprune::context::Nudge;
use ctxprune::history::{EntryId, TurnIndex};
use ctxprune::session::{ContextManager, PruneRecord, PruneStats};
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// What happened in one scripted turn.
#[derive(Serialize, Debug, Clone)]
pub struct TurnReport {
    pub turn: TurnIndex,
    pub aborted: bool,
    /// Prunable ids after commit, best candidates first.
    pub prunable: Vec<EntryId>,
    pub nudge: Nudge,
    /// Rendered context info (`<prunable-tools>` plus nudge).
    pub context_info: Option<String>,
    /// Tool result text of each prune call, in order.
    pub prune_results: Vec<String>,
    pub committed_cost: u64,
}

/// Full result of a replay.
#[derive(Serialize, Debug, Clone)]
pub struct ReplayReport {
    pub unit: &'static str,
    pub turns: Vec<TurnReport>,
    pub stats: PruneStats,
    pub audit: Vec<PruneRecord>,
    pub committed_cost: u64,
    pub active_cost: u64,
}

/// Simulated tool-layer result.
enum Execution {
    Completed { content: String, resource: Option<String> },
    Failed,
}

async fn execute(call: &ScriptedCall, latency: Duration) -> Execution {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    if call.fail {
        Execution::Failed
    } else {
        Execution::Completed {
            content: call.result_text(),
            resource: call.resource.clone(),
        }
    }
}

/// Replays scripts against a context manager.
pub struct Replayer {
    ctx: ContextManager,
    latency: Duration,
}

impl Replayer {
    pub fn new(ctx: ContextManager) -> Self {
        Self {
            ctx,
            latency: Duration::ZERO,
        }
    }

    /// Simulated latency for every tool call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn context(&self) -> &ContextManager {
        &self.ctx
    }

    pub fn into_context(self) -> ContextManager {
        self.ctx
    }

    /// Run every turn of `script` and summarize the session.
    pub async fn run(&mut self, script: &SessionScript) -> Result<ReplayReport> {
        let mut turns = Vec::with_capacity(script.turns.len());
        for (n, turn) in script.turns.iter().enumerate() {
            let report = self
                .run_turn(turn)
                .await
                .with_context(|| format!("script turn {} failed", n + 1))?;
            turns.push(report);
        }

        let store = self.ctx.store();
        let report = ReplayReport {
            unit: store.metric().unit(),
            turns,
            stats: self.ctx.stats().clone(),
            audit: self.ctx.audit_log().to_vec(),
            committed_cost: store.committed_cost(),
            active_cost: store.active_cost(),
        };
        info!(
            "Replayed {} turn(s): {} prune(s), {} rejected, ~{} {} freed",
            report.turns.len(),
            report.stats.prunes(),
            report.stats.rejections,
            report.stats.freed,
            report.unit
        );
        Ok(report)
    }

    async fn run_turn(&mut self, turn: &ScriptedTurn) -> Result<TurnReport> {
        let index = self.ctx.begin_turn(turn.role, turn.text.as_str())?;

        for call in &turn.calls {
            self.ctx
                .record_tool_call(call.id.as_str(), call.tool.as_str(), call.input.clone())?;
        }

        let immediate: Vec<&ScriptedCall> = turn.calls.iter().filter(|c| !c.deferred).collect();
        let latency = self.latency;
        let executions = join_all(immediate.iter().map(|call| execute(call, latency))).await;
        for (call, execution) in immediate.iter().zip(executions) {
            match execution {
                Execution::Completed { content, resource } => {
                    self.ctx.complete_tool_call(&call.id, content, resource)?;
                }
                Execution::Failed => {
                    self.ctx.fail_tool_call(&call.id)?;
                }
            }
        }

        for late in &turn.late_results {
            if late.fail {
                self.ctx.fail_tool_call(&late.id)?;
            } else {
                self.ctx
                    .complete_tool_call(&late.id, late.result_text(), late.resource.clone())?;
            }
        }

        let mut prune_results = Vec::with_capacity(turn.prune.len());
        for call in &turn.prune {
            let arguments = call.arguments.to_string();
            let text = match self.ctx.invoke_prune_tool(&call.id, &call.tool, &arguments) {
                Ok(outcome) => outcome.message(self.ctx.store().metric().unit()),
                Err(e) => e.to_tool_result(),
            };
            debug!("{} -> {text}", call.tool);
            prune_results.push(text);
        }

        if turn.abort {
            self.ctx.abort_turn()?;
            return Ok(TurnReport {
                turn: index,
                aborted: true,
                prunable: self
                    .ctx
                    .snapshot()
                    .map(|s| s.prunable.clone())
                    .unwrap_or_default(),
                nudge: Nudge::None,
                context_info: None,
                prune_results,
                committed_cost: self.ctx.store().committed_cost(),
            });
        }

        let info = self.ctx.commit_turn(turn.phase)?;
        Ok(TurnReport {
            turn: index,
            aborted: false,
            prunable: info.prunable.iter().map(|e| e.id).collect(),
            nudge: info.nudge,
            context_info: Some(info.render(self.ctx.store())),
            prune_results,
            committed_cost: self.ctx.store().committed_cost(),
        })
    }
}

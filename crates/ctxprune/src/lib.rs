//! Context window management for long-running tool-using agents.
//!
//! `ctxprune` keeps an agent's conversation history within budget by letting
//! the agent itself prune it. After every committed turn the
//! [`ContextManager`](session::ContextManager) ranks the tool outputs that
//! are safe to remove, tells the agent about them in a `<prunable-tools>`
//! block, and optionally nudges it to act. The agent answers with one of
//! three tool calls:
//!
//! - `discard(id)`: drop an output's content;
//! - `extract(id, summary)`: keep only a strictly smaller summary;
//! - `squash(from_turn, to_turn, summary)`: collapse a completed turn range.
//!
//! Entries are never deleted. Every output keeps its id and original size
//! for audit, and all bookkeeping stays out of user-facing transcripts.
//!
//! # Getting started
//!
//! ```ignore
//! use ctxprune::prelude::*;
//! use serde_json::json;
//!
//! let mut ctx = ContextManager::new(ContextConfig::default())
//!     .with_event_handler(LoggingHandler);
//!
//! ctx.begin_turn(Role::Agent, "Reading the config.")?;
//! ctx.record_tool_call("call_1", "read_file", json!({"path": "config.toml"}))?;
//! ctx.complete_tool_call("call_1", file_contents, Some("config.toml".into()))?;
//! let info = ctx.commit_turn(PhaseSignal::Continuing)?;
//!
//! // Send `ctx.model_view()` plus `info.render(ctx.store())` to the model,
//! // offer it `ctx.tool_definitions()`, and route prune calls back:
//! ctx.begin_turn(Role::Agent, "")?;
//! ctx.invoke_prune_tool("call_2", "discard", r#"{"id": 1}"#)?;
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`history`] | Append-only store of turns, calls, outputs and squash groups |
//! | [`context`] | Size metric, prunability ranking, nudges, injection guard |
//! | [`prune`] | `discard`, `extract` and `squash` plus their tool definitions |
//! | [`session`] | Per-session orchestrator with turn checkpoints |
//! | [`events`] | Event stream and handlers |
//! | [`config`] | Session configuration |

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod history;
pub mod prelude;
pub mod prune;
pub mod session;

pub use error::{PruneError, Result};
pub use session::ContextManager;

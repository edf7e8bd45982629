//! Agent-facing tool definitions for `discard`, `extract` and `squash`.
//!
//! The agent calls the prune operations through ordinary function calling.
//! This module exports their definitions (name, description, JSON Schema
//! generated from the argument structs), validates raw JSON arguments
//! against that schema, and parses them into a typed [`PruneCall`].

use crate::error::{PruneError, Result};
use crate::history::{EntryId, TurnIndex};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DISCARD_TOOL: &str = "discard";
pub const EXTRACT_TOOL: &str = "extract";
pub const SQUASH_TOOL: &str = "squash";

// ── Tool definitions ───────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition in OpenAI function-calling format.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Generate a JSON Schema value for an argument struct.
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Arguments ──────────────────────────────────────────────────────

/// Arguments for `discard`.
#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DiscardArgs {
    /// Id of a tool output listed in <prunable-tools>.
    pub id: u64,
}

/// Arguments for `extract`.
#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtractArgs {
    /// Id of a tool output listed in <prunable-tools>.
    pub id: u64,
    /// The facts to keep. Must be shorter than the original output.
    pub summary: String,
}

/// Arguments for `squash`.
#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SquashArgs {
    /// First turn to replace (inclusive).
    pub from_turn: TurnIndex,
    /// Last turn to replace (inclusive).
    pub to_turn: TurnIndex,
    /// Summary of the work done in those turns.
    pub summary: String,
}

/// A parsed prune tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum PruneCall {
    Discard { id: EntryId },
    Extract { id: EntryId, summary: String },
    Squash {
        lo: TurnIndex,
        hi: TurnIndex,
        summary: String,
    },
}

/// Whether `name` is one of the prune tools.
pub fn is_prune_tool(name: &str) -> bool {
    matches!(name, DISCARD_TOOL | EXTRACT_TOOL | SQUASH_TOOL)
}

/// Definitions of the three prune tools.
pub fn definitions() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            DISCARD_TOOL,
            "Remove a tool output you no longer need from the context. The content \
             is gone for good; only its id and size remain. Only ids listed in \
             <prunable-tools> are accepted, and only one prune call per context update.",
            json_schema_for::<DiscardArgs>(),
        ),
        ToolDef::new(
            EXTRACT_TOOL,
            "Replace a tool output with a shorter summary of the facts you still \
             need. Only ids listed in <prunable-tools> are accepted.",
            json_schema_for::<ExtractArgs>(),
        ),
        ToolDef::new(
            SQUASH_TOOL,
            "Replace a completed range of turns with one summary. Every tool output \
             in the range is cleared. Ranges cannot overlap an earlier squash or \
             include turns still waiting on tool results.",
            json_schema_for::<SquashArgs>(),
        ),
    ]
}

/// Validate raw JSON `arguments` against `def`'s parameter schema.
pub fn validate_arguments(def: &ToolDef, arguments: &str) -> Result<serde_json::Value> {
    let invalid = |reason: String| PruneError::InvalidArguments {
        tool: def.function.name.clone(),
        reason,
    };
    let value: serde_json::Value =
        serde_json::from_str(arguments).map_err(|e| invalid(format!("invalid JSON: {e}")))?;

    // A schema that fails to compile is not the agent's fault; parsing still
    // checks the shape below.
    let Ok(validator) = jsonschema::validator_for(&def.function.parameters) else {
        return Ok(value);
    };
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(invalid(errors.join("; ")))
    }
}

/// Validate and parse a prune tool call.
pub fn parse_call(name: &str, arguments: &str) -> Result<PruneCall> {
    let def = definitions()
        .into_iter()
        .find(|d| d.function.name == name)
        .ok_or_else(|| PruneError::UnknownTool(name.to_string()))?;
    let value = validate_arguments(&def, arguments)?;
    let invalid = |e: serde_json::Error| PruneError::InvalidArguments {
        tool: name.to_string(),
        reason: e.to_string(),
    };

    match name {
        DISCARD_TOOL => {
            let args: DiscardArgs = serde_json::from_value(value).map_err(invalid)?;
            Ok(PruneCall::Discard {
                id: EntryId(args.id),
            })
        }
        EXTRACT_TOOL => {
            let args: ExtractArgs = serde_json::from_value(value).map_err(invalid)?;
            Ok(PruneCall::Extract {
                id: EntryId(args.id),
                summary: args.summary,
            })
        }
        _ => {
            let args: SquashArgs = serde_json::from_value(value).map_err(invalid)?;
            Ok(PruneCall::Squash {
                lo: args.from_turn,
                hi: args.to_turn,
                summary: args.summary,
            })
        }
    }
}

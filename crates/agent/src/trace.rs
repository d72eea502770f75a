//! Per-turn traces, returned as pretty JSON in verbose mode.

use agentkit_core::memory::ToolUsage;
use serde::{Deserialize, Serialize};

/// What happened during one orchestrated turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTrace {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_requested: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_args: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_output: String,
    pub final_text: String,
}

impl TurnTrace {
    pub fn tool_fired(&self) -> bool {
        !self.tool_requested.is_empty()
    }

    /// The `tool_used` metadata value for this turn.
    pub fn tool_usage(&self) -> ToolUsage {
        ToolUsage {
            tool_requested: self.tool_requested.clone(),
            tool_args: self.tool_args.clone(),
            tool_output: self.tool_output.clone(),
        }
    }

    /// Pretty JSON when verbose, the final text otherwise.
    pub fn render(&self, verbose: bool) -> String {
        if verbose {
            to_pretty_json(self)
        } else {
            self.final_text.clone()
        }
    }
}

/// A routed turn: the routing decision merged with the inner turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTrace {
    pub router_enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub router_path: String,
    pub base_prompt: String,
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub router_raw: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub router_error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chosen: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub special_prompt: String,
    #[serde(flatten)]
    pub turn: TurnTrace,
}

impl RouteTrace {
    pub fn render(&self, verbose: bool) -> String {
        if verbose {
            to_pretty_json(self)
        } else {
            self.turn.final_text.clone()
        }
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    // Plain structs of strings always serialize.
    serde_json::to_string_pretty(value).unwrap_or_default()
}

//! The free-text tool-call protocol.
//!
//! A model reply requests a tool when its first whitespace-separated token
//! is `TOOL:<name>`. The remaining tokens are the positional arguments.
//! Nothing else in the reply is interpreted.

/// Marker that opens a tool request.
pub const TOOL_MARKER: &str = "TOOL:";

/// A tool request parsed from a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse a model reply into a tool request.
///
/// Returns `None` for ordinary replies, including a bare `TOOL:` with no name
/// attached to the marker.
pub fn parse_tool_call(reply: &str) -> Option<ToolInvocation> {
    let mut tokens = reply.split_whitespace();
    let name = tokens.next()?.strip_prefix(TOOL_MARKER)?;
    if name.is_empty() {
        return None;
    }
    Some(ToolInvocation {
        name: name.to_string(),
        args: tokens.map(str::to_string).collect(),
    })
}

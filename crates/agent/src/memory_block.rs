//! Renders retrieved memory as one system message.

use agentkit_core::memory::StructuredFacts;
use agentkit_core::message::Turn;
use std::fmt::Write;

pub const RECENT_HEADING: &str = "== Short-term memory (recent messages) ==";
pub const FACTS_HEADING: &str = "== Structured facts ==";
pub const FACTS_PREAMBLE: &str = "Use these facts as ground truth unless the user states an update.";
pub const SIMILAR_HEADING: &str = "== Relevant semantic memory ==";

/// Recent turns, then facts, then similar turns. Empty sections are
/// omitted; all three empty gives an empty string.
pub fn render(recent: &[Turn], facts: &StructuredFacts, similar: &[Turn]) -> String {
    let mut out = String::new();

    if !recent.is_empty() {
        let _ = writeln!(out, "{RECENT_HEADING}");
        for turn in recent {
            let _ = writeln!(out, "{}: {}", turn.role, turn.text);
        }
        out.push('\n');
    }

    if !facts.is_empty() {
        let _ = writeln!(out, "{FACTS_HEADING}");
        let _ = writeln!(out, "{FACTS_PREAMBLE}");
        for (entity, status) in facts {
            let _ = writeln!(out, "- {entity}: {status}");
        }
        out.push('\n');
    }

    if !similar.is_empty() {
        let _ = writeln!(out, "{SIMILAR_HEADING}");
        for turn in similar {
            let _ = writeln!(out, "{}: {}", turn.role, turn.text);
        }
        out.push('\n');
    }

    out
}

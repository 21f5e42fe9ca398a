//! Condensation instructions shared by the chat-based summarizers.

use chronicle_core::{SummaryKind, SummaryRequest};

/// Instructions for turning a block of recent history into a chunk summary.
pub const CHUNK_INSTRUCTIONS: &str = "\
Condense this story segment into the most efficient summary possible.
Include ONLY:
  - Major plot events and outcomes
  - Character relationship changes
  - Critical discoveries, tasks, or missions
  - Important character decisions or actions
Exclude:
  - Character backstories already established
  - Atmospheric descriptions
  - Dialogue and minor interactions
  - Repeated information
  - Narrative or analytical commentary
Be extremely concise. Use simple, direct language.
Write in bullet points or a single direct sentence. No narrative, review, or analysis.
Do not use any symbols or formatting-just plain text.
";

/// Instructions for folding summaries into deep memory.
pub const DEEP_INSTRUCTIONS: &str = "\
Compress these story summaries into a single ultra-concise deep memory.
Extract ONLY the most critical information:
  - Major plot arcs and their resolutions
  - Significant character introductions and relationship shifts
  - World-changing events or discoveries
  - Ongoing missions or tasks
Remove ALL minor details, scene descriptions, and redundant information.
Retain chronological order.
";

/// Full prompt text for a request.
pub fn render(request: &SummaryRequest) -> String {
    match request.kind {
        SummaryKind::Chunk => match request.previous_summary.as_deref() {
            Some(previous) if !previous.trim().is_empty() => format!(
                "{CHUNK_INSTRUCTIONS}\n# Previous Summary (DO NOT repeat this):\n{previous}\n\n\
                 # New Events to Summarize (focus ONLY on what's new):\n{}",
                request.text
            ),
            _ => format!("{CHUNK_INSTRUCTIONS}\n# Story Segment:\n{}", request.text),
        },
        SummaryKind::Deep => format!("{DEEP_INSTRUCTIONS}# Summaries to Compress:\n\n{}", request.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_prompt_without_context() {
        let prompt = render(&SummaryRequest::chunk("The bridge burned.", 50));
        assert!(prompt.starts_with("Condense this story segment"));
        assert!(prompt.ends_with("# Story Segment:\nThe bridge burned."));
        assert!(!prompt.contains("Previous Summary"));
    }

    #[test]
    fn chunk_prompt_with_previous_summary() {
        let request = SummaryRequest::chunk("They crossed the river.", 50)
            .with_previous_summary(Some("The bridge burned.".into()));
        let prompt = render(&request);
        assert!(prompt.contains("# Previous Summary (DO NOT repeat this):\nThe bridge burned."));
        assert!(prompt.ends_with("(focus ONLY on what's new):\nThey crossed the river."));
    }

    #[test]
    fn deep_prompt_lists_summaries() {
        let prompt = render(&SummaryRequest::deep("a\n\n---\n\nb", 300));
        assert!(prompt.starts_with("Compress these story summaries"));
        assert!(prompt.ends_with("# Summaries to Compress:\n\na\n\n---\n\nb"));
    }
}

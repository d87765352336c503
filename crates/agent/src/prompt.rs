//! Prompt rendering for the action selector.
//!
//! Every decision sees a bounded view: the goal, all notes for the goal,
//! the last `history_window` stream entries and the current page.

use voxpilot_core::action::{ActionRecord, ParseError, grammar_description};
use voxpilot_core::goal::Goal;
use voxpilot_core::memory::MemoryNote;
use voxpilot_core::page::PageSnapshot;
use voxpilot_core::stream::{EventStream, StreamEntry};

/// Characters of accessibility tree included in a prompt.
pub const MAX_TREE_CHARS: usize = 12_000;

/// Characters of a past explanation shown in the history.
const MAX_EXPLANATION_CHARS: usize = 120;

/// Standing instructions for the reasoning model.
pub fn system_prompt() -> String {
    format!(
        "You control a web browser on behalf of a user who is speaking to you.\n\
         Each turn you see the goal, your notes, recent history and the current page.\n\
         Choose exactly ONE next action.\n\n\
         {grammar}\n\n\
         Answer with a JSON object:\n\
         {{\"explanation\": \"<one short sentence, spoken aloud to the user>\", \
         \"action\": \"<one action call>\", \
         \"note\": \"<optional fact worth remembering for this goal>\"}}\n\n\
         Rules:\n\
         - Elements are referenced by the bid in square brackets, e.g. [12].\n\
         - Only call done when the goal is fully accomplished; put the answer in its message.\n\
         - If information is missing, navigate, click or search to find it first.\n\
         - Use clarify only when you cannot continue without the user.\n\
         - Keep explanations short; they are read out loud.",
        grammar = grammar_description()
    )
}

/// The per-cycle user message.
pub fn render_cycle(
    goal: &Goal,
    stream: &EventStream,
    notes: &[MemoryNote],
    page: Option<&PageSnapshot>,
    hint: Option<&str>,
    history_window: usize,
) -> String {
    let mut out = String::new();

    out.push_str("## Goal\n");
    out.push_str(&goal.text);
    out.push_str("\n\n");

    if !notes.is_empty() {
        out.push_str("## Notes\n");
        for note in notes {
            out.push_str(&format!("- {}\n", note.text));
        }
        out.push('\n');
    }

    out.push_str("## Recent history\n");
    out.push_str(&render_history(stream, history_window));
    out.push('\n');

    out.push_str("## Current page\n");
    match page {
        Some(page) => out.push_str(&render_page(page)),
        None => out.push_str("(no page observed yet)\n"),
    }

    if let Some(hint) = hint {
        out.push_str("\n## Warning\n");
        out.push_str(hint);
        out.push('\n');
    }

    out
}

/// Render the last `window` entries of the stream.
pub fn render_history(stream: &EventStream, window: usize) -> String {
    let tail = stream.tail(window);
    if tail.is_empty() {
        return "No previous actions.\n".into();
    }

    let mut out = String::new();
    let mut last_url: Option<&str> = None;
    for entry in tail {
        match entry {
            StreamEntry::Action(action) => {
                out.push_str(&format!("#{} {}", action.seq, action.record));
                let explanation = truncate(&action.explanation, MAX_EXPLANATION_CHARS);
                if !explanation.is_empty() {
                    out.push_str(&format!("  ({explanation})"));
                }
                out.push('\n');
            }
            StreamEntry::Observation(obs) => {
                let snap = &obs.snapshot;
                let mark = if snap.success { "ok" } else { "failed" };
                out.push_str(&format!("   -> {mark}"));
                if last_url.is_some_and(|u| u != snap.url) {
                    out.push_str(&format!(", now at {}", snap.url));
                }
                if let Some(err) = &snap.error {
                    out.push_str(&format!(": {err}"));
                }
                out.push('\n');
                last_url = Some(&snap.url);
            }
        }
    }
    out
}

fn render_page(page: &PageSnapshot) -> String {
    let mut out = format!("URL: {}\n", page.url);
    if let Some(title) = &page.title {
        out.push_str(&format!("Title: {title}\n"));
    }
    if let Some(focused) = &page.focused {
        out.push_str(&format!("Focused element: [{focused}]\n"));
    }
    if let Some(err) = &page.error {
        out.push_str(&format!("Last action error: {err}\n"));
    }
    out.push_str("Accessibility tree:\n");
    out.push_str(&page.tree_excerpt(MAX_TREE_CHARS));
    out.push('\n');
    out
}

/// Follow-up message after an unparsable answer.
pub fn retry_prompt(error: &ParseError) -> String {
    format!(
        "Your previous answer could not be used: {error}.\n\
         Reply again with ONLY the JSON object and exactly one valid action.\n\n{}",
        grammar_description()
    )
}

/// Hint handed to the selector after the loop detector escalates.
pub fn loop_hint(record: &ActionRecord, occurrences: usize) -> String {
    format!(
        "You performed {record} {occurrences} times without the page changing. \
         STOP and try a different strategy: another element, scrolling, navigating \
         elsewhere, or clarify with the user."
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

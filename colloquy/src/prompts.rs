//! Prompt builders for every dispatch the moderator makes.
//!
//! Plain functions returning strings. Anything clever (who gets which
//! prompt, when) belongs to the moderator; this module only renders.

use colloquy_types::{FactCheckItem, PersonaKind, TranscriptEntry};

use crate::profiles;

/// Transcript entries included in an ordinary turn prompt.
pub const TRANSCRIPT_WINDOW: usize = 6;

/// Opening dispatch: the synthesist establishes the framework.
pub fn framework_prompt(topic: &str) -> String {
    format!(
        "The panel convenes to deliberate on: \"{topic}\".\n\n\
         Establish the framework. Define the key terms, name what is at \
         stake, and pose the two or three questions the panel should \
         resolve. Do not argue a position yet."
    )
}

/// Dispatch that forces the framework phase into discussion.
pub fn discussion_kickoff_prompt(topic: &str) -> String {
    format!(
        "The framework rounds on \"{topic}\" are complete.\n\n\
         Summarize the framework in two sentences, then open the \
         discussion by putting the sharpest unresolved question to the \
         panel."
    )
}

/// Ordinary discussion turn, carrying a window of recent exchanges.
pub fn turn_prompt(topic: &str, transcript: &[TranscriptEntry]) -> String {
    format!(
        "The deliberation on \"{topic}\" continues. Recent exchanges:\n\n\
         {recent}\n\n\
         Respond in character. Engage with what was just said.",
        recent = render_recent(transcript, TRANSCRIPT_WINDOW),
    )
}

/// Closing dispatch: the synthesist integrates the whole discussion.
pub fn synthesis_prompt(topic: &str, completed_checks: &[FactCheckItem]) -> String {
    format!(
        "The discussion on \"{topic}\" is closing.\n\n\
         Fact-check results:\n{verdicts}\n\n\
         Deliver the synthesis: integrate every position fairly, weigh \
         verified against disputed facts, and land on a clear conclusion \
         with the strongest remaining open question.",
        verdicts = render_verdicts(completed_checks),
    )
}

/// Verification request for the fact-checker, one numbered claim per line.
pub fn fact_check_prompt(source: PersonaKind, claims: &[String]) -> String {
    let listed = claims
        .iter()
        .enumerate()
        .map(|(i, claim)| format!("{}. {}", i + 1, claim))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Verify the following claims made by {name}:\n{listed}\n\n\
         Begin your reply with a single verdict word for the batch: \
         verified, partial, disputed, false, or unverifiable.",
        name = profiles::display_name(source),
    )
}

/// Re-dispatch after a user interjection.
pub fn interjection_prompt(text: &str) -> String {
    format!(
        "The user interjects:\n\"{text}\"\n\n\
         Acknowledge the interjection directly, then weave it into the \
         deliberation."
    )
}

/// One-shot scoring request over the finished transcript.
pub fn evaluation_prompt(topic: &str, transcript: &[TranscriptEntry], user_context: &str) -> String {
    format!(
        "Score the following panel deliberation on \"{topic}\".\n\
         Context from the user: {user_context}\n\n\
         Transcript:\n{rendered}\n\n\
         Score four dimensions from 0 to 10: insight, rigor, balance, \
         clarity. Respond with JSON only, no prose, in exactly this shape:\n\
         {{\"overall\": 0.0, \"dimensions\": [{{\"name\": \"insight\", \
         \"score\": 0.0, \"explanation\": \"...\"}}]}}",
        rendered = render_recent(transcript, usize::MAX),
    )
}

/// Render the last `window` transcript entries, oldest first.
pub fn render_recent(transcript: &[TranscriptEntry], window: usize) -> String {
    let skip = transcript.len().saturating_sub(window);
    let lines: Vec<String> = transcript.iter().skip(skip).map(render_entry).collect();
    if lines.is_empty() {
        "(no exchanges yet)".to_string()
    } else {
        lines.join("\n")
    }
}

fn render_entry(entry: &TranscriptEntry) -> String {
    match entry {
        TranscriptEntry::User { text, .. } => format!("User: {text}"),
        TranscriptEntry::Participant { persona, text, .. } => {
            format!("{}: {}", profiles::display_name(*persona), text)
        }
        TranscriptEntry::System { text, .. } => format!("[system] {text}"),
        TranscriptEntry::FactCheck { item } => {
            let verdict = item
                .verdict
                .map(|v| v.to_string())
                .unwrap_or_else(|| "pending".to_string());
            format!(
                "[fact-check on {}] {}: {}",
                profiles::display_name(item.source),
                verdict,
                item.claims.join(" | "),
            )
        }
    }
}

/// Summarize completed fact-check items for the synthesis prompt.
pub fn render_verdicts(items: &[FactCheckItem]) -> String {
    let lines: Vec<String> = items
        .iter()
        .filter(|item| !item.is_checking())
        .map(|item| {
            let verdict = item
                .verdict
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!("- {}: {}", verdict, item.claims.join(" | "))
        })
        .collect();
    if lines.is_empty() {
        "(no fact-checks were requested)".to_string()
    } else {
        lines.join("\n")
    }
}

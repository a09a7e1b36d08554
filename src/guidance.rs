use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::triage::answers::AnswerSet;
use crate::triage::jurisdiction::Jurisdiction;

static POSTCODE_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z]{1,2}\d{1,2}[A-Z]?\s?\d[A-Z]{2})\b").expect("valid postcode regex")
});

static OUTWARD_CODE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"^([A-Z]{1,2}\d[A-Z\d]?)(?:\d[A-Z]{2})?$").expect("valid outward code regex")
    });

// ---------------------------------------------------------------------------
// Chat message helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.role, self.content)
    }
}

// ---------------------------------------------------------------------------
// Postcode helpers
// ---------------------------------------------------------------------------

/// First UK-looking postcode mentioned in free text, as typed.
pub fn extract_postcode(text: &str) -> Option<String> {
    POSTCODE_IN_TEXT
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Area plus district, e.g. "AL1" for "al1 3jq". Empty if unrecognisable.
pub fn outward_code(postcode: &str) -> String {
    let clean: String = postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    OUTWARD_CODE
        .captures(&clean)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "\
You are a compassionate assistant for the AfterLife bereavement support platform. \
Provide accurate, empathetic guidance on the UK bereavement process.

GUIDELINES:
- Be compassionate but factual. Do not act as a therapist.
- Give administrative and procedural guidance only, not legal, financial or clinical advice.
- Keep responses concise and actionable, in plain English.
- Link to authoritative UK resources (GOV.UK, Citizens Advice, Cruse).
- For funeral directors, florists or stonemasons, suggest the Marketplace.";

/// One line of jurisdiction-specific notes for downstream guidance.
pub fn jurisdiction_notes(jurisdiction: Jurisdiction) -> String {
    format!(
        "{}: register the death within {} days, \"{}\", Tell Us Once {}",
        jurisdiction.label(),
        jurisdiction.registration_deadline_days(),
        jurisdiction.estate_process_term(),
        if jurisdiction.tell_us_once_available() {
            "available"
        } else {
            "NOT available"
        }
    )
}

/// The guidance assistant's instructions, seeded with the triage answers.
pub fn system_prompt(answers: &AnswerSet) -> String {
    let jurisdiction = answers.jurisdiction().unwrap_or(Jurisdiction::EnglandWales);
    let postcode = answers.get("postcode").unwrap_or("Not provided");
    let defaulted = if answers.jurisdiction().is_none() {
        " (default)"
    } else {
        ""
    };

    let mut s = String::from(SYSTEM_PROMPT);
    s.push_str("\n\nCONTEXT:\n");
    s.push_str(&format!("- User's postcode: {postcode}\n"));
    s.push_str(&format!(
        "- Jurisdiction: {}{defaulted}\n",
        jurisdiction.label()
    ));
    s.push_str(&format!("- {}\n", jurisdiction_notes(jurisdiction)));

    let circumstances: Vec<String> = answers
        .iter()
        .filter(|(k, _)| !matches!(*k, "postcode" | "jurisdiction"))
        .map(|(k, v)| format!("- {k}: {v}"))
        .collect();
    if !circumstances.is_empty() {
        s.push_str("\nCIRCUMSTANCES FROM TRIAGE:\n");
        s.push_str(&circumstances.join("\n"));
        s.push('\n');
    }

    s
}

/// Message list that opens a guidance conversation after triage.
pub fn seed_messages(answers: &AnswerSet, opening_question: &str) -> Vec<ChatMessage> {
    let messages = vec![
        ChatMessage::system(system_prompt(answers)),
        ChatMessage::user(opening_question),
    ];
    debug!(
        "Guidance seed ({} messages):\n{}",
        messages.len(),
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| format!("  msg[{i}] {m}"))
            .collect::<Vec<_>>()
            .join("\n")
    );
    messages
}

/// Short next-steps summary for a completed triage.
pub fn summary(answers: &AnswerSet) -> Vec<String> {
    let jurisdiction = answers.jurisdiction().unwrap_or(Jurisdiction::EnglandWales);
    let mut lines = vec![
        format!("Jurisdiction: {}", jurisdiction.label()),
        format!(
            "Register the death within {} days.",
            jurisdiction.registration_deadline_days()
        ),
    ];
    if answers.get("police_coroner").is_some() {
        lines.push("The coroner may need to investigate before the death can be registered.".into());
    }
    if answers.get("urgent_burial") == Some("yes") {
        lines.push("Ask the registrar about out-of-hours registration for an urgent burial.".into());
    }
    if jurisdiction.tell_us_once_available() {
        lines.push("Use Tell Us Once to notify government departments.".into());
    } else {
        lines.push("Tell Us Once is not available; notify departments individually.".into());
    }
    match answers.get("will") {
        Some("yes") => lines.push(format!(
            "The executor named in the will applies for {}.",
            jurisdiction.estate_process_term()
        )),
        Some("no") => lines.push(format!(
            "Without a will, the next of kin may need to apply for {}.",
            jurisdiction.estate_process_term()
        )),
        _ => lines.push("Check with their solicitor or bank whether a will exists.".into()),
    }
    if answers.get("funeral_plan") == Some("yes") {
        lines.push("Contact the funeral plan provider before booking a funeral director.".into());
    }
    let area = answers.get("postcode").map(outward_code).unwrap_or_default();
    if !area.is_empty() {
        lines.push(format!(
            "Search the Marketplace for verified services near {area}."
        ));
    }
    lines
}

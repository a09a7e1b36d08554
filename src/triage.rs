pub mod answers;
pub mod engine;
pub mod graph;
pub mod jurisdiction;
pub mod node;
pub mod store;

use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::guidance::{self, ChatMessage};
use answers::AnswerSet;
use engine::{AnswerOutcome, BackOutcome, TriageEngine, POSTCODE_QUESTION};
use graph::QuestionGraph;
use node::{Question, QuestionKind};
use store::ProgressStore;

/// Slot name under which progress is persisted.
pub const SESSION_KEY: &str = "afterlife-triage-progress";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageConfig {
    /// Directory holding the progress slot.
    pub state_dir: PathBuf,
    /// JSON question graph; the built-in questionnaire when absent.
    pub graph_path: Option<PathBuf>,
    pub session_key: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".afterlife"),
            graph_path: None,
            session_key: SESSION_KEY.into(),
        }
    }
}

impl TriageConfig {
    /// `[state-dir] [graph.json]`, both optional.
    pub fn from_args(args: &[String]) -> Self {
        let defaults = Self::default();
        Self {
            state_dir: args
                .get(1)
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            graph_path: args.get(2).map(PathBuf::from),
            session_key: defaults.session_key,
        }
    }

    pub fn load_graph(&self) -> Result<QuestionGraph> {
        let Some(path) = &self.graph_path else {
            return Ok(graph::bereavement_triage());
        };
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read question graph {}", path.display()))?;
        QuestionGraph::from_json(&body)
            .with_context(|| format!("invalid question graph {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Terminal questionnaire
// ---------------------------------------------------------------------------

/// How a session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(AnswerSet),
    /// Went back past the first question.
    Exited,
    /// Typed quit, or input ended. Progress stays saved.
    Paused,
}

fn show_question<W: Write>(
    out: &mut W,
    question: &Question,
    previous: Option<&str>,
    step: usize,
    total: usize,
) -> std::io::Result<()> {
    writeln!(out, "\n[{step}/{total}] {}", question.prompt)?;
    if let QuestionKind::SingleChoice { options } = &question.kind {
        for (i, option) in options.iter().enumerate() {
            let marker = if previous == Some(option.value.as_str()) {
                " (your previous answer)"
            } else {
                ""
            };
            writeln!(out, "  {}. {}{marker}", i + 1, option.label)?;
        }
    } else if let Some(prev) = previous {
        writeln!(out, "  (press Enter to keep: {prev})")?;
    }
    writeln!(out, "  [back] previous question   [quit] save and leave")
}

/// Turn raw input into an answer value: option number, option value, or
/// Enter to keep the previous answer. Anything unrecognised is passed through
/// so the engine can reject it.
fn interpret(question: &Question, input: &str, previous: Option<&str>) -> Option<String> {
    if input.is_empty() {
        return previous.map(str::to_string);
    }
    if question.id == POSTCODE_QUESTION {
        return Some(guidance::extract_postcode(input).unwrap_or_else(|| input.to_string()));
    }
    if let QuestionKind::SingleChoice { options } = &question.kind {
        if let Some(option) = input
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i))
        {
            return Some(option.value.clone());
        }
        let lowered = input.to_lowercase();
        return Some(
            options
                .iter()
                .find(|o| o.value == lowered || o.label.to_lowercase() == lowered)
                .map_or_else(|| input.to_string(), |o| o.value.clone()),
        );
    }
    Some(input.to_string())
}

pub fn run_session<S, R, W>(
    engine: &mut TriageEngine<S>,
    mut input: R,
    out: &mut W,
) -> Result<SessionOutcome>
where
    S: ProgressStore,
    R: BufRead,
    W: Write,
{
    let total = engine.graph().total_steps();
    info!("Triage session at '{}'", engine.state().current_question_id);

    loop {
        let Some(question) = engine.current_question().cloned() else {
            return Ok(SessionOutcome::Completed(engine.answers().clone()));
        };
        if question.is_terminal() {
            return Ok(SessionOutcome::Completed(engine.answers().clone()));
        }
        let previous = engine.answers().get(&question.id).map(str::to_string);
        let step = engine.state().history.len() + 1;
        show_question(out, &question, previous.as_deref(), step, total)?;

        write!(out, "> ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(SessionOutcome::Paused);
        }
        let line = line.trim();

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            writeln!(out, "Your answers are saved. You can pick up where you left off.")?;
            return Ok(SessionOutcome::Paused);
        }
        if line.eq_ignore_ascii_case("back") {
            match engine.go_back() {
                BackOutcome::Continue(_) => continue,
                BackOutcome::Exit => return Ok(SessionOutcome::Exited),
            }
        }

        let Some(value) = interpret(&question, line, previous.as_deref()) else {
            writeln!(out, "(Please give an answer.)")?;
            continue;
        };
        match engine.answer(&value) {
            Ok(AnswerOutcome::Continue(_)) => {}
            Ok(AnswerOutcome::Complete(answers)) => {
                if let Some(done) = engine.current_question() {
                    writeln!(out, "\n{}", done.prompt)?;
                }
                return Ok(SessionOutcome::Completed(answers));
            }
            Err(err) => writeln!(out, "({err})")?,
        }
    }
}

/// Print next steps for a finished triage and return the messages that open
/// the guidance conversation.
pub fn show_guidance<W: Write>(
    out: &mut W,
    answers: &AnswerSet,
) -> std::io::Result<Vec<ChatMessage>> {
    writeln!(out, "\n========================================")?;
    writeln!(out, "             NEXT STEPS")?;
    writeln!(out, "========================================")?;
    for line in guidance::summary(answers) {
        writeln!(out, "  - {line}")?;
    }
    writeln!(out, "========================================\n")?;
    Ok(guidance::seed_messages(answers, "What should I do first?"))
}

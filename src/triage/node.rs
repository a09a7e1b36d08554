use serde::Deserialize;

use crate::triage::answers::AnswerSet;

/// A single question in the triage graph.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    /// Unique identifier for this question (e.g. "location", "postcode").
    pub id: String,
    /// Text shown to the user. Opaque to the engine.
    pub prompt: String,
    // Single choice, free text or terminal
    pub kind: QuestionKind,
    /// Fixed successor, used when the next question does not depend on the
    /// chosen value (free text, or single-choice branches that reconverge).
    #[serde(default)]
    pub next_id: Option<String>,
    /// When present and false for the current answers, the question is skipped.
    #[serde(default)]
    pub visible_when: Option<Visibility>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerOption {
    pub value: String,
    pub label: String,
    // Overrides the question's fixed successor
    #[serde(default)]
    pub next_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionKind {
    SingleChoice { options: Vec<AnswerOption> },
    FreeText,
    // End of the questionnaire
    Terminal,
}

/// Declarative visibility rule evaluated against the answers collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Visibility {
    /// Visible only if `question` was answered with one of `values`.
    AnswerIn {
        question: String,
        values: Vec<String>,
    },
    /// Visible unless `question` was answered with one of `values`.
    AnswerNotIn {
        question: String,
        values: Vec<String>,
    },
}

impl Visibility {
    pub fn is_visible(&self, answers: &AnswerSet) -> bool {
        match self {
            Visibility::AnswerIn { question, values } => answers
                .get(question)
                .is_some_and(|v| values.iter().any(|x| x == v)),
            Visibility::AnswerNotIn { question, values } => !answers
                .get(question)
                .is_some_and(|v| values.iter().any(|x| x == v)),
        }
    }
}

impl Question {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, QuestionKind::Terminal)
    }

    pub fn options(&self) -> &[AnswerOption] {
        match &self.kind {
            QuestionKind::SingleChoice { options } => options,
            _ => &[],
        }
    }

    pub fn option(&self, value: &str) -> Option<&AnswerOption> {
        self.options().iter().find(|o| o.value == value)
    }

    pub fn is_visible(&self, answers: &AnswerSet) -> bool {
        self.visible_when
            .as_ref()
            .map_or(true, |rule| rule.is_visible(answers))
    }

    /// Every id this question can lead to, fixed successor first.
    pub fn successor_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.next_id.iter().map(String::as_str).collect();
        for option in self.options() {
            if let Some(next) = option.next_id.as_deref() {
                if !ids.contains(&next) {
                    ids.push(next);
                }
            }
        }
        ids
    }

    // -- builders used by the built-in graph --

    pub fn single_choice(id: &str, prompt: &str, options: Vec<AnswerOption>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            kind: QuestionKind::SingleChoice { options },
            next_id: None,
            visible_when: None,
        }
    }

    pub fn free_text(id: &str, prompt: &str) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            kind: QuestionKind::FreeText,
            next_id: None,
            visible_when: None,
        }
    }

    pub fn terminal(id: &str, prompt: &str) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            kind: QuestionKind::Terminal,
            next_id: None,
            visible_when: None,
        }
    }

    pub fn then(mut self, next_id: &str) -> Self {
        self.next_id = Some(next_id.into());
        self
    }

    pub fn visible_when(mut self, rule: Visibility) -> Self {
        self.visible_when = Some(rule);
        self
    }
}

impl AnswerOption {
    pub fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            next_id: None,
        }
    }

    pub fn then(mut self, next_id: &str) -> Self {
        self.next_id = Some(next_id.into());
        self
    }
}

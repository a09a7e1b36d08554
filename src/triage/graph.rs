use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::triage::node::{AnswerOption, Question, QuestionKind, Visibility};

/// Id of the terminal node in the built-in graph.
pub const TERMINAL_ID: &str = "complete";

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("invalid graph json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate question id '{0}'")]
    DuplicateId(String),
    #[error("entry question '{0}' does not exist")]
    MissingEntry(String),
    #[error("entry question '{0}' is terminal")]
    TerminalEntry(String),
    #[error("graph has no terminal question")]
    NoTerminal,
    #[error("question '{from}' points at unknown question '{to}'")]
    DanglingEdge { from: String, to: String },
    #[error("single-choice question '{0}' has no options")]
    NoOptions(String),
    #[error("question '{0}' has no way to compute a successor")]
    NoSuccessor(String),
    #[error("conditionally visible question '{0}' must use a fixed next_id")]
    ConditionalWithoutFixedNext(String),
    #[error("question graph contains a cycle through '{0}'")]
    Cycle(String),
}

/// JSON layout of a graph file.
#[derive(Debug, Deserialize)]
struct GraphFile {
    entry_id: String,
    questions: Vec<Question>,
}

/// The immutable question graph: a map of question-id -> Question.
#[derive(Debug, Clone)]
pub struct QuestionGraph {
    nodes: BTreeMap<String, Question>,
    entry_id: String,
}

impl QuestionGraph {
    /// Build and validate a graph.
    pub fn new(entry_id: impl Into<String>, questions: Vec<Question>) -> Result<Self, GraphError> {
        let mut nodes = BTreeMap::new();
        for question in questions {
            if nodes.contains_key(&question.id) {
                return Err(GraphError::DuplicateId(question.id));
            }
            nodes.insert(question.id.clone(), question);
        }
        let graph = Self {
            nodes,
            entry_id: entry_id.into(),
        };
        graph.validate()?;
        Ok(graph)
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let file: GraphFile = serde_json::from_str(json)?;
        Self::new(file.entry_id, file.questions)
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.nodes.get(id)
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Count the number of non-terminal questions on the longest path through
    /// the graph (i.e. the maximum number of answers a user can give).
    pub fn total_steps(&self) -> usize {
        self.longest_path(&self.entry_id)
    }

    fn longest_path(&self, node_id: &str) -> usize {
        let node = match self.nodes.get(node_id) {
            Some(n) => n,
            None => return 0,
        };
        if node.is_terminal() {
            return 0;
        }
        let max_child = node
            .successor_ids()
            .into_iter()
            .map(|id| self.longest_path(id))
            .max()
            .unwrap_or(0);
        1 + max_child
    }

    fn validate(&self) -> Result<(), GraphError> {
        let entry = self
            .nodes
            .get(&self.entry_id)
            .ok_or_else(|| GraphError::MissingEntry(self.entry_id.clone()))?;
        if entry.is_terminal() {
            return Err(GraphError::TerminalEntry(self.entry_id.clone()));
        }
        if !self.nodes.values().any(Question::is_terminal) {
            return Err(GraphError::NoTerminal);
        }

        for node in self.nodes.values() {
            for to in node.successor_ids() {
                if !self.nodes.contains_key(to) {
                    return Err(GraphError::DanglingEdge {
                        from: node.id.clone(),
                        to: to.to_string(),
                    });
                }
            }
            match &node.kind {
                QuestionKind::Terminal => continue,
                QuestionKind::SingleChoice { options } => {
                    if options.is_empty() {
                        return Err(GraphError::NoOptions(node.id.clone()));
                    }
                    if node.next_id.is_none() && options.iter().any(|o| o.next_id.is_none()) {
                        return Err(GraphError::NoSuccessor(node.id.clone()));
                    }
                }
                QuestionKind::FreeText => {
                    if node.next_id.is_none() {
                        return Err(GraphError::NoSuccessor(node.id.clone()));
                    }
                }
            }
            if node.visible_when.is_some() && node.next_id.is_none() {
                return Err(GraphError::ConditionalWithoutFixedNext(node.id.clone()));
            }
        }

        let mut done = HashSet::new();
        for id in self.nodes.keys() {
            self.check_acyclic(id, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn check_acyclic<'a>(
        &'a self,
        id: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), GraphError> {
        if done.contains(id) {
            return Ok(());
        }
        if path.contains(&id) {
            return Err(GraphError::Cycle(id.to_string()));
        }
        let Some(node) = self.nodes.get(id) else {
            return Ok(());
        };
        path.push(id);
        for next in node.successor_ids() {
            self.check_acyclic(next, path, done)?;
        }
        path.pop();
        done.insert(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bereavement triage questionnaire
// ---------------------------------------------------------------------------

fn yes_no_unsure() -> Vec<AnswerOption> {
    vec![
        AnswerOption::new("yes", "Yes"),
        AnswerOption::new("no", "No"),
        AnswerOption::new("unsure", "I'm not sure"),
    ]
}

pub fn bereavement_triage() -> QuestionGraph {
    let questions = vec![
        Question::single_choice(
            "location",
            "Where did the death happen?",
            vec![
                AnswerOption::new("home-expected", "At home, and it was expected"),
                AnswerOption::new("home-unexpected", "At home, and it was unexpected"),
                AnswerOption::new("hospital", "In hospital"),
                AnswerOption::new("care-home", "In a care home or hospice"),
                AnswerOption::new("public-place", "Somewhere else, such as a public place"),
            ],
        )
        .then("police_coroner"),
        // Only asked when the death may be referred to a coroner
        Question::single_choice(
            "police_coroner",
            "Have the police or a coroner been in touch?",
            yes_no_unsure(),
        )
        .then("postcode")
        .visible_when(Visibility::AnswerIn {
            question: "location".into(),
            values: vec!["home-unexpected".into(), "public-place".into()],
        }),
        Question::free_text(
            "postcode",
            "What is the postcode where the person died?",
        )
        .then("age"),
        Question::single_choice(
            "age",
            "How old was the person who died?",
            vec![
                AnswerOption::new("adult", "18 or over"),
                AnswerOption::new("child", "Under 18"),
                AnswerOption::new("baby", "A baby, or stillbirth"),
            ],
        )
        .then("religion"),
        Question::single_choice(
            "religion",
            "Did they follow a faith that affects funeral arrangements?",
            vec![
                AnswerOption::new("islam", "Islam").then("urgent_burial"),
                AnswerOption::new("jewish", "Judaism").then("urgent_burial"),
                AnswerOption::new("christian", "Christianity").then("burial_cremation"),
                AnswerOption::new("other", "Another faith").then("burial_cremation"),
                AnswerOption::new("none", "No religious requirements").then("burial_cremation"),
            ],
        ),
        Question::single_choice(
            "urgent_burial",
            "Does the burial need to happen within 24 hours?",
            yes_no_unsure(),
        )
        .then("burial_cremation"),
        Question::single_choice(
            "burial_cremation",
            "Would they have wanted a burial or a cremation?",
            vec![
                AnswerOption::new("burial", "Burial"),
                AnswerOption::new("cremation", "Cremation"),
                AnswerOption::new("undecided", "Not decided yet"),
            ],
        )
        .then("will"),
        Question::single_choice("will", "Did they leave a will?", yes_no_unsure())
            .then("funeral_plan"),
        Question::single_choice(
            "funeral_plan",
            "Did they have a pre-paid funeral plan?",
            yes_no_unsure(),
        )
        .then(TERMINAL_ID),
        Question::terminal(
            TERMINAL_ID,
            "Thank you. We have everything we need to guide you.",
        ),
    ];

    QuestionGraph::new("location", questions).expect("built-in triage graph is valid")
}

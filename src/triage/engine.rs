use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::triage::answers::AnswerSet;
use crate::triage::graph::{QuestionGraph, TERMINAL_ID};
use crate::triage::jurisdiction::derive_jurisdiction;
use crate::triage::node::{Question, QuestionKind};
use crate::triage::store::ProgressStore;

/// Question whose answer drives the jurisdiction side effect.
pub const POSTCODE_QUESTION: &str = "postcode";

/// Rejected `answer` calls. State is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriageError {
    #[error("invalid transition: the questionnaire is already complete")]
    AlreadyComplete,
    #[error("invalid transition: an answer to '{question}' is required")]
    EmptyAnswer { question: String },
    #[error("invalid transition: '{value}' is not an option for '{question}'")]
    UnknownOption { question: String, value: String },
}

/// The persisted unit: where the user is, how they got there, what they said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalState {
    pub current_question_id: String,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub answers: AnswerSet,
}

impl TraversalState {
    fn fresh(entry_id: &str) -> Self {
        Self {
            current_question_id: entry_id.to_string(),
            history: Vec::new(),
            answers: AnswerSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Id of the next question to show.
    Continue(String),
    /// The questionnaire finished; final answers for the guidance surface.
    Complete(AnswerSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackOutcome {
    /// Id of the question now awaiting an answer.
    Continue(String),
    /// Nothing to go back to; the caller should leave the questionnaire.
    Exit,
}

/// Where skip resolution landed.
enum Resolved {
    Question(String),
    Terminal(String),
}

pub struct TriageEngine<S: ProgressStore> {
    graph: QuestionGraph,
    state: TraversalState,
    store: S,
    session_key: String,
}

impl<S: ProgressStore> TriageEngine<S> {
    /// Restore progress from `store` if it holds a usable state for this
    /// graph, otherwise start fresh at the entry question.
    pub fn new(graph: QuestionGraph, store: S, session_key: impl Into<String>) -> Self {
        let session_key = session_key.into();
        let state = match restore(&graph, &store, &session_key) {
            Some(state) => {
                info!(
                    "Restored triage progress at '{}' ({} answers)",
                    state.current_question_id,
                    state.answers.len()
                );
                state
            }
            None => fresh_state(&graph),
        };
        Self {
            graph,
            state,
            store,
            session_key,
        }
    }

    pub fn graph(&self) -> &QuestionGraph {
        &self.graph
    }

    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.state.answers
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.graph.get(&self.state.current_question_id)
    }

    pub fn is_complete(&self) -> bool {
        self.current_question().map_or(true, Question::is_terminal)
    }

    /// Answer the current question and move to the next visible one.
    pub fn answer(&mut self, value: &str) -> Result<AnswerOutcome, TriageError> {
        let current_id = self.state.current_question_id.clone();
        let question = match self.graph.get(&current_id) {
            Some(q) if !q.is_terminal() => q,
            _ => return Err(TriageError::AlreadyComplete),
        };

        let value = value.trim();
        if value.is_empty() {
            return Err(TriageError::EmptyAnswer {
                question: current_id,
            });
        }

        let raw_next = match &question.kind {
            QuestionKind::SingleChoice { .. } => {
                let option =
                    question
                        .option(value)
                        .ok_or_else(|| TriageError::UnknownOption {
                            question: current_id.clone(),
                            value: value.to_string(),
                        })?;
                option.next_id.clone().or_else(|| question.next_id.clone())
            }
            QuestionKind::FreeText => question.next_id.clone(),
            QuestionKind::Terminal => None,
        };

        self.state.answers.insert(current_id.as_str(), value);
        if current_id == POSTCODE_QUESTION {
            let jurisdiction = derive_jurisdiction(value);
            debug!("Postcode '{value}' maps to jurisdiction {jurisdiction}");
            self.state.answers.set_jurisdiction(jurisdiction);
        }

        self.state.history.push(current_id.clone());
        match resolve(&self.graph, raw_next, &self.state.answers) {
            Resolved::Question(next_id) => {
                info!("Transition: {current_id} -> {next_id}");
                self.state.current_question_id = next_id.clone();
                self.persist();
                Ok(AnswerOutcome::Continue(next_id))
            }
            Resolved::Terminal(terminal_id) => {
                info!(
                    "Triage complete after '{current_id}' ({} answers)",
                    self.state.answers.len()
                );
                self.state.current_question_id = terminal_id;
                self.erase_progress();
                Ok(AnswerOutcome::Complete(self.state.answers.clone()))
            }
        }
    }

    /// Step back to the previously visited question. Answers are kept so the
    /// earlier value can be shown again.
    pub fn go_back(&mut self) -> BackOutcome {
        let Some(previous) = self.state.history.pop() else {
            debug!("Back requested with empty history");
            return BackOutcome::Exit;
        };
        info!("Back: {} -> {previous}", self.state.current_question_id);
        self.state.current_question_id = previous.clone();
        self.persist();
        BackOutcome::Continue(previous)
    }

    fn persist(&mut self) {
        let body = match serde_json::to_string(&self.state) {
            Ok(body) => body,
            Err(err) => {
                warn!("Could not serialize triage progress, skipping save: {err}");
                return;
            }
        };
        trace!("Saving triage progress: {body}");
        if let Err(err) = self.store.save(&self.session_key, &body) {
            warn!("Triage progress not saved: {err}");
        }
    }

    fn erase_progress(&mut self) {
        if let Err(err) = self.store.clear(&self.session_key) {
            warn!("Could not clear triage progress: {err}");
        }
    }
}

/// Follow `next` through hidden questions until a visible or terminal one.
/// Hidden questions always carry a fixed successor (enforced by the graph).
fn resolve(graph: &QuestionGraph, mut next: Option<String>, answers: &AnswerSet) -> Resolved {
    // Graphs are acyclic, so each question is visited at most once.
    for _ in 0..=graph.len() {
        let Some(id) = next else {
            break;
        };
        let Some(node) = graph.get(&id) else {
            warn!("Successor '{id}' is not in the graph, ending triage");
            return Resolved::Terminal(id);
        };
        if node.is_terminal() {
            return Resolved::Terminal(id);
        }
        if node.is_visible(answers) {
            return Resolved::Question(id);
        }
        debug!("Skipping hidden question '{id}'");
        next = node.next_id.clone();
    }
    Resolved::Terminal(TERMINAL_ID.to_string())
}

fn fresh_state(graph: &QuestionGraph) -> TraversalState {
    let mut state = TraversalState::fresh(graph.entry_id());
    let entry = graph.get(graph.entry_id());
    if entry.is_some_and(|q| !q.is_visible(&state.answers)) {
        let next = entry.and_then(|q| q.next_id.clone());
        state.current_question_id = match resolve(graph, next, &state.answers) {
            Resolved::Question(id) | Resolved::Terminal(id) => id,
        };
    }
    debug!("Starting fresh triage at '{}'", state.current_question_id);
    state
}

fn restore<S: ProgressStore>(
    graph: &QuestionGraph,
    store: &S,
    key: &str,
) -> Option<TraversalState> {
    let body = match store.load(key) {
        Ok(Some(body)) => body,
        Ok(None) => return None,
        Err(err) => {
            warn!("Triage progress unavailable, starting fresh: {err}");
            return None;
        }
    };
    let state: TraversalState = match serde_json::from_str(&body) {
        Ok(state) => state,
        Err(err) => {
            warn!("Ignoring unreadable triage progress: {err}");
            return None;
        }
    };
    let known = |id: &str| graph.get(id).is_some_and(|q| !q.is_terminal());
    if !known(state.current_question_id.as_str())
        || !state.history.iter().all(|id| known(id.as_str()))
    {
        warn!(
            "Ignoring triage progress that does not match this questionnaire (at '{}')",
            state.current_question_id
        );
        return None;
    }
    Some(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::answers::JURISDICTION_KEY;
    use crate::triage::graph::bereavement_triage;
    use crate::triage::jurisdiction::Jurisdiction;
    use crate::triage::store::{MemoryStore, StoreError};

    const KEY: &str = "test-progress";

    fn engine() -> TriageEngine<MemoryStore> {
        TriageEngine::new(bereavement_triage(), MemoryStore::new(), KEY)
    }

    fn current(engine: &TriageEngine<MemoryStore>) -> &str {
        &engine.state().current_question_id
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    impl ProgressStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        fn save(&mut self, _key: &str, _body: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        fn clear(&mut self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
    }

    #[test]
    fn test_fresh_engine_starts_at_entry() {
        let engine = engine();
        assert_eq!(current(&engine), "location");
        assert!(engine.state().history.is_empty());
        assert!(engine.answers().is_empty());
        assert!(!engine.is_complete());
    }

    #[test]
    fn test_expected_home_death_skips_police_question() {
        let mut engine = engine();
        let outcome = engine.answer("home-expected").unwrap();
        assert_eq!(outcome, AnswerOutcome::Continue("postcode".into()));
        assert_eq!(engine.state().history, vec!["location".to_string()]);
    }

    #[test]
    fn test_unexpected_home_death_asks_police_question() {
        let mut engine = engine();
        let outcome = engine.answer("home-unexpected").unwrap();
        assert_eq!(outcome, AnswerOutcome::Continue("police_coroner".into()));
        assert_eq!(
            engine.answer("yes").unwrap(),
            AnswerOutcome::Continue("postcode".into())
        );
    }

    #[test]
    fn test_faith_branches() {
        let mut engine = engine();
        engine.answer("hospital").unwrap();
        engine.answer("AL1 3JQ").unwrap();
        engine.answer("adult").unwrap();
        assert_eq!(
            engine.answer("islam").unwrap(),
            AnswerOutcome::Continue("urgent_burial".into())
        );
        assert_eq!(
            engine.answer("yes").unwrap(),
            AnswerOutcome::Continue("burial_cremation".into())
        );

        let mut engine = self::engine();
        engine.answer("hospital").unwrap();
        engine.answer("AL1 3JQ").unwrap();
        engine.answer("adult").unwrap();
        assert_eq!(
            engine.answer("christian").unwrap(),
            AnswerOutcome::Continue("burial_cremation".into())
        );
    }

    #[test]
    fn test_unknown_option_is_rejected_without_mutation() {
        let mut engine = engine();
        let before = engine.state().clone();
        let err = engine.answer("on-the-moon").unwrap_err();
        assert_eq!(
            err,
            TriageError::UnknownOption {
                question: "location".into(),
                value: "on-the-moon".into()
            }
        );
        assert_eq!(engine.state(), &before);
        assert!(engine.store().get(KEY).is_none());
    }

    #[test]
    fn test_empty_answer_is_rejected() {
        let mut engine = engine();
        engine.answer("home-expected").unwrap();
        let before = engine.state().clone();
        for blank in ["", "   "] {
            assert_eq!(
                engine.answer(blank).unwrap_err(),
                TriageError::EmptyAnswer {
                    question: "postcode".into()
                }
            );
        }
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_postcode_answer_derives_jurisdiction() {
        let mut engine = engine();
        engine.answer("home-expected").unwrap();
        let outcome = engine.answer("eh1 1re").unwrap();
        assert_eq!(outcome, AnswerOutcome::Continue("age".into()));
        assert_eq!(engine.answers().get("postcode"), Some("eh1 1re"));
        assert_eq!(engine.answers().jurisdiction(), Some(Jurisdiction::Scotland));
    }

    #[test]
    fn test_reanswering_postcode_rederives_jurisdiction() {
        let mut engine = engine();
        engine.answer("home-expected").unwrap();
        engine.answer("BT1 1AA").unwrap();
        assert_eq!(
            engine.answers().get(JURISDICTION_KEY),
            Some("northern-ireland")
        );
        engine.go_back();
        engine.answer("M1 1AA").unwrap();
        assert_eq!(engine.answers().get(JURISDICTION_KEY), Some("england-wales"));
    }

    #[test]
    fn test_go_back_keeps_previous_answer() {
        let mut engine = engine();
        engine.answer("home-expected").unwrap();
        assert_eq!(current(&engine), "postcode");

        assert_eq!(engine.go_back(), BackOutcome::Continue("location".into()));
        assert_eq!(current(&engine), "location");
        assert_eq!(engine.answers().get("location"), Some("home-expected"));
        assert!(engine.state().history.is_empty());
    }

    #[test]
    fn test_go_back_with_empty_history_exits_without_mutation() {
        let mut engine = engine();
        let before = engine.state().clone();
        assert_eq!(engine.go_back(), BackOutcome::Exit);
        assert_eq!(engine.state(), &before);
        assert!(engine.store().get(KEY).is_none());
    }

    #[test]
    fn test_changed_branch_keeps_stale_answers() {
        let mut engine = engine();
        engine.answer("hospital").unwrap();
        engine.answer("AL1 3JQ").unwrap();
        engine.answer("adult").unwrap();
        engine.answer("islam").unwrap();
        engine.answer("yes").unwrap();
        engine.go_back();
        engine.go_back();
        assert_eq!(current(&engine), "religion");
        assert_eq!(
            engine.answer("christian").unwrap(),
            AnswerOutcome::Continue("burial_cremation".into())
        );
        assert_eq!(engine.answers().get("urgent_burial"), Some("yes"));
    }

    #[test]
    fn test_full_default_path_completes_and_clears_progress() {
        let mut engine = engine();
        let path = [
            "home-expected",
            "AL1 3JQ",
            "adult",
            "none",
            "burial",
            "no",
        ];
        for value in path {
            assert!(matches!(
                engine.answer(value).unwrap(),
                AnswerOutcome::Continue(_)
            ));
            assert!(engine.store().get(KEY).is_some());
        }

        let AnswerOutcome::Complete(answers) = engine.answer("no").unwrap() else {
            panic!("expected the last answer to complete the triage");
        };
        let keys: Vec<&str> = answers.keys().collect();
        assert_eq!(
            keys,
            vec![
                "age",
                "burial_cremation",
                "funeral_plan",
                "jurisdiction",
                "location",
                "postcode",
                "religion",
                "will",
            ]
        );
        assert_eq!(answers.jurisdiction(), Some(Jurisdiction::EnglandWales));
        assert!(engine.is_complete());
        assert_eq!(current(&engine), TERMINAL_ID);
        assert!(engine.store().get(KEY).is_none());

        assert_eq!(
            engine.answer("anything").unwrap_err(),
            TriageError::AlreadyComplete
        );
    }

    #[test]
    fn test_progress_round_trips_through_store() {
        let mut engine = engine();
        engine.answer("home-unexpected").unwrap();
        engine.answer("unsure").unwrap();
        engine.answer("G1 1XQ").unwrap();
        let saved = engine.state().clone();

        let restored = TriageEngine::new(bereavement_triage(), engine.into_store(), KEY);
        assert_eq!(restored.state(), &saved);
        assert_eq!(restored.state().current_question_id, "age");
        assert_eq!(
            restored.state().history,
            vec!["location", "police_coroner", "postcode"]
        );
        assert_eq!(
            restored.answers().jurisdiction(),
            Some(Jurisdiction::Scotland)
        );
    }

    #[test]
    fn test_persisted_json_shape() {
        let mut engine = engine();
        engine.answer("hospital").unwrap();
        let body = engine.store().get(KEY).unwrap();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["currentQuestionId"], "postcode");
        assert_eq!(value["history"][0], "location");
        assert_eq!(value["answers"]["location"], "hospital");
    }

    #[test]
    fn test_corrupt_progress_starts_fresh() {
        let mut store = MemoryStore::new();
        store.save(KEY, "{definitely not json").unwrap();
        let engine = TriageEngine::new(bereavement_triage(), store, KEY);
        assert_eq!(current(&engine), "location");

        let mut store = MemoryStore::new();
        store
            .save(
                KEY,
                r#"{"currentQuestionId":"no_such_question","history":[],"answers":{}}"#,
            )
            .unwrap();
        let engine = TriageEngine::new(bereavement_triage(), store, KEY);
        assert_eq!(current(&engine), "location");
    }

    #[test]
    fn test_broken_store_does_not_block_the_questionnaire() {
        let mut engine = TriageEngine::new(bereavement_triage(), BrokenStore, KEY);
        assert_eq!(engine.state().current_question_id, "location");
        engine.answer("home-expected").unwrap();
        assert_eq!(engine.go_back(), BackOutcome::Continue("location".into()));
        for value in ["home-expected", "SW1A 1AA", "adult", "none", "cremation", "yes"] {
            engine.answer(value).unwrap();
        }
        assert!(matches!(
            engine.answer("no").unwrap(),
            AnswerOutcome::Complete(_)
        ));
    }

    #[test]
    fn test_hidden_entry_is_skipped_on_fresh_start() {
        use crate::triage::node::{AnswerOption, Visibility};

        let graph = QuestionGraph::new(
            "intro",
            vec![
                Question::free_text("intro", "Intro?")
                    .then("name")
                    .visible_when(Visibility::AnswerIn {
                        question: "name".into(),
                        values: vec!["never".into()],
                    }),
                Question::single_choice(
                    "name",
                    "Name?",
                    vec![AnswerOption::new("a", "A").then("done")],
                ),
                Question::terminal("done", "Done"),
            ],
        )
        .unwrap();
        let engine = TriageEngine::new(graph, MemoryStore::new(), KEY);
        assert_eq!(engine.state().current_question_id, "name");
    }

    #[test]
    fn test_fully_hidden_graph_starts_complete() {
        use crate::triage::node::Visibility;

        let graph = QuestionGraph::new(
            "intro",
            vec![
                Question::free_text("intro", "Intro?")
                    .then("done")
                    .visible_when(Visibility::AnswerIn {
                        question: "intro".into(),
                        values: vec!["never".into()],
                    }),
                Question::terminal("done", "Done"),
            ],
        )
        .unwrap();
        let mut engine = TriageEngine::new(graph, MemoryStore::new(), KEY);
        assert_eq!(engine.state().current_question_id, "done");
        assert!(engine.is_complete());
        assert!(engine.state().history.is_empty());
        assert_eq!(
            engine.answer("anything").unwrap_err(),
            TriageError::AlreadyComplete
        );
    }
}

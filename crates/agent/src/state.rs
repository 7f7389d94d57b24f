//! Conversation turns and per-run control state.

use crate::rewriter::FailureReason;
use crate::verdict::{Intent, Verdict};
use ragloop_knowledge::{RawFragment, ReconstructedDocument};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Render the last `window` turns as `role: text` lines.
pub fn format_history(turns: &[Turn], window: usize) -> String {
    let start = turns.len().saturating_sub(window);
    turns[start..]
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Control state of one run of the loop for one user question.
#[derive(Debug, Clone)]
pub struct RunState {
    /// The user's question as asked
    pub original_question: String,

    /// Current retrieval query; replaced on every rewrite
    pub question: String,

    /// Set once by the router
    pub intent: Option<Intent>,

    /// Top reranked fragments of the current attempt
    pub candidates: Vec<RawFragment>,

    pub documents: Vec<ReconstructedDocument>,

    /// Empty until generation succeeds
    pub generation: String,

    pub retry_count: u32,

    pub is_grounded: Option<Verdict>,
    pub is_useful: Option<Verdict>,

    /// Documents attached when `generation` was produced
    pub sources_count: usize,

    /// Reason for the most recent rewrite
    pub last_failure: Option<FailureReason>,
}

impl RunState {
    pub fn new(question: impl Into<String>) -> Self {
        let question = question.into();
        Self {
            original_question: question.clone(),
            question,
            intent: None,
            candidates: Vec::new(),
            documents: Vec::new(),
            generation: String::new(),
            retry_count: 0,
            is_grounded: None,
            is_useful: None,
            sources_count: 0,
            last_failure: None,
        }
    }

    /// Whether the run is on the grounded path. Unset intent counts as technical.
    pub fn is_technical(&self) -> bool {
        self.intent != Some(Intent::Conversational)
    }

    /// Enter the next attempt with a rewritten query.
    pub fn begin_retry(&mut self, new_question: String, reason: FailureReason) {
        self.question = new_question;
        self.retry_count += 1;
        self.last_failure = Some(reason);
        self.candidates.clear();
        self.documents.clear();
        self.generation.clear();
        self.is_grounded = None;
        self.is_useful = None;
        self.sources_count = 0;
    }

    /// Persistable view of the finished run.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            original_question: self.original_question.clone(),
            question: self.question.clone(),
            intent: self.intent,
            generation: self.generation.clone(),
            retry_count: self.retry_count,
            is_grounded: self.is_grounded,
            is_useful: self.is_useful,
            sources_count: self.sources_count,
            last_failure: self.last_failure,
        }
    }
}

/// The fields of a finished run kept in a thread checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub original_question: String,
    pub question: String,
    pub intent: Option<Intent>,
    pub generation: String,
    pub retry_count: u32,
    pub is_grounded: Option<Verdict>,
    pub is_useful: Option<Verdict>,
    pub sources_count: usize,
    pub last_failure: Option<FailureReason>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragloop_knowledge::FragmentKind;

    #[test]
    fn test_format_history_window() {
        let turns = vec![
            Turn::user("hi"),
            Turn::assistant("hello"),
            Turn::user("what is the report about?"),
            Turn::assistant("Revenue."),
        ];

        assert_eq!(
            format_history(&turns, 2),
            "user: what is the report about?\nassistant: Revenue."
        );
        assert_eq!(format_history(&turns, 10).lines().count(), 4);
        assert_eq!(format_history(&[], 6), "");
    }

    #[test]
    fn test_begin_retry_clears_attempt_state() {
        let mut state = RunState::new("What is this report about?");
        state.intent = Some(Intent::Technical);
        state.candidates.push(RawFragment {
            id: "f".to_string(),
            parent_id: "p".to_string(),
            source: "r.pdf".to_string(),
            page: 1,
            element_index: 0,
            kind: FragmentKind::Text,
            text: "x".to_string(),
        });
        state.documents.push(ReconstructedDocument {
            content: "x".to_string(),
            source: "r.pdf".to_string(),
            pages: vec![1],
            doc_id: "p".to_string(),
        });
        state.generation = "draft".to_string();
        state.is_grounded = Some(Verdict::No);
        state.sources_count = 1;

        state.begin_retry("report summary".to_string(), FailureReason::NotGrounded);

        assert_eq!(state.retry_count, 1);
        assert_eq!(state.question, "report summary");
        assert_eq!(state.original_question, "What is this report about?");
        assert_eq!(state.intent, Some(Intent::Technical));
        assert!(state.candidates.is_empty());
        assert!(state.documents.is_empty());
        assert!(state.generation.is_empty());
        assert_eq!(state.is_grounded, None);
        assert_eq!(state.is_useful, None);
        assert_eq!(state.sources_count, 0);
        assert_eq!(state.last_failure, Some(FailureReason::NotGrounded));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut state = RunState::new("hello");
        state.intent = Some(Intent::Conversational);
        state.generation = "Hi there".to_string();

        let value = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(value["originalQuestion"], "hello");
        assert_eq!(value["intent"], "conversational");
        assert_eq!(value["retryCount"], 0);
        assert!(value["isGrounded"].is_null());
    }
}

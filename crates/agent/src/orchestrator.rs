//! The corrective retrieval state machine.
//!
//! ```text
//! RouteIntent ─┬─ conversational ─> Generate ─> Done
//!              └─ technical ─> Retrieve ─> GradeDocuments ─┬─> Generate ─> GradeGrounding ─> GradeUsefulness ─> Done
//!                                 ^                        │                    │                  │
//!                                 └──────── Rewrite <──────┴────────────────────┴──────────────────┘
//! ```
//!
//! Every arrow back to `Rewrite` is taken only while `retry_count` is below
//! the budget. Once the budget is spent each gate lets the run through, so a
//! run always ends with the best generation it has.

use crate::capability::{Classifier, TextGenerator};
use crate::gates::QualityGates;
use crate::generator::AnswerGenerator;
use crate::rewriter::{FailureReason, QueryRewriter};
use crate::router::IntentRouter;
use crate::state::{RunState, Turn};
use crate::verdict::{Intent, Verdict};
use ragloop_core::{AgentSettings, AppError, AppResult};
use ragloop_knowledge::{
    ContextReconstructor, FragmentStore, RawFragment, RelevanceScorer, Reranker,
};
use ragloop_prompt::PromptLibrary;
use std::sync::Arc;

/// States of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RouteIntent,
    Retrieve,
    GradeDocuments,
    Generate,
    GradeGrounding,
    GradeUsefulness,
    Rewrite(FailureReason),
    Done,
}

/// Steps one attempt can take: Retrieve, GradeDocuments, Generate, two gates, Rewrite.
const STEPS_PER_ATTEMPT: usize = 6;

/// Upper bound on steps for a run with the given budget.
pub fn step_ceiling(max_retries: u32) -> usize {
    1 + STEPS_PER_ATTEMPT * (max_retries as usize + 1)
}

pub fn after_route(intent: Intent) -> Step {
    match intent {
        Intent::Conversational => Step::Generate,
        Intent::Technical => Step::Retrieve,
    }
}

pub fn after_grade_documents(state: &RunState, max_retries: u32) -> Step {
    if !state.documents.is_empty() {
        Step::Generate
    } else if state.retry_count < max_retries {
        Step::Rewrite(FailureReason::NoRelevantDocuments)
    } else {
        // Budget spent: generation states the absence of evidence
        Step::Generate
    }
}

pub fn after_generate(state: &RunState) -> Step {
    if state.is_technical() {
        Step::GradeGrounding
    } else {
        Step::Done
    }
}

pub fn after_grounding(state: &RunState, max_retries: u32) -> Step {
    match state.is_grounded {
        Some(Verdict::Yes) => Step::GradeUsefulness,
        _ if state.retry_count < max_retries => Step::Rewrite(FailureReason::NotGrounded),
        _ => Step::GradeUsefulness,
    }
}

pub fn after_usefulness(state: &RunState, max_retries: u32) -> Step {
    match state.is_useful {
        Some(Verdict::Yes) => Step::Done,
        _ if state.retry_count < max_retries => Step::Rewrite(FailureReason::NotUseful),
        _ => Step::Done,
    }
}

/// External capabilities the loop is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub generator: Arc<dyn TextGenerator>,
    pub store: Arc<dyn FragmentStore>,
    pub scorer: Arc<dyn RelevanceScorer>,
}

/// Runs one question through the loop. Holds no per-run state.
pub struct Orchestrator {
    router: IntentRouter,
    gates: QualityGates,
    rewriter: QueryRewriter,
    generator: AnswerGenerator,
    store: Arc<dyn FragmentStore>,
    reranker: Reranker,
    reconstructor: ContextReconstructor,
    settings: AgentSettings,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        prompts: &PromptLibrary,
        settings: AgentSettings,
    ) -> AppResult<Self> {
        let Collaborators {
            classifier,
            generator,
            store,
            scorer,
        } = collaborators;

        Ok(Self {
            router: IntentRouter::new(Arc::clone(&classifier), prompts)?,
            gates: QualityGates::new(classifier, prompts)?,
            rewriter: QueryRewriter::new(Arc::clone(&generator), prompts, settings.history_window)?,
            generator: AnswerGenerator::new(generator, prompts, settings.history_window)?,
            reconstructor: ContextReconstructor::new(Arc::clone(&store)),
            store,
            reranker: Reranker::new(scorer),
            settings,
        })
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Drive a question to a terminal state.
    ///
    /// `history` is the thread's prior turns. Collaborator failures abort the
    /// run; exhausting the retry budget does not.
    pub async fn run(&self, question: &str, history: &[Turn]) -> AppResult<RunState> {
        let mut state = RunState::new(question);
        let ceiling = step_ceiling(self.settings.max_retries);
        let mut step = Step::RouteIntent;
        let mut taken = 0usize;

        while step != Step::Done {
            taken += 1;
            if taken > ceiling {
                return Err(AppError::Agent(format!(
                    "Run exceeded {} steps without terminating",
                    ceiling
                )));
            }

            tracing::info!(state = ?step, retry_count = state.retry_count, "Transition");
            step = self.execute(step, &mut state, history).await?;
        }

        tracing::info!(
            retry_count = state.retry_count,
            sources_count = state.sources_count,
            steps = taken,
            "Run complete"
        );
        Ok(state)
    }

    async fn execute(&self, step: Step, state: &mut RunState, history: &[Turn]) -> AppResult<Step> {
        let max_retries = self.settings.max_retries;

        match step {
            Step::RouteIntent => {
                let intent = self.router.classify_intent(&state.question).await?;
                state.intent = Some(intent);
                Ok(after_route(intent))
            }

            Step::Retrieve => {
                let fragments = self
                    .store
                    .search(&state.question, self.settings.search_k)
                    .await?;
                let retrieved = fragments.len();

                let mut ranked = self.reranker.rerank(&state.question, fragments).await?;
                ranked.truncate(self.settings.rerank_top_k);
                state.candidates = ranked;

                tracing::debug!(
                    retrieved,
                    candidates = state.candidates.len(),
                    "Retrieved fragments"
                );
                Ok(Step::GradeDocuments)
            }

            Step::GradeDocuments => {
                let verdicts = self
                    .gates
                    .grade_fragments(
                        &state.question,
                        &state.candidates,
                        self.settings.grading_concurrency,
                    )
                    .await?;

                let relevant: Vec<RawFragment> = state
                    .candidates
                    .iter()
                    .zip(&verdicts)
                    .filter(|(_, verdict)| verdict.is_yes())
                    .map(|(fragment, _)| fragment.clone())
                    .collect();

                tracing::debug!(
                    graded = verdicts.len(),
                    relevant = relevant.len(),
                    "Graded fragments"
                );

                state.documents = self
                    .reconstructor
                    .reconstruct(&state.question, &relevant, self.settings.rerank_top_k)
                    .await?;
                Ok(after_grade_documents(state, max_retries))
            }

            Step::Generate => {
                state.generation = self
                    .generator
                    .generate(history, &state.original_question, &state.documents)
                    .await?;
                state.sources_count = state.documents.len();
                Ok(after_generate(state))
            }

            Step::GradeGrounding => {
                let verdict = self
                    .gates
                    .grade_grounding(&state.documents, &state.generation)
                    .await?;
                state.is_grounded = Some(verdict);
                tracing::debug!(?verdict, "Grounding verdict");
                Ok(after_grounding(state, max_retries))
            }

            Step::GradeUsefulness => {
                let verdict = self
                    .gates
                    .grade_usefulness(&state.original_question, &state.generation)
                    .await?;
                state.is_useful = Some(verdict);
                tracing::debug!(?verdict, "Usefulness verdict");
                Ok(after_usefulness(state, max_retries))
            }

            Step::Rewrite(reason) => {
                let question = self
                    .rewriter
                    .rewrite(&state.question, history, reason)
                    .await?;
                state.begin_retry(question, reason);
                tracing::info!(
                    retry_count = state.retry_count,
                    reason = reason.as_str(),
                    "Retrying with rewritten query"
                );
                Ok(Step::Retrieve)
            }

            Step::Done => Ok(Step::Done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragloop_knowledge::ReconstructedDocument;

    fn technical_state(retry_count: u32) -> RunState {
        let mut state = RunState::new("q");
        state.intent = Some(Intent::Technical);
        state.retry_count = retry_count;
        state
    }

    fn document() -> ReconstructedDocument {
        ReconstructedDocument {
            content: "c".to_string(),
            source: "s.pdf".to_string(),
            pages: vec![1],
            doc_id: "p".to_string(),
        }
    }

    #[test]
    fn test_route_transitions() {
        assert_eq!(after_route(Intent::Conversational), Step::Generate);
        assert_eq!(after_route(Intent::Technical), Step::Retrieve);
    }

    #[test]
    fn test_empty_pool_rewrites_until_budget_spent() {
        assert_eq!(
            after_grade_documents(&technical_state(0), 3),
            Step::Rewrite(FailureReason::NoRelevantDocuments)
        );
        assert_eq!(
            after_grade_documents(&technical_state(2), 3),
            Step::Rewrite(FailureReason::NoRelevantDocuments)
        );
        assert_eq!(after_grade_documents(&technical_state(3), 3), Step::Generate);

        let mut state = technical_state(0);
        state.documents.push(document());
        assert_eq!(after_grade_documents(&state, 3), Step::Generate);
    }

    #[test]
    fn test_generate_transition_depends_on_intent() {
        let mut state = RunState::new("hello");
        state.intent = Some(Intent::Conversational);
        assert_eq!(after_generate(&state), Step::Done);
        assert_eq!(after_generate(&technical_state(0)), Step::GradeGrounding);
    }

    #[test]
    fn test_grounding_transitions() {
        let mut state = technical_state(0);
        state.is_grounded = Some(Verdict::Yes);
        assert_eq!(after_grounding(&state, 3), Step::GradeUsefulness);

        state.is_grounded = Some(Verdict::No);
        assert_eq!(
            after_grounding(&state, 3),
            Step::Rewrite(FailureReason::NotGrounded)
        );

        state.retry_count = 3;
        assert_eq!(after_grounding(&state, 3), Step::GradeUsefulness);
    }

    #[test]
    fn test_usefulness_transitions() {
        let mut state = technical_state(1);
        state.is_useful = Some(Verdict::Yes);
        assert_eq!(after_usefulness(&state, 3), Step::Done);

        state.is_useful = Some(Verdict::No);
        assert_eq!(
            after_usefulness(&state, 3),
            Step::Rewrite(FailureReason::NotUseful)
        );

        state.retry_count = 3;
        assert_eq!(after_usefulness(&state, 3), Step::Done);
    }

    #[test]
    fn test_zero_budget_never_rewrites() {
        let mut state = technical_state(0);
        state.is_grounded = Some(Verdict::No);
        state.is_useful = Some(Verdict::No);
        assert_eq!(after_grade_documents(&state, 0), Step::Generate);
        assert_eq!(after_grounding(&state, 0), Step::GradeUsefulness);
        assert_eq!(after_usefulness(&state, 0), Step::Done);
    }

    #[test]
    fn test_step_ceiling() {
        assert_eq!(step_ceiling(0), 7);
        assert_eq!(step_ceiling(3), 25);
    }
}

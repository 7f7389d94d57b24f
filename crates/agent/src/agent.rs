//! Thread-aware front door to the control loop.

use crate::capability::{LlmClassifier, LlmTextGenerator};
use crate::checkpoint::{Checkpoint, CheckpointStore, SqliteCheckpointStore};
use crate::orchestrator::{Collaborators, Orchestrator};
use crate::state::Turn;
use chrono::Utc;
use ragloop_core::{AppConfig, AppError, AppResult};
use ragloop_knowledge::{open_store, LexicalScorer};
use ragloop_llm::{create_client, ClientOptions};
use ragloop_prompt::PromptLibrary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tracing::Instrument;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    pub thread_id: String,
}

impl AskRequest {
    pub fn new(question: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            thread_id: thread_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskMetadata {
    pub retries: u32,
    pub sources_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub metadata: AskMetadata,
}

/// Hands every thread id its own async lock.
///
/// An entry lives only while some run holds or awaits it.
#[derive(Default)]
struct ThreadLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    async fn acquire(&self, thread_id: &str) -> AppResult<ThreadGuard<'_>> {
        let lock = {
            let mut locks = self.map()?;
            Arc::clone(locks.entry(thread_id.to_string()).or_default())
        };
        Ok(ThreadGuard {
            locks: self,
            thread_id: thread_id.to_string(),
            guard: Some(lock.lock_owned().await),
        })
    }

    fn map(&self) -> AppResult<MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>>> {
        self.locks
            .lock()
            .map_err(|_| AppError::Agent("Thread lock map poisoned".to_string()))
    }

    /// Drop the thread's entry once nobody else references it.
    fn release(&self, thread_id: &str) {
        let Ok(mut locks) = self.map() else {
            return;
        };
        if locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(thread_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// Holds a thread's lock; releasing it prunes the idle entry.
struct ThreadGuard<'a> {
    locks: &'a ThreadLocks,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.thread_id);
    }
}

/// Runs questions against conversation threads.
///
/// Runs on the same thread are serialised; runs on different threads
/// proceed concurrently and share nothing mutable.
pub struct Agent {
    orchestrator: Orchestrator,
    checkpoints: Arc<dyn CheckpointStore>,
    locks: ThreadLocks,
}

impl Agent {
    pub fn new(orchestrator: Orchestrator, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            orchestrator,
            checkpoints,
            locks: ThreadLocks::default(),
        }
    }

    /// Wire the agent from workspace configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let endpoint = config.resolve_endpoint(&config.provider);
        let api_key = config.resolve_api_key(&config.provider);
        let client = create_client(
            &config.provider,
            ClientOptions {
                endpoint: endpoint.as_deref(),
                api_key: api_key.as_deref(),
                timeout_secs: config.resolve_timeout(&config.provider),
            },
        )?;

        let collaborators = Collaborators {
            classifier: Arc::new(LlmClassifier::new(Arc::clone(&client), &config.model)),
            generator: Arc::new(LlmTextGenerator::new(client, &config.model)),
            store: Arc::new(open_store(config)?),
            scorer: Arc::new(LexicalScorer::default()),
        };

        let prompts = PromptLibrary::load(&config.workspace)?;
        let orchestrator = Orchestrator::new(collaborators, &prompts, config.agent.clone())?;
        let checkpoints = SqliteCheckpointStore::open(&config.checkpoint_path())?;

        tracing::debug!(
            provider = %config.provider,
            model = %config.model,
            "Agent ready"
        );
        Ok(Self::new(orchestrator, Arc::new(checkpoints)))
    }

    /// Answer one question on a thread and persist the thread.
    pub async fn ask(&self, request: AskRequest) -> AppResult<AskResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(AppError::Agent("Question must not be empty".to_string()));
        }

        let span = tracing::info_span!("run", thread_id = %request.thread_id);
        self.ask_locked(&request.thread_id, question)
            .instrument(span)
            .await
    }

    async fn ask_locked(&self, thread_id: &str, question: &str) -> AppResult<AskResponse> {
        let _guard = self.locks.acquire(thread_id).await?;

        let mut messages = self
            .checkpoints
            .load(thread_id)
            .await?
            .map(|c| c.messages)
            .unwrap_or_default();

        let mut state = self.orchestrator.run(question, &messages).await?;
        state.documents.clear();
        state.candidates.clear();

        messages.push(Turn::user(question));
        messages.push(Turn::assistant(state.generation.clone()));

        let checkpoint = Checkpoint {
            messages,
            last_run: state.snapshot(),
            updated_at: Utc::now(),
        };
        self.checkpoints.save(thread_id, &checkpoint).await?;

        Ok(AskResponse {
            question: question.to_string(),
            answer: state.generation,
            metadata: AskMetadata {
                retries: state.retry_count,
                sources_count: state.sources_count,
            },
        })
    }

    /// The thread's checkpoint, if it has completed a run.
    pub async fn thread(&self, thread_id: &str) -> AppResult<Option<Checkpoint>> {
        self.checkpoints.load(thread_id).await
    }

    /// Forget a thread. Waits for any in-flight run on it.
    pub async fn clear_thread(&self, thread_id: &str) -> AppResult<bool> {
        let _guard = self.locks.acquire(thread_id).await?;
        self.checkpoints.delete(thread_id).await
    }

    #[cfg(test)]
    pub(crate) fn tracked_threads(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json_shape() {
        let response = AskResponse {
            question: "hello".to_string(),
            answer: "Hi!".to_string(),
            metadata: AskMetadata {
                retries: 0,
                sources_count: 0,
            },
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["metadata"]["sourcesCount"], 0);
        assert_eq!(value["metadata"]["retries"], 0);
    }

    #[test]
    fn test_request_reads_thread_id() {
        let request: AskRequest =
            serde_json::from_str(r#"{"question": "q", "threadId": "t-1"}"#).unwrap();
        assert_eq!(request.thread_id, "t-1");
    }

    #[tokio::test]
    async fn test_same_thread_shares_lock() {
        let locks = ThreadLocks::default();
        let guard = locks.acquire("t1").await.unwrap();

        // Different thread is free
        let other = locks.acquire("t2").await.unwrap();
        drop(other);

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.acquire("t1"),
        )
        .await;
        assert!(pending.is_err());

        drop(guard);
        assert!(locks.acquire("t1").await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = ThreadLocks::default();

        let first = locks.acquire("t1").await.unwrap();
        assert_eq!(locks.len(), 1);

        let waiter = locks.acquire("t1");
        tokio::pin!(waiter);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), &mut waiter)
                .await
                .is_err()
        );

        // The waiter still references the entry
        drop(first);
        assert_eq!(locks.len(), 1);

        let second = waiter.await.unwrap();
        assert_eq!(locks.len(), 1);
        drop(second);
        assert_eq!(locks.len(), 0);
    }
}

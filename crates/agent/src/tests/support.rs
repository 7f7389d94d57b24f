//! Scripted collaborators for driving the loop without a model.

use crate::agent::Agent;
use crate::capability::{Classifier, TextGenerator};
use crate::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use crate::orchestrator::{Collaborators, Orchestrator};
use ragloop_core::{AgentSettings, AppError, AppResult};
use ragloop_knowledge::{FragmentKind, FragmentStore, RawFragment, RelevanceScorer, StoreStats};
use ragloop_prompt::{BuiltPrompt, PromptLibrary};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Rule<T> = Box<dyn Fn(&BuiltPrompt, usize) -> AppResult<T> + Send + Sync>;

/// Replies by prompt id and records every prompt it sees.
struct Script<T> {
    rules: HashMap<String, Rule<T>>,
    seen: Mutex<Vec<BuiltPrompt>>,
}

impl<T> Script<T> {
    fn new() -> Self {
        Self {
            rules: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn reply(&self, prompt: &BuiltPrompt) -> AppResult<T> {
        let call = {
            let mut seen = self.seen.lock().unwrap();
            let call = seen
                .iter()
                .filter(|p| p.prompt_id() == prompt.prompt_id())
                .count();
            seen.push(prompt.clone());
            call
        };

        match self.rules.get(prompt.prompt_id()) {
            Some(rule) => rule(prompt, call),
            None => panic!("No scripted reply for {}", prompt.prompt_id()),
        }
    }

    fn calls(&self, prompt_id: &str) -> Vec<BuiltPrompt> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.prompt_id() == prompt_id)
            .cloned()
            .collect()
    }
}

/// Successive replies; the last one repeats.
fn sequenced<T: Clone>(replies: Vec<T>) -> impl Fn(usize) -> T {
    move |call| replies[call.min(replies.len() - 1)].clone()
}

pub fn verdict(yes: bool) -> Value {
    json!({"binary_score": if yes { "yes" } else { "no" }})
}

pub struct ScriptedClassifier {
    script: Script<Value>,
    delay: Option<Box<dyn Fn(&BuiltPrompt) -> Duration + Send + Sync>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn on(
        mut self,
        prompt_id: &str,
        rule: impl Fn(&BuiltPrompt) -> AppResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.script
            .rules
            .insert(prompt_id.to_string(), Box::new(move |p: &BuiltPrompt, _: usize| rule(p)));
        self
    }

    pub fn always(self, prompt_id: &str, value: Value) -> Self {
        self.on(prompt_id, move |_| Ok(value.clone()))
    }

    pub fn sequence(mut self, prompt_id: &str, values: Vec<Value>) -> Self {
        let next = sequenced(values);
        self.script
            .rules
            .insert(prompt_id.to_string(), Box::new(move |_: &BuiltPrompt, call: usize| Ok(next(call))));
        self
    }

    pub fn with_delay(
        mut self,
        delay: impl Fn(&BuiltPrompt) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self, prompt_id: &str) -> Vec<BuiltPrompt> {
        self.script.calls(prompt_id)
    }

    /// Most calls that were ever in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, prompt: &BuiltPrompt) -> AppResult<Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(ref delay) = self.delay {
            tokio::time::sleep(delay(prompt)).await;
        }
        let reply = self.script.reply(prompt);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

pub struct ScriptedGenerator {
    script: Script<String>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
        }
    }

    pub fn always(self, prompt_id: &str, text: &str) -> Self {
        self.sequence(prompt_id, vec![text])
    }

    pub fn sequence(mut self, prompt_id: &str, texts: Vec<&str>) -> Self {
        let next = sequenced(texts.into_iter().map(str::to_string).collect());
        self.script
            .rules
            .insert(prompt_id.to_string(), Box::new(move |_: &BuiltPrompt, call: usize| Ok(next(call))));
        self
    }

    pub fn calls(&self, prompt_id: &str) -> Vec<BuiltPrompt> {
        self.script.calls(prompt_id)
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &BuiltPrompt) -> AppResult<String> {
        self.script.reply(prompt)
    }
}

/// Returns every stored fragment for any query, in insertion order.
#[derive(Default)]
pub struct MemoryFragmentStore {
    fragments: Vec<RawFragment>,
    queries: Mutex<Vec<String>>,
}

impl MemoryFragmentStore {
    pub fn new(fragments: Vec<RawFragment>) -> Self {
        Self {
            fragments,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FragmentStore for MemoryFragmentStore {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<RawFragment>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.fragments.iter().take(k).cloned().collect())
    }

    async fn fetch_by_parent(&self, parent_id: &str) -> AppResult<Vec<RawFragment>> {
        // Reverse so callers cannot rely on store order
        Ok(self
            .fragments
            .iter()
            .rev()
            .filter(|f| f.parent_id == parent_id)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> AppResult<StoreStats> {
        Ok(StoreStats {
            fragments_count: self.fragments.len() as u32,
            ..Default::default()
        })
    }
}

/// Scores every passage equally, leaving store order intact.
pub struct FlatScorer;

#[async_trait::async_trait]
impl RelevanceScorer for FlatScorer {
    async fn score_batch(&self, _query: &str, passages: &[&str]) -> AppResult<Vec<f32>> {
        Ok(vec![0.0; passages.len()])
    }
}

pub fn fragment(parent_id: &str, page: u32, element_index: u32, text: &str) -> RawFragment {
    RawFragment {
        id: format!("{}-{}", parent_id, element_index),
        parent_id: parent_id.to_string(),
        source: format!("{}.pdf", parent_id),
        page,
        element_index,
        kind: FragmentKind::Text,
        text: text.to_string(),
    }
}

pub fn transport_error() -> AppError {
    AppError::Llm("connection refused".to_string())
}

pub struct Harness {
    pub classifier: Arc<ScriptedClassifier>,
    pub generator: Arc<ScriptedGenerator>,
    pub store: Arc<MemoryFragmentStore>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
    pub agent: Agent,
}

impl Harness {
    pub fn new(
        classifier: ScriptedClassifier,
        generator: ScriptedGenerator,
        fragments: Vec<RawFragment>,
    ) -> Self {
        Self::with_store(
            classifier,
            generator,
            Arc::new(MemoryFragmentStore::new(fragments)),
            Arc::new(FlatScorer),
        )
    }

    pub fn with_store(
        classifier: ScriptedClassifier,
        generator: ScriptedGenerator,
        store: Arc<MemoryFragmentStore>,
        scorer: Arc<dyn RelevanceScorer>,
    ) -> Self {
        let classifier = Arc::new(classifier);
        let generator = Arc::new(generator);
        let checkpoints = Arc::new(MemoryCheckpointStore::new());

        let collaborators = Collaborators {
            classifier: classifier.clone(),
            generator: generator.clone(),
            store: store.clone(),
            scorer,
        };
        let agent = build_agent(collaborators, checkpoints.clone());

        Self {
            classifier,
            generator,
            store,
            checkpoints,
            agent,
        }
    }
}

impl Harness {
    pub async fn checkpoints_load(&self, thread_id: &str) -> Checkpoint {
        self.checkpoints.load(thread_id).await.unwrap().unwrap()
    }
}

pub fn build_agent(collaborators: Collaborators, checkpoints: Arc<MemoryCheckpointStore>) -> Agent {
    let prompts = PromptLibrary::builtin().unwrap();
    let orchestrator =
        Orchestrator::new(collaborators, &prompts, AgentSettings::default()).unwrap();
    Agent::new(orchestrator, checkpoints)
}

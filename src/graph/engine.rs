//! Workflow engine
//!
//! [`ChatEngine`] owns the four workflow nodes, the checkpoint store, and the
//! web-search kill switch, and drives one conversational turn at a time:
//!
//! 1. load the thread's checkpoint (or defaults for an unseen thread)
//! 2. overlay the request fields onto the state
//! 3. walk the fixed topology, merging each stage's update
//! 4. persist the final state, but only if every stage succeeded
//!
//! Turns on the same thread are serialized behind a per-thread lock, so
//! concurrent callers never interleave their read-modify-write cycles. Turns
//! on different threads run freely in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::checkpoint::{CheckpointStore, ThreadId};
use crate::collab::{Generator, Grader, Retriever, WebSearchTool};
use crate::config::{EngineConfig, EnvSwitch, WebSearchSwitch};
use crate::error::FlowError;
use crate::graph::nodes::{ChatNode, FlowNode, GradeDocumentsNode, RetrieveNode, WebSearchNode};
use crate::graph::router::route_after_grading;
use crate::graph::topology::{Stage, Successor};
use crate::state::{ConversationState, Document, StateUpdate};

/// One conversational turn, addressed to a thread
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Thread to continue, or `None` to start a fresh one
    pub thread_id: Option<String>,

    /// The user's utterance for this turn
    pub input: String,

    /// User's name, overlaid onto the state when present
    pub name: Option<String>,

    /// User's birth date, overlaid onto the state when present
    pub birth_date: Option<String>,

    /// Per-request deadline, overriding the engine's configured timeout
    pub timeout: Option<Duration>,
}

impl TurnRequest {
    /// A request carrying only the user's input
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    /// Address the request to an existing thread
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Attach the user's name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach the user's birth date
    pub fn with_birth_date(mut self, birth_date: impl Into<String>) -> Self {
        self.birth_date = Some(birth_date.into());
        self
    }

    /// Bound this turn by a deadline of its own
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What a completed turn hands back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    /// Thread the turn ran on; echo this back to continue the conversation
    pub thread_id: ThreadId,

    /// The generated answer
    pub answer: String,

    /// Context snapshot the answer was grounded in
    pub context: String,

    /// Documents backing the answer, as reported by the generator. A
    /// history-aware generator that retrieves internally may return a
    /// different set than the working documents the workflow handed it.
    pub documents: Vec<Document>,

    /// Full step trace accumulated on the thread so far
    pub steps: Vec<String>,
}

/// Errors raised while assembling an engine
#[derive(Debug, Error)]
pub enum EngineBuildError {
    /// A required collaborator was never supplied to the builder
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Builder for [`ChatEngine`]
///
/// Every collaborator and the checkpoint store must be supplied; the kill
/// switch defaults to the environment-backed one and the config to
/// [`EngineConfig::default`].
#[derive(Default)]
pub struct ChatEngineBuilder {
    retriever: Option<Arc<dyn Retriever>>,
    grader: Option<Arc<dyn Grader>>,
    web_search: Option<Arc<dyn WebSearchTool>>,
    generator: Option<Arc<dyn Generator>>,
    store: Option<Arc<dyn CheckpointStore>>,
    switch: Option<Arc<dyn WebSearchSwitch>>,
    config: EngineConfig,
}

impl ChatEngineBuilder {
    /// Set the document retriever
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the relevance grader
    pub fn grader(mut self, grader: Arc<dyn Grader>) -> Self {
        self.grader = Some(grader);
        self
    }

    /// Set the web-search tool
    pub fn web_search(mut self, web_search: Arc<dyn WebSearchTool>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    /// Set the answer generator
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the checkpoint store
    pub fn store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the web-search kill switch
    pub fn switch(mut self, switch: Arc<dyn WebSearchSwitch>) -> Self {
        self.switch = Some(switch);
        self
    }

    /// Set the engine configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble the engine, wiring each collaborator into its node
    pub fn build(self) -> Result<ChatEngine, EngineBuildError> {
        let retriever = self
            .retriever
            .ok_or(EngineBuildError::MissingCollaborator("retriever"))?;
        let grader = self
            .grader
            .ok_or(EngineBuildError::MissingCollaborator("grader"))?;
        let web_search = self
            .web_search
            .ok_or(EngineBuildError::MissingCollaborator("web search tool"))?;
        let generator = self
            .generator
            .ok_or(EngineBuildError::MissingCollaborator("generator"))?;
        let store = self
            .store
            .ok_or(EngineBuildError::MissingCollaborator("checkpoint store"))?;
        let switch = self
            .switch
            .unwrap_or_else(|| Arc::new(EnvSwitch::default()));

        Ok(ChatEngine {
            retrieve: RetrieveNode::new(retriever),
            grade: GradeDocumentsNode::new(grader),
            web_search: WebSearchNode::new(web_search, self.config.search_top_k),
            chat: ChatNode::new(generator),
            store,
            switch,
            config: self.config,
            locks: Mutex::new(HashMap::new()),
        })
    }
}

/// Drives conversational turns through the fixed workflow
pub struct ChatEngine {
    retrieve: RetrieveNode,
    grade: GradeDocumentsNode,
    web_search: WebSearchNode,
    chat: ChatNode,
    store: Arc<dyn CheckpointStore>,
    switch: Arc<dyn WebSearchSwitch>,
    config: EngineConfig,
    locks: Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>,
}

impl ChatEngine {
    /// Start assembling an engine
    pub fn builder() -> ChatEngineBuilder {
        ChatEngineBuilder::default()
    }

    /// Run one turn to completion.
    ///
    /// A missing `thread_id` starts a fresh thread with a generated id; an
    /// empty one is rejected up front. The turn is bounded by the request's
    /// deadline (or the engine's configured one), measured from here: waiting
    /// on the thread lock counts against it. On timeout the run is abandoned
    /// with [`FlowError::RunTimeout`] and nothing is persisted.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnReply, FlowError> {
        let thread_id = match &request.thread_id {
            Some(raw) => ThreadId::new(raw.clone())?,
            None => ThreadId::generate(),
        };

        let deadline = request.timeout.or(self.config.run_timeout);
        let result = match deadline {
            Some(limit) => {
                match tokio::time::timeout(limit, self.run_locked(&thread_id, &request)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(FlowError::RunTimeout { timeout: limit }),
                }
            }
            None => self.run_locked(&thread_id, &request).await,
        };
        self.release_thread_lock(&thread_id).await;
        let state = result?;

        // The reply is the generation: the answer together with the context
        // and documents the generator actually grounded it in. The steps
        // trace comes from the state, where it accumulates across runs.
        Ok(TurnReply {
            thread_id,
            answer: state.generation.answer,
            context: state.generation.context,
            documents: state.generation.documents,
            steps: state.steps,
        })
    }

    /// Forget a thread entirely; its next turn starts from defaults.
    /// Resetting an unseen thread succeeds quietly.
    pub async fn reset_thread(&self, thread_id: &str) -> Result<(), FlowError> {
        let thread_id = ThreadId::new(thread_id)?;
        {
            let lock = self.thread_lock(&thread_id).await;
            let _guard = lock.lock().await;
            self.store.reset(&thread_id).await?;
        }
        self.release_thread_lock(&thread_id).await;
        info!(thread_id = %thread_id, "thread reset");
        Ok(())
    }

    async fn run_locked(
        &self,
        thread_id: &ThreadId,
        request: &TurnRequest,
    ) -> Result<ConversationState, FlowError> {
        let lock = self.thread_lock(thread_id).await;
        let _guard = lock.lock().await;
        self.execute(thread_id, request).await
    }

    /// Load, overlay, walk the topology, and persist on success
    async fn execute(
        &self,
        thread_id: &ThreadId,
        request: &TurnRequest,
    ) -> Result<ConversationState, FlowError> {
        let mut state = self.store.load_state(thread_id).await?;

        let mut overlay = StateUpdate::empty().with_input(request.input.clone());
        if let Some(name) = &request.name {
            overlay = overlay.with_name(name.clone());
        }
        if let Some(birth_date) = &request.birth_date {
            overlay = overlay.with_birth_date(birth_date.clone());
        }
        state = state.merge(overlay).map_err(|source| FlowError::StateMerge {
            step: "request_overlay",
            source,
        })?;

        // Read once per run; the route holds even if the switch flips mid-flight
        let web_search_enabled = self.switch.web_search_enabled();

        let mut stage = Stage::ENTRY;
        loop {
            debug!(thread_id = %thread_id, %stage, "entering stage");
            let update = self
                .node(stage)
                .run(&state)
                .await
                .map_err(|source| FlowError::stage_failure(stage, state.steps.clone(), source))?;
            state = state.merge(update).map_err(|source| FlowError::StateMerge {
                step: stage.id(),
                source,
            })?;

            match stage.successor() {
                Successor::Stage(next) => stage = next,
                Successor::Route => {
                    stage = route_after_grading(&state, web_search_enabled).stage();
                }
                Successor::End => break,
            }
        }

        let version = self.store.save(thread_id, &state).await?;
        info!(
            thread_id = %thread_id,
            version,
            steps = state.steps.len(),
            "turn completed"
        );

        Ok(state)
    }

    fn node(&self, stage: Stage) -> &dyn FlowNode {
        match stage {
            Stage::Retrieve => &self.retrieve,
            Stage::GradeDocuments => &self.grade,
            Stage::WebSearch => &self.web_search,
            Stage::Chat => &self.chat,
        }
    }

    async fn thread_lock(&self, thread_id: &ThreadId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a thread's lock entry once no run holds it, so the map does not
    /// grow with every generated thread id. New clones of the entry only
    /// happen under the map lock, which this holds, so a strong count of one
    /// means the map is the sole owner.
    async fn release_thread_lock(&self, thread_id: &ThreadId) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(thread_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(thread_id);
            }
        }
    }

    #[cfg(test)]
    async fn thread_lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

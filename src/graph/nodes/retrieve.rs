//! Document retrieval node

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::collab::{CollaboratorError, Retriever};
use crate::graph::nodes::FlowNode;
use crate::graph::topology::Stage;
use crate::state::{ConversationState, StateUpdate};

/// Entry node: fetches candidate documents for the current input.
///
/// The retrieved set replaces whatever documents the previous turn left in
/// the state, so every turn grades a fresh candidate pool. An unreachable
/// index surfaces as an error from the retriever and fails the run.
pub struct RetrieveNode {
    retriever: Arc<dyn Retriever>,
}

impl RetrieveNode {
    /// Create a node backed by the given retriever
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl FlowNode for RetrieveNode {
    fn stage(&self) -> Stage {
        Stage::Retrieve
    }

    async fn run(&self, state: &ConversationState) -> Result<StateUpdate, CollaboratorError> {
        let documents = self.retriever.retrieve(&state.input).await?;
        info!(count = documents.len(), "retrieved documents");

        Ok(StateUpdate::empty()
            .with_documents(documents)
            .with_step(Stage::Retrieve.step_name()))
    }
}

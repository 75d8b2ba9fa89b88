//! Workflow nodes
//!
//! Each node wraps exactly one collaborator, reads the current state, and
//! returns a [`StateUpdate`] describing what changed. Nodes never write the
//! state directly and never talk to the checkpoint store; the engine owns
//! merging and persistence. Every node appends its own step name so the
//! state's trace records the path a run actually took.

use async_trait::async_trait;

use crate::collab::CollaboratorError;
use crate::graph::topology::Stage;
use crate::state::{ConversationState, StateUpdate};

mod chat;
mod grade;
mod retrieve;
mod web_search;

pub use chat::ChatNode;
pub use grade::GradeDocumentsNode;
pub use retrieve::RetrieveNode;
pub use web_search::{WebSearchNode, WEB_SOURCE_KEY, WEB_SOURCE_VALUE};

/// A single stage of the conversation workflow
#[async_trait]
pub trait FlowNode: Send + Sync {
    /// The stage this node implements
    fn stage(&self) -> Stage;

    /// Run the node against a read-only view of the state
    async fn run(&self, state: &ConversationState) -> Result<StateUpdate, CollaboratorError>;
}

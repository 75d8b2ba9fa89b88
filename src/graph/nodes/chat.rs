//! Answer generation node

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::collab::{CollaboratorError, Generator};
use crate::graph::nodes::FlowNode;
use crate::graph::topology::Stage;
use crate::state::{ConversationState, StateUpdate};

/// Terminal node: produces the answer and extends the dialogue.
///
/// The generator sees the input, the full chat history, and whatever
/// documents survived grading (plus the web supplement, when taken). On
/// success the node records the finished generation, refreshes the context
/// snapshot, appends the user/assistant turn to the history, and bumps the
/// loop counter by one.
pub struct ChatNode {
    generator: Arc<dyn Generator>,
}

impl ChatNode {
    /// Create a node backed by the given generator
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl FlowNode for ChatNode {
    fn stage(&self) -> Stage {
        Stage::Chat
    }

    async fn run(&self, state: &ConversationState) -> Result<StateUpdate, CollaboratorError> {
        let generation = self
            .generator
            .generate(&state.input, &state.chat_history, &state.documents)
            .await?;
        info!(
            answer_len = generation.answer.len(),
            documents = generation.documents.len(),
            "generated answer"
        );

        Ok(StateUpdate::empty()
            .with_context(generation.context.clone())
            .with_turn(state.input.clone(), generation.answer.clone())
            .with_generation(generation)
            .with_loop_increment(1)
            .with_step(Stage::Chat.step_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::mock::MockGenerator;
    use crate::state::{ChatMessage, Document};

    #[tokio::test]
    async fn test_chat_extends_history_and_bumps_loop() {
        let node = ChatNode::new(Arc::new(MockGenerator::new()));
        let state = ConversationState {
            input: "what is my number?".into(),
            documents: vec![Document::new("life path guide")],
            chat_history: vec![
                ChatMessage::human("hello"),
                ChatMessage::ai("hi, how can I help?"),
            ],
            loop_step: 1,
            ..ConversationState::default()
        };

        let update = node.run(&state).await.unwrap();
        assert_eq!(update.loop_step, 1);
        assert_eq!(update.steps, vec!["chat_with_history".to_string()]);
        assert_eq!(update.chat_history.len(), 2);
        assert!(update.chat_history[0].is_human());
        assert_eq!(update.chat_history[0].text(), "what is my number?");

        let merged = state.merge(update).unwrap();
        assert_eq!(merged.chat_history.len(), 4);
        assert_eq!(merged.loop_step, 2);
        assert!(!merged.generation.answer.is_empty());
        assert_eq!(merged.context, "life path guide");
    }

    #[tokio::test]
    async fn test_generator_sees_history_and_documents() {
        let node = ChatNode::new(Arc::new(MockGenerator::new()));
        let state = ConversationState {
            input: "question".into(),
            documents: vec![Document::new("a"), Document::new("b")],
            chat_history: vec![ChatMessage::human("earlier")],
            ..ConversationState::default()
        };

        let update = node.run(&state).await.unwrap();

        // The mock embeds its inputs in the answer, proving they were passed through
        let answer = update.generation.as_ref().unwrap().answer.clone();
        assert!(answer.contains("history: 1 messages"));
        assert!(answer.contains("documents: 2"));
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let node = ChatNode::new(Arc::new(MockGenerator::failing()));

        let err = node.run(&ConversationState::default()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::GenerationUnavailable(_)));
    }
}

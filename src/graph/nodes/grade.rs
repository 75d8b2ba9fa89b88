//! Document grading node

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::info;

use crate::collab::{CollaboratorError, Grader};
use crate::graph::nodes::FlowNode;
use crate::graph::topology::Stage;
use crate::state::{ConversationState, Document, StateUpdate, WebSearchVerdict};

/// Filters retrieved documents down to the ones relevant to the input.
///
/// Every document is graded against the current input; irrelevant ones are
/// dropped in place, preserving the order of the survivors. Dropping any
/// document flips the web-search verdict to [`WebSearchVerdict::Yes`] so the
/// router can compensate for the thinned context. A grader failure on any
/// document fails the whole stage.
pub struct GradeDocumentsNode {
    grader: Arc<dyn Grader>,
}

impl GradeDocumentsNode {
    /// Create a node backed by the given grader
    pub fn new(grader: Arc<dyn Grader>) -> Self {
        Self { grader }
    }
}

#[async_trait]
impl FlowNode for GradeDocumentsNode {
    fn stage(&self) -> Stage {
        Stage::GradeDocuments
    }

    async fn run(&self, state: &ConversationState) -> Result<StateUpdate, CollaboratorError> {
        let grades = try_join_all(
            state
                .documents
                .iter()
                .map(|doc| self.grader.grade(&state.input, &doc.content)),
        )
        .await?;

        let total = state.documents.len();
        let filtered: Vec<Document> = state
            .documents
            .iter()
            .zip(grades)
            .filter_map(|(doc, grade)| grade.is_relevant().then(|| doc.clone()))
            .collect();

        let verdict = if filtered.len() < total {
            WebSearchVerdict::Yes
        } else {
            WebSearchVerdict::No
        };
        info!(
            kept = filtered.len(),
            dropped = total - filtered.len(),
            verdict = ?verdict,
            "graded documents"
        );

        Ok(StateUpdate::empty()
            .with_documents(filtered)
            .with_web_search(verdict)
            .with_step(Stage::GradeDocuments.step_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::mock::MockGrader;
    use crate::collab::Relevance;

    fn state_with_docs(contents: &[&str]) -> ConversationState {
        ConversationState {
            input: "tell me about master numbers".into(),
            documents: contents.iter().copied().map(Document::new).collect(),
            ..ConversationState::default()
        }
    }

    #[tokio::test]
    async fn test_all_relevant_keeps_everything_and_skips_websearch() {
        let node = GradeDocumentsNode::new(Arc::new(MockGrader::all_relevant()));
        let state = state_with_docs(&["master number 11", "master number 22"]);

        let update = node.run(&state).await.unwrap();

        assert_eq!(update.documents.as_ref().unwrap().len(), 2);
        assert_eq!(update.web_search, Some(WebSearchVerdict::No));
        assert_eq!(update.steps, vec!["grade_documents".to_string()]);
    }

    #[tokio::test]
    async fn test_dropping_a_document_requests_websearch() {
        let node = GradeDocumentsNode::new(Arc::new(
            MockGrader::all_relevant().with_verdict("recipe for pancakes", Relevance::Irrelevant),
        ));
        let state = state_with_docs(&["master number 11", "recipe for pancakes"]);

        let update = node.run(&state).await.unwrap();

        let kept = update.documents.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "master number 11");
        assert_eq!(update.web_search, Some(WebSearchVerdict::Yes));
    }

    #[tokio::test]
    async fn test_survivor_order_is_preserved() {
        let node = GradeDocumentsNode::new(Arc::new(
            MockGrader::all_relevant().with_verdict("b", Relevance::Irrelevant),
        ));
        let state = state_with_docs(&["a", "b", "c", "d"]);

        let update = node.run(&state).await.unwrap();
        let contents: Vec<&str> = update
            .documents
            .as_ref()
            .unwrap()
            .iter()
            .map(|d| d.content.as_str())
            .collect();
        assert_eq!(contents, vec!["a", "c", "d"]);
    }

    #[tokio::test]
    async fn test_zero_documents_grades_clean() {
        let node = GradeDocumentsNode::new(Arc::new(MockGrader::all_relevant()));
        let state = state_with_docs(&[]);

        let update = node.run(&state).await.unwrap();

        assert_eq!(update.documents, Some(vec![]));
        assert_eq!(update.web_search, Some(WebSearchVerdict::No));
    }

    #[tokio::test]
    async fn test_all_irrelevant_empties_the_pool() {
        let node = GradeDocumentsNode::new(Arc::new(MockGrader::all_irrelevant()));
        let state = state_with_docs(&["x", "y"]);

        let update = node.run(&state).await.unwrap();

        assert_eq!(update.documents, Some(vec![]));
        assert_eq!(update.web_search, Some(WebSearchVerdict::Yes));
    }

    #[tokio::test]
    async fn test_grader_failure_fails_the_stage() {
        let node = GradeDocumentsNode::new(Arc::new(
            MockGrader::all_relevant().failing_on("poison pill"),
        ));
        let state = state_with_docs(&["fine", "poison pill"]);

        let err = node.run(&state).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::GraderUnavailable(_)));
    }
}

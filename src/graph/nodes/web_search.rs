//! Web-search fallback node

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::collab::{CollaboratorError, WebSearchTool};
use crate::graph::nodes::FlowNode;
use crate::graph::topology::Stage;
use crate::state::{ConversationState, Document, StateUpdate};

/// Metadata key marking a document as web-sourced
pub const WEB_SOURCE_KEY: &str = "source";

/// Metadata value for documents produced by this node
pub const WEB_SOURCE_VALUE: &str = "web_search";

/// Supplements a thinned document pool with live web results.
///
/// All hits for the current input are folded into a single synthetic
/// document, tagged `source = web_search`, and appended after the graded
/// survivors. Downstream consumers can tell web content from index content
/// by the tag.
pub struct WebSearchNode {
    search: Arc<dyn WebSearchTool>,
    top_k: usize,
}

impl WebSearchNode {
    /// Create a node backed by the given search tool, requesting at most
    /// `top_k` hits per query
    pub fn new(search: Arc<dyn WebSearchTool>, top_k: usize) -> Self {
        Self { search, top_k }
    }
}

#[async_trait]
impl FlowNode for WebSearchNode {
    fn stage(&self) -> Stage {
        Stage::WebSearch
    }

    async fn run(&self, state: &ConversationState) -> Result<StateUpdate, CollaboratorError> {
        let hits = self.search.search(&state.input, self.top_k).await?;
        info!(hits = hits.len(), "web search completed");

        let joined = hits
            .iter()
            .map(|hit| hit.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let web_doc = Document::new(joined).with_metadata(WEB_SOURCE_KEY, WEB_SOURCE_VALUE);

        let mut documents = state.documents.clone();
        documents.push(web_doc);

        Ok(StateUpdate::empty()
            .with_documents(documents)
            .with_step(Stage::WebSearch.step_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::mock::MockWebSearch;
    use crate::collab::SearchHit;

    #[tokio::test]
    async fn test_hits_fold_into_one_tagged_document() {
        let node = WebSearchNode::new(
            Arc::new(MockWebSearch::returning(vec![
                SearchHit::new("first hit"),
                SearchHit::new("second hit"),
            ])),
            3,
        );
        let state = ConversationState {
            input: "latest numerology news".into(),
            documents: vec![Document::new("graded survivor")],
            ..ConversationState::default()
        };

        let update = node.run(&state).await.unwrap();

        let documents = update.documents.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].content, "graded survivor");
        assert_eq!(documents[1].content, "first hit\nsecond hit");
        assert_eq!(
            documents[1].metadata.get(WEB_SOURCE_KEY).map(String::as_str),
            Some(WEB_SOURCE_VALUE)
        );
        assert_eq!(update.steps, vec!["web_search".to_string()]);
    }

    #[tokio::test]
    async fn test_top_k_caps_the_request() {
        let search = Arc::new(MockWebSearch::returning(vec![
            SearchHit::new("a"),
            SearchHit::new("b"),
            SearchHit::new("c"),
        ]));
        let node = WebSearchNode::new(search.clone(), 2);

        let update = node.run(&ConversationState::default()).await.unwrap();

        let documents = update.documents.unwrap();
        assert_eq!(documents[0].content, "a\nb");
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_hits_still_appends_a_tagged_document() {
        let node = WebSearchNode::new(Arc::new(MockWebSearch::returning(vec![])), 3);

        let update = node.run(&ConversationState::default()).await.unwrap();

        let documents = update.documents.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content, "");
        assert!(documents[0].metadata.contains_key(WEB_SOURCE_KEY));
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let node = WebSearchNode::new(Arc::new(MockWebSearch::failing()), 3);

        let err = node.run(&ConversationState::default()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::SearchUnavailable(_)));
    }
}

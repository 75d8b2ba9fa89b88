//! Collaborator contracts
//!
//! The engine performs no retrieval, grading, searching, or generation of its
//! own; each stage delegates to exactly one of the traits below. Injecting
//! collaborators at construction keeps the workflow deterministic under test
//! and lets deployments swap providers without touching the graph.

use async_trait::async_trait;
use thiserror::Error;

use crate::state::{ChatMessage, Document, Generation};

pub mod mock;
pub mod tavily;

/// Failure of an external collaborator call
///
/// Variants mirror the four collaborator roles so the engine can map a
/// failure to the stage that raised it without inspecting message text.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The retriever or its backing index could not serve the query
    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    /// The grader could not judge a document
    #[error("grader unavailable: {0}")]
    GraderUnavailable(String),

    /// The web search provider could not serve the query
    #[error("web search unavailable: {0}")]
    SearchUnavailable(String),

    /// The generator could not produce an answer
    #[error("generator unavailable: {0}")]
    GenerationUnavailable(String),
}

/// Binary relevance judgment for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    /// The document helps answer the query
    Relevant,
    /// The document does not help answer the query
    Irrelevant,
}

impl Relevance {
    /// Convenience for filtering graded documents
    pub fn is_relevant(self) -> bool {
        matches!(self, Self::Relevant)
    }
}

/// One result snippet from a web search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Snippet text
    pub content: String,
}

impl SearchHit {
    /// Create a hit from snippet text
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Fetches candidate documents for a query
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return the documents the backing index considers closest to `query`.
    /// An unreachable index is an error, not an empty result.
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, CollaboratorError>;
}

/// Judges whether one document is relevant to a query
#[async_trait]
pub trait Grader: Send + Sync {
    /// Grade a single document's content against the query
    async fn grade(&self, query: &str, document: &str) -> Result<Relevance, CollaboratorError>;
}

/// Searches the public web
#[async_trait]
pub trait WebSearchTool: Send + Sync {
    /// Return up to `top_k` result snippets for `query`
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, CollaboratorError>;
}

/// History-aware answer generation
///
/// Implementations may reformulate `query` against `history` before
/// answering; `documents` is the working set the workflow accumulated for
/// this turn.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the turn's answer
    async fn generate(
        &self,
        query: &str,
        history: &[ChatMessage],
        documents: &[Document],
    ) -> Result<Generation, CollaboratorError>;
}

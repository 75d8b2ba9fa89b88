//! Deterministic in-memory collaborators
//!
//! Stand-ins for the real retriever, grader, search provider, and generator.
//! They are deterministic and run without network access, which makes them
//! the collaborators of choice for integration tests and the demo binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::state::{ChatMessage, Document, Generation};

use super::{CollaboratorError, Generator, Grader, Relevance, Retriever, SearchHit, WebSearchTool};

/// Retriever returning a fixed document list for every query
pub struct MockRetriever {
    documents: Vec<Document>,
    fail: bool,
}

impl MockRetriever {
    /// Always return the given documents
    pub fn returning(documents: Vec<Document>) -> Self {
        Self {
            documents,
            fail: false,
        }
    }

    /// Fail every call, as an unreachable index would
    pub fn failing() -> Self {
        Self {
            documents: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<Document>, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::RetrieverUnavailable(
                "mock retriever configured to fail".to_string(),
            ));
        }
        Ok(self.documents.clone())
    }
}

/// Grader with scripted verdicts keyed on document content
///
/// Documents without a scripted verdict get the default. `failing_on` makes
/// grading error for one specific document, which exercises the abort path
/// without touching the others.
pub struct MockGrader {
    verdicts: HashMap<String, Relevance>,
    default: Relevance,
    fail_on: Option<String>,
}

impl MockGrader {
    /// Grade every document relevant
    pub fn all_relevant() -> Self {
        Self {
            verdicts: HashMap::new(),
            default: Relevance::Relevant,
            fail_on: None,
        }
    }

    /// Grade every document irrelevant
    pub fn all_irrelevant() -> Self {
        Self {
            verdicts: HashMap::new(),
            default: Relevance::Irrelevant,
            fail_on: None,
        }
    }

    /// Script the verdict for one document's content
    pub fn with_verdict(mut self, content: impl Into<String>, verdict: Relevance) -> Self {
        self.verdicts.insert(content.into(), verdict);
        self
    }

    /// Error when asked to grade the document with this content
    pub fn failing_on(mut self, content: impl Into<String>) -> Self {
        self.fail_on = Some(content.into());
        self
    }
}

#[async_trait]
impl Grader for MockGrader {
    async fn grade(&self, _query: &str, document: &str) -> Result<Relevance, CollaboratorError> {
        if self.fail_on.as_deref() == Some(document) {
            return Err(CollaboratorError::GraderUnavailable(
                "mock grader configured to fail".to_string(),
            ));
        }
        Ok(self.verdicts.get(document).copied().unwrap_or(self.default))
    }
}

/// Search tool returning fixed hits and counting calls
pub struct MockWebSearch {
    hits: Vec<SearchHit>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockWebSearch {
    /// Always return the given hits
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every call
    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `search` was invoked
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchTool for MockWebSearch {
    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<SearchHit>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CollaboratorError::SearchUnavailable(
                "mock search configured to fail".to_string(),
            ));
        }
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

/// Generator producing a deterministic answer that echoes its inputs
///
/// The answer embeds the query, the history length, and the document count,
/// so tests can assert that history and documents actually reached the
/// generator.
pub struct MockGenerator {
    fail: bool,
}

impl MockGenerator {
    /// Create a generator that always succeeds
    pub fn new() -> Self {
        Self { fail: false }
    }

    /// Fail every call
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        query: &str,
        history: &[ChatMessage],
        documents: &[Document],
    ) -> Result<Generation, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::GenerationUnavailable(
                "mock generator configured to fail".to_string(),
            ));
        }

        let context = documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let answer = format!(
            "answer to {:?} [history: {} messages, documents: {}]",
            query,
            history.len(),
            documents.len()
        );

        Ok(Generation::new(answer)
            .with_context(context)
            .with_documents(documents.to_vec()))
    }
}

//! Conversation state and merge semantics
//!
//! The workflow threads a single [`ConversationState`] value through its
//! stages. Stages never mutate state directly; each one returns a
//! [`StateUpdate`] and the engine folds it in with [`ConversationState::merge`].
//! Every field has a fixed merge policy:
//!
//! - scalar fields and `documents` are overwritten when the update carries
//!   a replacement
//! - `steps` and `chat_history` are append-only
//! - `loop_step` accumulates a non-negative delta
//!
//! A thread's checkpoint is just its last merged state, so the append-only
//! fields grow across runs of the same thread.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection of a malformed [`StateUpdate`] during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The loop counter only moves forward; a negative delta is a bug in
    /// whichever stage produced the update
    #[error("loop step delta must be non-negative, got {0}")]
    NegativeLoopDelta(i64),
}

/// One message in a conversation, tagged by author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "text", rename_all = "snake_case")]
pub enum ChatMessage {
    /// Written by the end user
    Human(String),
    /// Produced by the assistant
    Ai(String),
}

impl ChatMessage {
    /// Create a user message
    pub fn human(text: impl Into<String>) -> Self {
        Self::Human(text.into())
    }

    /// Create an assistant message
    pub fn ai(text: impl Into<String>) -> Self {
        Self::Ai(text.into())
    }

    /// The message text, regardless of author
    pub fn text(&self) -> &str {
        match self {
            Self::Human(text) | Self::Ai(text) => text,
        }
    }

    /// Check whether the message came from the user
    pub fn is_human(&self) -> bool {
        matches!(self, Self::Human(_))
    }
}

/// A unit of retrieved or synthesized context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Raw text content
    pub content: String,
    /// Provenance attributes (source, page, chunk id, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with no metadata
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Verdict of the grading stage: does the retrieved context need a
/// web-search supplement?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebSearchVerdict {
    /// At least one retrieved document was graded irrelevant
    Yes,
    /// Every retrieved document held up
    #[default]
    No,
}

impl WebSearchVerdict {
    /// Check whether grading asked for the fallback
    pub fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Structured output of the chat stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Final answer text
    pub answer: String,
    /// Supporting context the generator worked from
    pub context: String,
    /// Documents backing the answer
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl Generation {
    /// Create a generation carrying just an answer
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Default::default()
        }
    }

    /// Set the supporting context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the backing documents
    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }
}

/// The complete per-thread conversation state
///
/// A fresh thread starts from `Default::default()`; every completed run
/// leaves the merged result behind as the thread's checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    /// Latest user input, overwritten at the start of every run
    pub input: String,

    /// Caller-declared user name
    pub name: String,

    /// Caller-declared birth date, kept as free-form text
    pub birth_date: String,

    /// Output of the most recent chat stage
    pub generation: Generation,

    /// Supporting context from the most recent chat stage
    pub context: String,

    /// Grading verdict that drives the web-search branch
    pub web_search: WebSearchVerdict,

    /// Working document set; whichever stage wrote it last owns it
    pub documents: Vec<Document>,

    /// Stage trace in execution order, accumulated across runs
    pub steps: Vec<String>,

    /// Count of completed chat stages across the thread's lifetime
    pub loop_step: u64,

    /// Full dialogue so far, append-only
    pub chat_history: Vec<ChatMessage>,
}

impl ConversationState {
    /// Merge a stage's partial update, applying each field's policy
    ///
    /// The base state is left untouched; a fresh state is returned. The only
    /// failure mode is a malformed update (negative loop delta), so a merge
    /// of any well-formed update always succeeds.
    pub fn merge(&self, update: StateUpdate) -> Result<Self, MergeError> {
        if update.loop_step < 0 {
            return Err(MergeError::NegativeLoopDelta(update.loop_step));
        }

        let mut next = self.clone();

        if let Some(input) = update.input {
            next.input = input;
        }
        if let Some(name) = update.name {
            next.name = name;
        }
        if let Some(birth_date) = update.birth_date {
            next.birth_date = birth_date;
        }
        if let Some(generation) = update.generation {
            next.generation = generation;
        }
        if let Some(context) = update.context {
            next.context = context;
        }
        if let Some(web_search) = update.web_search {
            next.web_search = web_search;
        }
        if let Some(documents) = update.documents {
            next.documents = documents;
        }

        next.steps.extend(update.steps);
        next.loop_step = next.loop_step.saturating_add(update.loop_step as u64);
        next.chat_history.extend(update.chat_history);

        Ok(next)
    }

    /// Number of completed user/assistant exchanges in the history
    pub fn turn_count(&self) -> usize {
        self.chat_history.iter().filter(|m| m.is_human()).count()
    }

    /// The assistant's most recent reply, if any
    pub fn last_answer(&self) -> Option<&str> {
        self.chat_history
            .iter()
            .rev()
            .find(|m| !m.is_human())
            .map(ChatMessage::text)
    }
}

/// A partial update produced by one stage
///
/// `None` and empty fields leave the base state untouched. Field docs state
/// the merge policy applied by [`ConversationState::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Overwrites `input`
    pub input: Option<String>,

    /// Overwrites `name`
    pub name: Option<String>,

    /// Overwrites `birth_date`
    pub birth_date: Option<String>,

    /// Overwrites `generation`
    pub generation: Option<Generation>,

    /// Overwrites `context`
    pub context: Option<String>,

    /// Overwrites `web_search`
    pub web_search: Option<WebSearchVerdict>,

    /// Overwrites `documents` with the full replacement list
    pub documents: Option<Vec<Document>>,

    /// Appended to `steps`; stages put only their own step name here
    pub steps: Vec<String>,

    /// Added to `loop_step`; must be non-negative
    pub loop_step: i64,

    /// Appended to `chat_history`
    pub chat_history: Vec<ChatMessage>,
}

impl StateUpdate {
    /// An update that changes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check whether merging this update would change nothing
    pub fn is_empty(&self) -> bool {
        self.input.is_none()
            && self.name.is_none()
            && self.birth_date.is_none()
            && self.generation.is_none()
            && self.context.is_none()
            && self.web_search.is_none()
            && self.documents.is_none()
            && self.steps.is_empty()
            && self.loop_step == 0
            && self.chat_history.is_empty()
    }

    /// Set the user input
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Set the user name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the birth date
    pub fn with_birth_date(mut self, birth_date: impl Into<String>) -> Self {
        self.birth_date = Some(birth_date.into());
        self
    }

    /// Set the chat output
    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Set the supporting context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the grading verdict
    pub fn with_web_search(mut self, verdict: WebSearchVerdict) -> Self {
        self.web_search = Some(verdict);
        self
    }

    /// Replace the working document set
    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Record a completed step
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Append one completed user/assistant exchange to the history
    pub fn with_turn(mut self, user: impl Into<String>, assistant: impl Into<String>) -> Self {
        self.chat_history.push(ChatMessage::human(user));
        self.chat_history.push(ChatMessage::ai(assistant));
        self
    }

    /// Add to the loop counter
    pub fn with_loop_increment(mut self, delta: i64) -> Self {
        self.loop_step += delta;
        self
    }
}

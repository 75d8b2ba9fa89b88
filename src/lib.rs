//! Chatflow: a checkpointed retrieval-augmented conversation workflow.
//!
//! Each user turn runs through a small fixed graph. Documents are retrieved
//! for the input, graded for relevance, optionally topped up from the web
//! when grading thinned the pool, and handed to a generator that answers in
//! the context of the whole conversation:
//!
//! ```text
//! START -> retrieve -> grade_documents -> {router} -> websearch -> chat -> END
//!                                              │                    ▲
//!                                              └────────────────────┘
//! ```
//!
//! Conversations are addressed by thread id. The engine loads the thread's
//! checkpoint before each turn and saves it after, so history, step traces,
//! and turn counters accumulate across turns and survive process restarts
//! when a durable [`checkpoint`] store is used. A failed turn saves nothing.
//!
//! Collaborators (retriever, grader, web search, generator) are trait
//! objects injected at build time, which keeps the workflow logic testable
//! without any live backend.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use chatflow::{ChatEngine, MemoryCheckpointStore, TurnRequest};
//!
//! let engine = ChatEngine::builder()
//!     .retriever(my_retriever)
//!     .grader(my_grader)
//!     .web_search(Arc::new(chatflow::TavilySearch::from_env()?))
//!     .generator(my_generator)
//!     .store(Arc::new(MemoryCheckpointStore::new()))
//!     .build()?;
//!
//! let reply = engine
//!     .run_turn(TurnRequest::new("Hello, what can you do?"))
//!     .await?;
//! println!("{}", reply.answer);
//! ```

pub mod checkpoint;
pub mod collab;
pub mod config;
pub mod error;
pub mod graph;
pub mod state;

// Engine surface
pub use graph::{ChatEngine, ChatEngineBuilder, EngineBuildError, TurnReply, TurnRequest};

// State model
pub use state::{
    ChatMessage, ConversationState, Document, Generation, MergeError, StateUpdate,
    WebSearchVerdict,
};

// Collaborator seams
pub use collab::{
    CollaboratorError, Generator, Grader, Relevance, Retriever, SearchHit, WebSearchTool,
};
pub use collab::tavily::{TavilyError, TavilySearch};

// Checkpointing
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, InvalidThreadIdError,
    MemoryCheckpointStore, ThreadId,
};
#[cfg(feature = "checkpointer-sqlite")]
pub use checkpoint::SqliteCheckpointStore;

// Configuration
pub use config::{EngineConfig, EnvSwitch, FixedSwitch, WebSearchSwitch, WEB_SEARCH_ENV_VAR};

// Errors
pub use error::FlowError;

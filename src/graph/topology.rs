//! Fixed workflow topology
//!
//! The conversation graph is small and closed:
//!
//! ```text
//! START -> retrieve -> grade_documents -> {router} -> websearch -> chat -> END
//!                                              │                    ▲
//!                                              └────────────────────┘
//! ```
//!
//! Stages, successors, and route targets are exhaustive enums with `match`
//! mappings. An unmapped edge or route target is a compile error, so the
//! topology cannot drift into a state the engine discovers only at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stages of the conversation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Fetch candidate documents for the input
    Retrieve,
    /// Filter the documents down to the relevant ones
    GradeDocuments,
    /// Supplement weak context with web results
    WebSearch,
    /// Produce the answer and extend the dialogue
    Chat,
}

impl Stage {
    /// First stage of every run
    pub const ENTRY: Stage = Stage::Retrieve;

    /// Node identifier used in the topology and in logs
    pub fn id(self) -> &'static str {
        match self {
            Stage::Retrieve => "retrieve",
            Stage::GradeDocuments => "grade_documents",
            Stage::WebSearch => "websearch",
            Stage::Chat => "chat",
        }
    }

    /// Entry recorded in the state's step trace when the stage completes.
    ///
    /// Trace names are their own namespace: the `retrieve` node logs
    /// `retrieve_documents` and the `chat` node logs `chat_with_history`.
    pub fn step_name(self) -> &'static str {
        match self {
            Stage::Retrieve => "retrieve_documents",
            Stage::GradeDocuments => "grade_documents",
            Stage::WebSearch => "web_search",
            Stage::Chat => "chat_with_history",
        }
    }

    /// Where execution goes once this stage completes
    pub fn successor(self) -> Successor {
        match self {
            Stage::Retrieve => Successor::Stage(Stage::GradeDocuments),
            Stage::GradeDocuments => Successor::Route,
            Stage::WebSearch => Successor::Stage(Stage::Chat),
            Stage::Chat => Successor::End,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Successor of a stage in the fixed topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Successor {
    /// Continue to the given stage unconditionally
    Stage(Stage),
    /// Consult the conditional router
    Route,
    /// The run is complete
    End,
}

/// Targets the router may pick after grading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Take the web-search fallback before chatting
    WebSearch,
    /// Go straight to the chat stage
    Generate,
}

impl RouteTarget {
    /// The stage each target maps to
    pub fn stage(self) -> Stage {
        match self {
            RouteTarget::WebSearch => Stage::WebSearch,
            RouteTarget::Generate => Stage::Chat,
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::WebSearch => f.write_str("websearch"),
            RouteTarget::Generate => f.write_str("generate"),
        }
    }
}

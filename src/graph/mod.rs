//! The conversation workflow graph
//!
//! Submodules split the graph into its moving parts: [`topology`] fixes the
//! shape, [`nodes`] holds the per-stage logic, [`router`] makes the one
//! conditional decision, and [`engine`] drives runs end to end.

pub mod engine;
pub mod nodes;
pub mod router;
pub mod topology;

pub use engine::{ChatEngine, ChatEngineBuilder, EngineBuildError, TurnReply, TurnRequest};
pub use nodes::{
    ChatNode, FlowNode, GradeDocumentsNode, RetrieveNode, WebSearchNode, WEB_SOURCE_KEY,
    WEB_SOURCE_VALUE,
};
pub use router::route_after_grading;
pub use topology::{RouteTarget, Stage, Successor};

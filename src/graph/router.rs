//! Conditional routing after document grading

use tracing::debug;

use crate::graph::topology::RouteTarget;
use crate::state::{ConversationState, WebSearchVerdict};

/// Pick the next stage once grading has run.
///
/// The decision is a pure function of the graded state and the kill switch:
/// the web-search fallback is taken only when the grader asked for it and the
/// switch has not disabled it. Everything else goes straight to generation.
pub fn route_after_grading(state: &ConversationState, web_search_enabled: bool) -> RouteTarget {
    let target = match state.web_search {
        WebSearchVerdict::Yes if web_search_enabled => RouteTarget::WebSearch,
        WebSearchVerdict::Yes | WebSearchVerdict::No => RouteTarget::Generate,
    };
    debug!(
        verdict = ?state.web_search,
        web_search_enabled,
        %target,
        "routing after grading"
    );
    target
}

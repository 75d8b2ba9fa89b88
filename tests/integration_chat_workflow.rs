//! Integration tests for the end-to-end conversation workflow
//!
//! These tests drive full turns through a real engine and verify:
//! - First contact on a fresh thread (direct retrieve/grade/chat path)
//! - Returning users accumulating history, steps, and turn counters
//! - The web-search fallback and its kill switch
//! - Failure semantics: failed turns persist nothing
//! - Run deadlines
//! - Per-thread serialization of concurrent turns

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatflow::collab::mock::{MockGenerator, MockGrader, MockRetriever, MockWebSearch};
use chatflow::{
    ChatEngine, ChatMessage, CheckpointStore, CollaboratorError, Document, EngineConfig,
    FixedSwitch, FlowError, Generation, Generator, MemoryCheckpointStore, Relevance, SearchHit,
    ThreadId, TurnRequest,
};

fn corpus() -> Vec<Document> {
    vec![
        Document::new("Life path numbers are derived from the birth date."),
        Document::new("Master numbers 11, 22, and 33 are not reduced."),
    ]
}

fn thread(id: &str) -> ThreadId {
    ThreadId::new(id).expect("valid thread id")
}

// =============================================================================
// Scenario: First Contact
// =============================================================================

/// Test that a fresh thread runs the direct path and persists one checkpoint
#[tokio::test]
async fn test_first_turn_takes_direct_path_and_checkpoints() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(MockGrader::all_relevant()))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(MockGenerator::new()))
        .store(store.clone())
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");

    let reply = engine
        .run_turn(TurnRequest::new("Hello, what can you do?").with_thread_id("first-contact"))
        .await
        .expect("Turn failed");

    assert_eq!(
        reply.steps,
        vec!["retrieve_documents", "grade_documents", "chat_with_history"],
        "direct path should skip web search"
    );
    assert!(!reply.answer.is_empty());
    assert_eq!(reply.documents.len(), 2);

    let checkpoint = store
        .load(&thread("first-contact"))
        .await
        .expect("Load failed")
        .expect("Checkpoint should exist after a successful turn");
    assert_eq!(checkpoint.version, 1);
    assert_eq!(checkpoint.state.loop_step, 1);
    assert_eq!(checkpoint.state.turn_count(), 1);
}

// =============================================================================
// Scenario: Returning User
// =============================================================================

/// Test that a second turn on the same thread sees the first turn's history
#[tokio::test]
async fn test_returning_user_accumulates_history_and_steps() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(MockGrader::all_relevant()))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(MockGenerator::new()))
        .store(store.clone())
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");

    let first = engine
        .run_turn(
            TurnRequest::new("Hello! My name is JOHN.")
                .with_thread_id("returning")
                .with_name("JOHN"),
        )
        .await
        .expect("First turn failed");
    let second = engine
        .run_turn(TurnRequest::new("What's my name?").with_thread_id("returning"))
        .await
        .expect("Second turn failed");

    assert_eq!(first.steps.len(), 3);
    assert_eq!(second.steps.len(), 6, "step trace accumulates across turns");

    // The mock generator reports how much history it was handed
    assert!(first.answer.contains("history: 0 messages"));
    assert!(second.answer.contains("history: 2 messages"));

    let checkpoint = store
        .load(&thread("returning"))
        .await
        .expect("Load failed")
        .expect("Checkpoint should exist");
    assert_eq!(checkpoint.version, 2);
    assert_eq!(checkpoint.state.loop_step, 2);
    assert_eq!(checkpoint.state.chat_history.len(), 4);
    assert_eq!(checkpoint.state.name, "JOHN", "name overlay persists");
    assert!(matches!(
        checkpoint.state.chat_history[0],
        ChatMessage::Human(_)
    ));
}

/// Test that omitting the thread id starts an independent fresh thread
#[tokio::test]
async fn test_fresh_threads_do_not_share_state() {
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(MockGrader::all_relevant()))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(MockGenerator::new()))
        .store(Arc::new(MemoryCheckpointStore::new()))
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");

    let first = engine
        .run_turn(TurnRequest::new("hi"))
        .await
        .expect("First turn failed");
    let second = engine
        .run_turn(TurnRequest::new("hi again"))
        .await
        .expect("Second turn failed");

    assert_ne!(first.thread_id, second.thread_id);
    assert!(second.answer.contains("history: 0 messages"));
}

// =============================================================================
// Scenario: Weak Retrieval
// =============================================================================

/// Test that dropped documents trigger the web-search fallback
#[tokio::test]
async fn test_weak_retrieval_falls_back_to_web_search() {
    // One real document and one distractor the grader will reject
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(vec![
            Document::new("Life path numbers are derived from the birth date."),
            Document::new("The cafeteria menu changes on Mondays."),
        ])))
        .grader(Arc::new(MockGrader::all_relevant().with_verdict(
            "The cafeteria menu changes on Mondays.",
            Relevance::Irrelevant,
        )))
        .web_search(Arc::new(MockWebSearch::returning(vec![
            SearchHit::new("Numerology hit one"),
            SearchHit::new("Numerology hit two"),
        ])))
        .generator(Arc::new(MockGenerator::new()))
        .store(Arc::new(MemoryCheckpointStore::new()))
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");

    let reply = engine
        .run_turn(TurnRequest::new("Tell me something new").with_thread_id("weak"))
        .await
        .expect("Turn failed");

    assert_eq!(
        reply.steps,
        vec![
            "retrieve_documents",
            "grade_documents",
            "web_search",
            "chat_with_history"
        ]
    );

    // Survivor first, then the single folded web document
    assert_eq!(reply.documents.len(), 2);
    let web_doc = reply.documents.last().expect("web document");
    assert_eq!(web_doc.content, "Numerology hit one\nNumerology hit two");
    assert_eq!(
        web_doc.metadata.get("source").map(String::as_str),
        Some("web_search")
    );
}

/// Test that the kill switch keeps weak retrieval on the direct path
#[tokio::test]
async fn test_kill_switch_suppresses_web_search() {
    let search = Arc::new(MockWebSearch::returning(vec![SearchHit::new("unused")]));
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(MockGrader::all_irrelevant()))
        .web_search(search.clone())
        .generator(Arc::new(MockGenerator::new()))
        .store(Arc::new(MemoryCheckpointStore::new()))
        .switch(Arc::new(FixedSwitch(false)))
        .build()
        .expect("Failed to build engine");

    let reply = engine
        .run_turn(TurnRequest::new("Anything fresh?").with_thread_id("switched-off"))
        .await
        .expect("Turn failed");

    assert_eq!(
        reply.steps,
        vec!["retrieve_documents", "grade_documents", "chat_with_history"]
    );
    assert_eq!(search.call_count(), 0, "search tool must never be called");
    assert!(
        reply.documents.is_empty(),
        "all documents were graded out and nothing replaced them"
    );
}

// =============================================================================
// Scenario: Collaborator Failure
// =============================================================================

/// Test that a retrieval failure is fatal and persists nothing
#[tokio::test]
async fn test_retrieval_failure_is_fatal() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::failing()))
        .grader(Arc::new(MockGrader::all_relevant()))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(MockGenerator::new()))
        .store(store.clone())
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");

    let err = engine
        .run_turn(TurnRequest::new("hello?").with_thread_id("down-index"))
        .await
        .expect_err("Turn should fail");

    match &err {
        FlowError::RetrievalFailure { steps, .. } => {
            assert!(steps.is_empty(), "nothing completed before retrieval");
        }
        other => panic!("Expected RetrievalFailure, got {other:?}"),
    }
    assert!(store
        .load(&thread("down-index"))
        .await
        .expect("Load failed")
        .is_none());
}

/// Test that a grading failure reports the steps that did complete
#[tokio::test]
async fn test_grading_failure_reports_completed_steps() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(
            MockGrader::all_relevant()
                .failing_on("Master numbers 11, 22, and 33 are not reduced."),
        ))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(MockGenerator::new()))
        .store(store.clone())
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");

    let err = engine
        .run_turn(TurnRequest::new("grade this").with_thread_id("bad-grader"))
        .await
        .expect_err("Turn should fail");

    match &err {
        FlowError::GradingFailure { steps, .. } => {
            assert_eq!(steps, &vec!["retrieve_documents".to_string()]);
        }
        other => panic!("Expected GradingFailure, got {other:?}"),
    }
    assert!(store
        .load(&thread("bad-grader"))
        .await
        .expect("Load failed")
        .is_none());
}

/// Test that a failed turn leaves the previous checkpoint untouched
#[tokio::test]
async fn test_failed_turn_preserves_previous_checkpoint() {
    let store: Arc<MemoryCheckpointStore> = Arc::new(MemoryCheckpointStore::new());

    let good = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(MockGrader::all_relevant()))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(MockGenerator::new()))
        .store(store.clone())
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");
    let broken = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(MockGrader::all_relevant()))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(MockGenerator::failing()))
        .store(store.clone())
        .switch(Arc::new(FixedSwitch(true)))
        .build()
        .expect("Failed to build engine");

    good.run_turn(TurnRequest::new("first").with_thread_id("flaky"))
        .await
        .expect("First turn failed");
    let err = broken
        .run_turn(TurnRequest::new("second").with_thread_id("flaky"))
        .await
        .expect_err("Second turn should fail");
    assert!(matches!(err, FlowError::GenerationFailure { .. }));

    // The thread still holds exactly the first turn's state
    let checkpoint = store
        .load(&thread("flaky"))
        .await
        .expect("Load failed")
        .expect("First checkpoint should survive");
    assert_eq!(checkpoint.version, 1);
    assert_eq!(checkpoint.state.loop_step, 1);
    assert_eq!(checkpoint.state.input, "first");
}

// =============================================================================
// Scenario: Deadlines
// =============================================================================

struct StalledGenerator;

#[async_trait]
impl Generator for StalledGenerator {
    async fn generate(
        &self,
        _query: &str,
        _history: &[ChatMessage],
        _documents: &[Document],
    ) -> Result<Generation, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(Generation::new("unreachable"))
    }
}

/// Test that the configured run timeout abandons a stalled turn
#[tokio::test]
async fn test_configured_timeout_abandons_stalled_turn() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = ChatEngine::builder()
        .retriever(Arc::new(MockRetriever::returning(corpus())))
        .grader(Arc::new(MockGrader::all_relevant()))
        .web_search(Arc::new(MockWebSearch::returning(vec![])))
        .generator(Arc::new(StalledGenerator))
        .store(store.clone())
        .switch(Arc::new(FixedSwitch(true)))
        .config(EngineConfig::new().with_run_timeout(Duration::from_millis(100)))
        .build()
        .expect("Failed to build engine");

    let err = engine
        .run_turn(TurnRequest::new("are you there?").with_thread_id("stalled"))
        .await
        .expect_err("Turn should time out");

    match err {
        FlowError::RunTimeout { timeout } => {
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("Expected RunTimeout, got {other:?}"),
    }
    assert!(
        store
            .load(&thread("stalled"))
            .await
            .expect("Load failed")
            .is_none(),
        "a timed-out run must not checkpoint"
    );
}

// =============================================================================
// Scenario: Concurrency
// =============================================================================

/// Test that concurrent turns on one thread serialize instead of clobbering
#[tokio::test]
async fn test_concurrent_turns_on_one_thread_serialize() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = Arc::new(
        ChatEngine::builder()
            .retriever(Arc::new(MockRetriever::returning(corpus())))
            .grader(Arc::new(MockGrader::all_relevant()))
            .web_search(Arc::new(MockWebSearch::returning(vec![])))
            .generator(Arc::new(MockGenerator::new()))
            .store(store.clone())
            .switch(Arc::new(FixedSwitch(true)))
            .build()
            .expect("Failed to build engine"),
    );

    let (a, b) = tokio::join!(
        engine.run_turn(TurnRequest::new("first caller").with_thread_id("shared")),
        engine.run_turn(TurnRequest::new("second caller").with_thread_id("shared")),
    );
    a.expect("First caller failed");
    b.expect("Second caller failed");

    // Both turns landed; neither overwrote the other's contribution
    let checkpoint = store
        .load(&thread("shared"))
        .await
        .expect("Load failed")
        .expect("Checkpoint should exist");
    assert_eq!(checkpoint.version, 2);
    assert_eq!(checkpoint.state.loop_step, 2);
    assert_eq!(checkpoint.state.chat_history.len(), 4);
    assert_eq!(checkpoint.state.steps.len(), 6);
}

/// Test that turns on different threads run independently
#[tokio::test]
async fn test_turns_on_different_threads_are_independent() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = Arc::new(
        ChatEngine::builder()
            .retriever(Arc::new(MockRetriever::returning(corpus())))
            .grader(Arc::new(MockGrader::all_relevant()))
            .web_search(Arc::new(MockWebSearch::returning(vec![])))
            .generator(Arc::new(MockGenerator::new()))
            .store(store.clone())
            .switch(Arc::new(FixedSwitch(true)))
            .build()
            .expect("Failed to build engine"),
    );

    let (a, b) = tokio::join!(
        engine.run_turn(TurnRequest::new("thread a talking").with_thread_id("indep-a")),
        engine.run_turn(TurnRequest::new("thread b talking").with_thread_id("indep-b")),
    );
    a.expect("Thread a failed");
    b.expect("Thread b failed");

    for id in ["indep-a", "indep-b"] {
        let checkpoint = store
            .load(&thread(id))
            .await
            .expect("Load failed")
            .expect("Checkpoint should exist");
        assert_eq!(checkpoint.version, 1);
        assert_eq!(checkpoint.state.loop_step, 1);
        assert_eq!(checkpoint.state.chat_history.len(), 2);
    }
}

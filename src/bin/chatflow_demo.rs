//! Scripted two-turn demo of the conversation workflow.
//!
//! Runs entirely on in-process collaborators: a canned document index, a
//! content-keyed grader, a stub web search, and an echoing generator. Both
//! turns share one thread, so the second turn sees the first turn's history
//! from its checkpoint. Set `RUST_LOG=chatflow=debug` for stage-level logs.

use std::sync::Arc;

use chatflow::collab::mock::{MockGenerator, MockGrader, MockRetriever, MockWebSearch};
use chatflow::collab::{Relevance, SearchHit};
use chatflow::{
    ChatEngine, Document, FixedSwitch, MemoryCheckpointStore, TurnReply, TurnRequest,
};
use tracing_subscriber::EnvFilter;

fn print_reply(label: &str, reply: &TurnReply) {
    println!("== {label} ==");
    println!("thread:  {}", reply.thread_id);
    println!("answer:  {}", reply.answer);
    println!("steps:   {}", reply.steps.join(" -> "));
    println!("docs:    {}", reply.documents.len());
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatflow=info")),
        )
        .init();

    // One relevant document and one distractor, so the first turn exercises
    // the web-search fallback
    let retriever = MockRetriever::returning(vec![
        Document::new("Life path numbers are derived from the birth date."),
        Document::new("The cafeteria menu changes on Mondays."),
    ]);
    let grader = MockGrader::all_relevant()
        .with_verdict("The cafeteria menu changes on Mondays.", Relevance::Irrelevant);
    let web_search = MockWebSearch::returning(vec![SearchHit::new(
        "Numerology assigns meaning to numbers derived from names and dates.",
    )]);

    let engine = ChatEngine::builder()
        .retriever(Arc::new(retriever))
        .grader(Arc::new(grader))
        .web_search(Arc::new(web_search))
        .generator(Arc::new(MockGenerator::new()))
        .store(Arc::new(MemoryCheckpointStore::new()))
        .switch(Arc::new(FixedSwitch(true)))
        .build()?;

    let first = engine
        .run_turn(
            TurnRequest::new("Hello! My name is JOHN, what can you do?").with_name("JOHN"),
        )
        .await?;
    print_reply("turn 1", &first);

    let second = engine
        .run_turn(
            TurnRequest::new("What's my name, and what did we talk about?")
                .with_thread_id(first.thread_id.as_str()),
        )
        .await?;
    print_reply("turn 2", &second);

    // The mock generator embeds the history length it was handed, so the
    // answer above doubles as proof the checkpoint round-tripped
    println!("steps accumulated on the thread: {}", second.steps.len());
    Ok(())
}

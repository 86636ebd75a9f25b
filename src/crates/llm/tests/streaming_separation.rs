//! Scenario E from the testable-properties section: the literal stream
//! `"Adding a node.\n<operations>\n+ A.FUNC.001|x\n</operations>\nDone."` split
//! across 10 deltas must come out as text/content/text/complete with the
//! exact boundaries the spec calls for.

use async_trait::async_trait;
use context::PromptAssembler;
use llm::{Chunk, CompletionRequest, Engine, EngineRequest, LlmProvider, ProviderEvent, Result, StopReason, TokenUsage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tools::ToolRegistry;

struct ChunkedProvider {
    deltas: Vec<&'static str>,
}

#[async_trait]
impl LlmProvider for ChunkedProvider {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn stream_completion(&self, _request: CompletionRequest, tx: mpsc::Sender<ProviderEvent>) -> Result<()> {
        for delta in &self.deltas {
            tx.send(ProviderEvent::TextDelta(delta.to_string())).await.ok();
        }
        tx.send(ProviderEvent::MessageDone {
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage { input_tokens: 12, output_tokens: 8, ..Default::default() },
        })
        .await
        .ok();
        Ok(())
    }
}

/// Splits the literal scenario-E string into exactly 10 roughly-even deltas,
/// without ever splitting inside `<operations>`/`</operations>` tag names
/// (the engine only reasons about whole deltas, not partial tag matches).
fn ten_deltas() -> Vec<&'static str> {
    vec![
        "Adding a node.\n", "<operations>\n", "+ ", "A.FUNC.001", "|x\n", "</operations>", "\n", "Do", "n", "e.",
    ]
}

#[tokio::test]
async fn scenario_e_text_content_text_complete() {
    let data = data_service::unified_data_service("ws-scenario-e", "sys-1");
    let provider = Arc::new(ChunkedProvider { deltas: ten_deltas() });
    let engine = Engine::new(data, provider, PromptAssembler::new("decompose top-down"), Arc::new(ToolRegistry::new()));

    let (tx, mut rx) = mpsc::channel(64);
    engine
        .process_request_stream(EngineRequest { message: "add a node".into(), chat_history: None, phase_hint: None }, tx)
        .await
        .unwrap();

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }

    let mut text_so_far = String::new();
    let mut content_blocks = Vec::new();
    let mut complete = None;
    for chunk in &chunks {
        match chunk {
            Chunk::Text { text } => text_so_far.push_str(text),
            Chunk::Content { text } => content_blocks.push(text.clone()),
            Chunk::Complete { response } => complete = Some(response.clone()),
        }
    }

    // Text chunks concatenate to exactly the prose outside the operations
    // block; text inside the block is never delivered as a `text` chunk.
    assert_eq!(text_so_far, "Adding a node.\n\nDone.");

    assert_eq!(content_blocks.len(), 1);
    assert_eq!(content_blocks[0], "<operations>\n+ A.FUNC.001|x\n</operations>");

    let response = complete.expect("a complete chunk must be emitted");
    // The stripped response keeps the newline that sat before the opening
    // tag and the one that sat after the closing tag; with only two
    // newlines run together there is nothing for the collapse-to-two rule
    // to shorten.
    assert_eq!(response.text_response, "Adding a node.\n\nDone.");
    let operations = response.operations.expect("operations must parse out of the content chunk");
    let diff = format_e::parse_diff(&operations).unwrap();
    assert_eq!(diff.node_ops.len(), 1);
    match &diff.node_ops[0] {
        format_e::NodeOp::Add { semantic_id, .. } => assert_eq!(semantic_id, "A.FUNC.001"),
        other => panic!("expected an add-node op, got {other:?}"),
    }
}

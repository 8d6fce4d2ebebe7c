use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chatflow::{
    run_stream, ByteStream, ContentBlock, DecodeFormat, ErrorReason, Message, PipelineOptions,
    ToolStatus, CANCELLED_TOOL_STATUS,
};

fn chunks(parts: &[&str]) -> ByteStream {
    let owned: Vec<_> = parts
        .iter()
        .map(|part| Ok::<_, anyhow::Error>(Bytes::from(part.to_string())))
        .collect();
    Box::pin(stream::iter(owned))
}

fn options() -> PipelineOptions {
    PipelineOptions {
        idle_timeout: Duration::from_secs(5),
        format: DecodeFormat::EventStream,
    }
}

#[tokio::test]
async fn test_end_to_end_turn() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    // Frame boundaries deliberately misaligned with read boundaries.
    let bytes = chunks(&[
        "data: {\"type\":\"message_start\"}\n\ndata: {\"type\":\"thinking_del",
        "ta\",\"text\":\"planning\"}\n\n",
        "data: {\"type\":\"tool_start\",\"id\":\"t1\",\"name\":\"query\",\"input\":{\"q\":1}}\n\n",
        "data: {\"type\":\"tool_result_delta\",\"id\":\"t1\",\"chunk\":\"3 rows\"}\n\n",
        "data: {\"type\":\"tool_end\",\"id\":\"t1\",\"status\":\"completed\"}\n\n",
        "data: {\"type\":\"text_delta\",\"text\":\"Three \"}\n\ndata: {\"type\":\"text_delta\",\"text\":\"rows.\"}\n\n",
        "data: {\"type\":\"message_metrics\",\"durationMs\":900,\"tokens\":42,\"costUsd\":0.002}\n\n",
        "data: {\"type\":\"message_end\"}\n\n",
    ]);

    let message = run_stream(
        Message::assistant("m1"),
        bytes,
        &options(),
        Some(&tx),
        &cancel,
    )
    .await;

    assert!(!message.is_streaming);
    assert!(message.fault.is_none());
    assert_eq!(message.thinking_text(), Some("planning"));
    assert_eq!(message.body_text(), Some("Three rows."));
    let call = message.tool_calls().next().expect("invocation");
    assert_eq!(call.status, ToolStatus::Completed);
    assert_eq!(call.result_text, "3 rows");
    assert_eq!(message.metrics.map(|m| m.tokens), Some(42));

    // One snapshot per folded event, terminal frame last.
    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    assert!(snapshots.len() >= 8);
    assert_eq!(snapshots.last(), Some(&message));
    assert!(snapshots.iter().rev().skip(1).all(|s| s.is_streaming));
}

#[tokio::test]
async fn test_cancellation_seals_the_partial_turn() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let opening = chunks(&[
        "data: {\"type\":\"thinking_delta\",\"text\":\"foo\"}\n\n",
        "data: {\"type\":\"tool_start\",\"id\":\"a\",\"name\":\"query\",\"input\":{}}\n\n",
    ]);
    // The upstream keeps the connection open after the first frames.
    let bytes: ByteStream = Box::pin(opening.chain(stream::pending()));

    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            run_stream(Message::assistant("m1"), bytes, &options(), Some(&tx), &cancel).await
        }
    });

    // Wait until the tool call is visible, then cut the turn off.
    loop {
        let snapshot = rx.recv().await.expect("snapshot");
        if snapshot.tool_calls().next().is_some() {
            break;
        }
    }
    cancel.cancel();

    let message = handle.await.expect("pipeline task");
    assert!(message.cancelled);
    assert!(!message.is_streaming);
    assert_eq!(
        message.blocks[0],
        ContentBlock::Thinking {
            text: "foo".to_string(),
            is_streaming: false,
        }
    );
    assert_eq!(
        message.tool_calls().next().expect("invocation").status,
        CANCELLED_TOOL_STATUS
    );
}

#[tokio::test]
async fn test_precancelled_token_folds_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let bytes = chunks(&["data: {\"type\":\"text_delta\",\"text\":\"never\"}\n\n"]);
    let message = run_stream(Message::assistant("m1"), bytes, &options(), None, &cancel).await;

    assert!(message.cancelled);
    assert!(message.blocks.is_empty());
}

#[tokio::test]
async fn test_idle_window_seals_with_timeout_fault() {
    let cancel = CancellationToken::new();
    let opening = chunks(&["data: {\"type\":\"text_delta\",\"text\":\"partial\"}\n\n"]);
    let bytes: ByteStream = Box::pin(opening.chain(stream::pending()));

    let opts = PipelineOptions {
        idle_timeout: Duration::from_millis(50),
        format: DecodeFormat::EventStream,
    };
    let message = run_stream(Message::assistant("m1"), bytes, &opts, None, &cancel).await;

    assert!(!message.is_streaming);
    assert_eq!(message.body_text(), Some("partial"));
    let fault = message.fault.expect("fault");
    assert_eq!(fault.reason, ErrorReason::Timeout);
}

#[tokio::test]
async fn test_decode_failure_fails_fast() {
    let cancel = CancellationToken::new();
    let bytes = chunks(&[
        "data: {\"type\":\"text_delta\",\"text\":\"good\"}\n\n",
        "data: {broken\n\n",
        // Anything after the poison pill must not reach the message.
        "data: {\"type\":\"text_delta\",\"text\":\"late\"}\n\ndata: {\"type\":\"message_end\"}\n\n",
    ]);

    let message = run_stream(Message::assistant("m1"), bytes, &options(), None, &cancel).await;

    assert!(!message.is_streaming);
    assert_eq!(message.body_text(), Some("good"));
    let fault = message.fault.expect("fault");
    assert_eq!(fault.reason, ErrorReason::Decode);
}

#[tokio::test]
async fn test_disconnect_before_message_end_is_an_upstream_fault() {
    let cancel = CancellationToken::new();
    let bytes = chunks(&["data: {\"type\":\"text_delta\",\"text\":\"half an answ\"}\n\n"]);

    let message = run_stream(Message::assistant("m1"), bytes, &options(), None, &cancel).await;

    assert!(!message.is_streaming);
    assert_eq!(message.body_text(), Some("half an answ"));
    let fault = message.fault.expect("fault");
    assert_eq!(fault.reason, ErrorReason::Upstream);
    assert_eq!(fault.http_status, None);
}

#[tokio::test]
async fn test_mid_stream_transport_error() {
    let cancel = CancellationToken::new();
    let items: Vec<anyhow::Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"data: {\"type\":\"text_delta\",\"text\":\"so far\"}\n\n")),
        Err(anyhow::anyhow!("connection reset by peer")),
    ];
    let bytes: ByteStream = Box::pin(stream::iter(items));

    let message = run_stream(Message::assistant("m1"), bytes, &options(), None, &cancel).await;

    assert!(!message.is_streaming);
    assert_eq!(message.body_text(), Some("so far"));
    assert_eq!(message.fault.expect("fault").reason, ErrorReason::Upstream);
}

//! End-to-end scenarios driven against a real TCP listener, matching the
//! concrete walkthroughs in the project's testable-properties notes.

mod common;

use std::time::Duration;

use serde_json::json;

#[tokio::test]
async fn submit_and_receive_echo_over_tcp() {
    let harness = common::start_with_live_workers(1, 16).await;
    let mut stream = common::connect(&harness).await;

    let frame = harness
        .codec
        .encode(&json!({"event": "echo", "args": {"x": 1}, "correlation_id": "cid-echo"}))
        .unwrap();
    common::send_frame(&mut stream, &frame).await;

    let response = common::recv_frame_timeout(&mut stream, Duration::from_secs(2))
        .await
        .expect("echo result did not arrive");
    let decoded = harness.codec.decode(&response).unwrap();

    assert_eq!(decoded["status"], "success");
    assert_eq!(decoded["result"]["x"], 1);
    assert_eq!(decoded["correlation_id"], "cid-echo");
}

#[tokio::test]
async fn tampered_frame_closes_the_connection() {
    let harness = common::start_with_live_workers(1, 16).await;
    let mut stream = common::connect(&harness).await;

    let mut frame = harness
        .codec
        .encode(&json!({"event": "echo", "args": {}}))
        .unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;
    common::send_frame(&mut stream, &frame).await;

    // The server closes the socket outright rather than sending any error
    // frame back; a direct read observes EOF.
    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close promptly")
        .unwrap();
    assert_eq!(n, 0, "expected EOF after a tampered frame");
}

#[tokio::test]
async fn queue_overflow_rejects_the_excess_submission() {
    // No drivers ever consume the shared queue, so with capacity 2 a third
    // submission on top of two already-queued tasks is rejected outright.
    let harness = common::start_with_no_drivers(2).await;
    let mut stream = common::connect(&harness).await;

    for correlation_id in ["first", "second", "third"] {
        let frame = harness
            .codec
            .encode(&json!({
                "event": "sleep",
                "args": {"millis": 5000},
                "correlation_id": correlation_id,
            }))
            .unwrap();
        common::send_frame(&mut stream, &frame).await;
    }

    // Only the rejected third submission gets an immediate response; the
    // first two are queued silently until a worker (never started here)
    // would pick them up.
    let response = common::recv_frame_timeout(&mut stream, Duration::from_secs(2))
        .await
        .expect("queue-full rejection did not arrive");
    let decoded = harness.codec.decode(&response).unwrap();

    assert_eq!(decoded["status"], "error");
    assert_eq!(decoded["code"], "QUEUE_FULL");
}

#[tokio::test]
async fn poll_after_disconnect_recovers_the_parked_result_exactly_once() {
    let harness = common::start_with_live_workers(1, 16).await;

    {
        let mut stream = common::connect(&harness).await;
        let frame = harness
            .codec
            .encode(&json!({
                "event": "sleep",
                "args": {"millis": 50},
                "correlation_id": "cid-parked",
            }))
            .unwrap();
        common::send_frame(&mut stream, &frame).await;
        // Drop the connection immediately, before the task completes.
    }

    // Give the worker time to finish and the router to park the result
    // since the original client handle is gone.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut stream = common::connect(&harness).await;
    let poll = harness
        .codec
        .encode(&json!({"event": "POLL", "args": {"task_id": "cid-parked"}}))
        .unwrap();
    common::send_frame(&mut stream, &poll).await;
    let response = common::recv_frame_timeout(&mut stream, Duration::from_secs(2))
        .await
        .expect("parked result did not arrive");
    let decoded = harness.codec.decode(&response).unwrap();
    assert_eq!(decoded["status"], "success");
    assert_eq!(decoded["result"], 50);

    // The result store pops on read, so a second poll reports NOT_FOUND.
    common::send_frame(&mut stream, &poll).await;
    let response = common::recv_frame_timeout(&mut stream, Duration::from_secs(2))
        .await
        .expect("second poll did not arrive");
    let decoded = harness.codec.decode(&response).unwrap();
    assert_eq!(decoded["status"], "NOT_FOUND");
}

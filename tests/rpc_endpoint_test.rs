//! Behavior tests for the JSON-RPC endpoint, driven by a scripted mock
//! server over an in-memory pipe.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};

use common::MockServer;
use waypost::error::RpcError;
use waypost::rpc::{Endpoint, ErrorObject, HandlerTable, codes};

fn endpoint_with(handlers: HandlerTable) -> (Endpoint, MockServer) {
    let (server, (reader, writer)) = MockServer::pair();
    (Endpoint::new(reader, writer, handlers), server)
}

fn start_loop(endpoint: &Endpoint) -> tokio::task::JoinHandle<()> {
    let endpoint = endpoint.clone();
    tokio::spawn(async move { endpoint.run().await })
}

#[tokio::test]
async fn test_concurrent_calls_get_distinct_ids() {
    const CALLS: usize = 8;

    let (endpoint, mut server) = endpoint_with(HandlerTable::new());
    let _loop = start_loop(&endpoint);

    let mut callers = Vec::new();
    for seq in 0..CALLS {
        let endpoint = endpoint.clone();
        callers.push(tokio::spawn(async move {
            endpoint.call("test/echo", json!({ "seq": seq })).await
        }));
    }

    // Collect every request; ids must be pairwise distinct.
    let mut requests = Vec::new();
    for _ in 0..CALLS {
        let message = server.recv().await;
        assert_eq!(message["method"], "test/echo");
        let id = message["id"].as_u64().expect("integer id");
        requests.push((id, message["params"]["seq"].clone()));
    }
    let distinct: HashSet<u64> = requests.iter().map(|(id, _)| *id).collect();
    assert_eq!(distinct.len(), CALLS);

    // Answer in reverse order; correlation is by id, not send order.
    for (id, seq) in requests.iter().rev() {
        server.respond(json!(id), json!({ "seq": seq })).await;
    }

    for (seq, caller) in callers.into_iter().enumerate() {
        let result = caller.await.unwrap().expect("call should resolve");
        assert_eq!(result["seq"], json!(seq));
    }
}

#[tokio::test]
async fn test_unknown_inbound_method_is_answered_with_method_not_found() {
    let (endpoint, mut server) = endpoint_with(HandlerTable::new());
    let _loop = start_loop(&endpoint);

    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": 42,
            "method": "client/unregistered",
            "params": {}
        }))
        .await;

    let reply = server.recv().await;
    assert_eq!(reply["id"], 42);
    assert_eq!(reply["error"]["code"], json!(codes::METHOD_NOT_FOUND));
    assert!(reply.get("result").is_none());
}

#[tokio::test]
async fn test_registered_request_handler_answers() {
    let handlers = HandlerTable::new().on_request("workspace/configuration", |params| {
        let count = params
            .and_then(|p| p["items"].as_array().map(Vec::len))
            .unwrap_or(0);
        Ok(json!(vec![Value::Null; count]))
    });
    let (endpoint, mut server) = endpoint_with(handlers);
    let _loop = start_loop(&endpoint);

    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": "cfg-1",
            "method": "workspace/configuration",
            "params": { "items": [{}, {}] }
        }))
        .await;

    let reply = server.recv().await;
    // The request id is echoed verbatim, string ids included.
    assert_eq!(reply["id"], "cfg-1");
    assert_eq!(reply["result"], json!([null, null]));
}

#[tokio::test]
async fn test_handler_failure_becomes_error_response_and_loop_survives() {
    let handlers = HandlerTable::new().on_request("test/explode", |_| {
        Err(ErrorObject::new(codes::INTERNAL_ERROR, "boom"))
    });
    let (endpoint, mut server) = endpoint_with(handlers);
    let _loop = start_loop(&endpoint);

    server
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "test/explode"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["error"]["code"], json!(codes::INTERNAL_ERROR));
    assert_eq!(reply["error"]["message"], "boom");

    // The loop must still be dispatching after a handler failure.
    server
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "client/unregistered"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["error"]["code"], json!(codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_notifications_dispatch_without_a_reply() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let handlers = HandlerTable::new().on_notification("$/progress", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (endpoint, mut server) = endpoint_with(handlers);
    let _loop = start_loop(&endpoint);

    server
        .send(json!({"jsonrpc": "2.0", "method": "$/progress", "params": {"token": "t"}}))
        .await;
    // Unhandled notifications are ignored without an error reply.
    server
        .send(json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {}}))
        .await;

    // Fence: a request is answered only after the preceding messages were
    // dispatched, the loop being sequential.
    server
        .send(json!({"jsonrpc": "2.0", "id": 9, "method": "client/fence"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], 9);

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_loss_unblocks_every_pending_caller() {
    const PENDING: usize = 5;

    let (endpoint, mut server) = endpoint_with(HandlerTable::new());
    let _loop = start_loop(&endpoint);

    let mut callers = Vec::new();
    for _ in 0..PENDING {
        let endpoint = endpoint.clone();
        callers.push(tokio::spawn(async move {
            endpoint.call("test/never-answered", json!({})).await
        }));
    }
    for _ in 0..PENDING {
        server.recv().await;
    }

    // Server dies with all five calls outstanding.
    drop(server);

    for caller in callers {
        let outcome = caller.await.unwrap();
        assert!(
            matches!(outcome, Err(RpcError::ConnectionClosed)),
            "caller should unblock with ConnectionClosed, got {outcome:?}"
        );
    }
}

#[tokio::test]
async fn test_stray_responses_are_dropped_and_loop_survives() {
    let (endpoint, mut server) = endpoint_with(HandlerTable::new());
    let _loop = start_loop(&endpoint);

    // Response for an id that was never issued, and one with no id at all.
    server
        .send(json!({"jsonrpc": "2.0", "id": 999, "result": "stray"}))
        .await;
    server.send(json!({"jsonrpc": "2.0", "result": "lost"})).await;

    let endpoint_clone = endpoint.clone();
    let caller =
        tokio::spawn(async move { endpoint_clone.call("test/ping", json!({})).await });

    let (id, _) = server.expect_request("test/ping").await;
    server.respond(id, json!("pong")).await;

    assert_eq!(caller.await.unwrap().unwrap(), json!("pong"));
}

#[tokio::test]
async fn test_server_error_reaches_the_caller() {
    let (endpoint, mut server) = endpoint_with(HandlerTable::new());
    let _loop = start_loop(&endpoint);

    let endpoint_clone = endpoint.clone();
    let caller = tokio::spawn(async move {
        endpoint_clone
            .call("textDocument/definition", json!({}))
            .await
    });

    let (id, _) = server.expect_request("textDocument/definition").await;
    server
        .respond_error(id, codes::CONTENT_MODIFIED, "content modified")
        .await;

    let outcome = caller.await.unwrap();
    match outcome {
        Err(RpcError::Server { code, message, data }) => {
            assert_eq!(code, codes::CONTENT_MODIFIED);
            assert_eq!(message, "content modified");
            assert!(data.is_none());
        }
        other => panic!("expected a server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_framing_violation_closes_the_connection() {
    let (endpoint, mut server) = endpoint_with(HandlerTable::new());
    let loop_task = start_loop(&endpoint);

    let endpoint_clone = endpoint.clone();
    let caller =
        tokio::spawn(async move { endpoint_clone.call("test/ping", json!({})).await });
    server.recv().await;

    // Garbage where a header belongs; the loop must close rather than
    // attempt to resynchronize.
    server.send_raw(b"X-Bogus: definitely not a frame\r\n\r\n").await;

    let outcome = caller.await.unwrap();
    assert!(matches!(outcome, Err(RpcError::ConnectionClosed)));
    loop_task.await.unwrap();
}

//! MCP JSON-RPC handling over an in-memory pipe

mod common;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use atmcp_server::{McpServer, PROTOCOL_VERSION};
use common::Harness;

async fn request(server: &McpServer, message: Value) -> Value {
    let line = server
        .handle_line(&message.to_string())
        .await
        .expect("response expected");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let server = Harness::anonymous().app.server();

    let response = request(
        &server,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test", "version": "0"},
        }}),
    )
    .await;
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["protocolVersion"], json!("2025-03-26"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("atmcp-server"));
    assert_eq!(
        response["result"]["capabilities"]["tools"]["listChanged"],
        json!(false)
    );

    let response = request(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "initialize",
            "params": {"protocolVersion": "1999-01-01"},
        }),
    )
    .await;
    assert_eq!(response["result"]["protocolVersion"], json!(PROTOCOL_VERSION));
}

#[tokio::test]
async fn test_tools_list_marks_unavailable_tools() {
    let harness = Harness::anonymous();
    harness.app.initialize().await;
    let server = harness.app.server();

    let list = json!({"jsonrpc": "2.0", "id": "t", "method": "tools/list"});
    let response = request(&server, list).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 12);

    let find = |name: &str| tools.iter().find(|t| t["name"] == json!(name)).unwrap().clone();
    let create_post = find("create_post");
    assert!(
        create_post["description"]
            .as_str()
            .unwrap()
            .ends_with("(Unavailable: Requires authentication — please provide credentials)")
    );
    assert_eq!(create_post["inputSchema"]["required"], json!(["text"]));

    let profile = find("get_profile");
    assert!(!profile["description"].as_str().unwrap().contains("Unavailable"));
}

#[tokio::test]
async fn test_tools_call_wraps_operation_result() {
    let harness = Harness::authenticated().await;
    let server = harness.app.server();

    let response = request(
        &server,
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
            "name": "get_timeline",
            "arguments": {"limit": 5},
        }}),
    )
    .await;
    let result = &response["result"];
    assert_eq!(result["isError"], json!(false));
    assert_eq!(result["structuredContent"]["ok"], json!(true));
    assert_eq!(
        result["structuredContent"]["value"]["nsid"],
        json!("app.bsky.feed.getTimeline")
    );
    let text = result["content"][0]["text"].as_str().unwrap();
    let decoded: Value = serde_json::from_str(text).unwrap();
    assert_eq!(decoded, result["structuredContent"]);

    let response = request(
        &server,
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {
            "name": "create_post",
            "arguments": {},
        }}),
    )
    .await;
    let result = &response["result"];
    assert_eq!(result["isError"], json!(true));
    assert_eq!(result["structuredContent"]["error"]["kind"], json!("validation"));
    assert_eq!(result["structuredContent"]["error"]["fields"], json!(["text"]));
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = Harness::anonymous().app.server();

    let unsupported = json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"});
    let response = request(&server, unsupported).await;
    assert_eq!(response["error"]["code"], json!(-32601));
    assert_eq!(response["id"], json!(5));

    let response = request(
        &server,
        json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"arguments": {}}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-32602));

    let line = server.handle_line("{not json").await.unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["error"]["code"], json!(-32700));
    assert_eq!(response["id"], Value::Null);

    assert!(
        server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none()
    );
    assert!(server.handle_line("   ").await.is_none());
}

#[tokio::test]
async fn test_serve_answers_until_eof() {
    let server = Harness::anonymous().app.server();
    let (client, server_end) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_end);

    let serving = tokio::spawn(async move {
        server
            .serve(server_read, server_write, CancellationToken::new())
            .await
    });

    let (client_read, mut client_write) = tokio::io::split(client);
    client_write
        .write_all(
            concat!(
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                "\n",
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
                "\n",
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","#,
                r#""params":{"name":"stream_status"}}"#,
                "\n",
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    client_write.shutdown().await.unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut responses = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        responses.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    serving.await.unwrap().unwrap();

    responses.sort_by_key(|r| r["id"].as_i64());
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"], json!({}));
    assert_eq!(
        responses[1]["result"]["structuredContent"],
        json!({"ok": true, "value": {"enabled": false}})
    );
}

#[tokio::test]
async fn test_serve_stops_on_cancellation() {
    let server = Harness::anonymous().app.server();
    let (_client, server_end) = tokio::io::duplex(1024);
    let (server_read, server_write) = tokio::io::split(server_end);
    let shutdown = CancellationToken::new();

    let serving = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { server.serve(server_read, server_write, shutdown).await }
    });
    shutdown.cancel();
    serving.await.unwrap().unwrap();
}

//! HTTP transport tests against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use milvus_gateway::server;
use milvus_gateway_core::store::memory::InMemoryStore;
use milvus_gateway_core::Dispatcher;
use serde_json::{json, Value};

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start_server() -> String {
    let port = find_free_port();
    let dispatcher = Dispatcher::new(Arc::new(InMemoryStore::new()));
    let bind = format!("127.0.0.1:{}", port);
    tokio::spawn(async move {
        server::run_http(dispatcher, Duration::from_secs(30), &bind)
            .await
            .unwrap();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn call(base: &str, tool: &str, args: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/{}", base, tool))
        .json(&args)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_health_and_tool_list() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let list: Value = client
        .get(format!("{}/tools/list", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tools = list["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 23);
    assert!(tools.iter().any(|t| t["name"] == "milvus-hybrid-search"));
}

#[tokio::test]
async fn test_create_insert_search_round() {
    let base = start_server().await;

    let (status, body) = call(
        &base,
        "milvus-create-collection",
        json!({ "collection_name": "docs", "schema": { "dimension": 2 } }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["text"], "Collection 'docs' created successfully");

    let (status, body) = call(
        &base,
        "milvus-insert-data",
        json!({
            "collection_name": "docs",
            "data": {
                "id": [1, 2],
                "vector": [[1.0, 0.0], [0.0, 1.0]],
                "title": ["alpha", "beta"]
            }
        }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);

    let (status, body) = call(
        &base,
        "milvus-vector-search",
        json!({
            "collection_name": "docs",
            "vector": [1.0, 0.1],
            "limit": 1,
            "output_fields": ["title"]
        }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["result"]["text"], "Vector search results for 'docs':");
    let lines = body["result"]["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].as_str().unwrap().contains("alpha"));
}

#[tokio::test]
async fn test_error_codes_map_to_statuses() {
    let base = start_server().await;

    let (status, body) = call(&base, "milvus-query", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "validation");

    let (status, body) = call(&base, "milvus-teleport", json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let create = json!({ "collection_name": "dup" });
    assert_eq!(call(&base, "milvus-create-collection", create.clone()).await.0, 200);
    let (status, body) = call(&base, "milvus-create-collection", create).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "conflict");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Collection 'dup' already exists"));

    let (status, body) = call(
        &base,
        "milvus-insert-data",
        json!({ "collection_name": "dup", "data": { "id": [1, 2], "vector": [[0.0]] } }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "shape_mismatch");

    let (status, body) = call(
        &base,
        "milvus-collection-info",
        json!({ "collection_name": "missing" }),
    )
    .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "store");
}

#[tokio::test]
async fn test_non_object_body_is_rejected() {
    let base = start_server().await;
    let (status, body) = call(&base, "milvus-list-collections", json!([1, 2])).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "validation");
}

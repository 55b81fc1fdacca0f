//! End-to-end tests for the JSON-RPC server.
//!
//! Each test starts a server on an ephemeral port backed by an in-memory
//! fabric and talks to it over HTTP.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tierflow_core::models::{EntityMeta, FileEntry, Share};
use tierflow_core::{CancellationToken, InMemoryGateway, TierflowApi, TierflowConfig};

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    shutdown: CancellationToken,
    _temp_dir: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl TestServer {
    async fn start(gateway: Arc<InMemoryGateway>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = TierflowConfig::default();
        config.catalog.db_path = temp_dir.path().join("data").join("catalog.db");
        config.jobs.initial_poll_ms = 5;
        config.jobs.max_poll_ms = 20;

        let api = TierflowApi::builder(config)
            .with_gateway(gateway)
            .auto_create_dirs(true)
            .build()
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let addr = tierflow_rpc::start_server(api, "127.0.0.1", 0, 16, shutdown.clone())
            .await
            .unwrap();

        let server = Self {
            addr,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            shutdown,
            _temp_dir: temp_dir,
        };
        server.wait_until_ready().await;
        server
    }

    async fn wait_until_ready(&self) {
        for _ in 0..50 {
            let ok = self
                .client
                .get(format!("http://{}/health", self.addr))
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false);
            if ok {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("server at {} never became ready", self.addr);
    }

    async fn rpc_raw(&self, method: &str, params: Value) -> Value {
        self.client
            .post(format!("http://{}/rpc", self.addr))
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn rpc(&self, method: &str, params: Value) -> Value {
        let response = self.rpc_raw(method, params).await;
        assert!(
            response.get("error").is_none(),
            "unexpected error from {}: {}",
            method,
            response
        );
        response["result"].clone()
    }
}

fn fabric() -> Arc<InMemoryGateway> {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.add_share(Share {
        meta: EntityMeta::new("s-1", "hub"),
        path: "/hub".into(),
        ..Default::default()
    });
    for name in ["a.mp4", "b.mp4"] {
        let mut file = FileEntry::new(format!("f-{}", name), format!("/hub/{}", name));
        file.size_bytes = Some(1024);
        gateway.add_file(file);
    }
    gateway
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start(fabric()).await;

    let body: Value = server
        .client
        .get(format!("http://{}/health", server.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], tierflow_core::VERSION);
}

#[tokio::test]
async fn test_tools_list_over_rpc_and_http() {
    let server = TestServer::start(fabric()).await;

    let result = server.rpc("tools/list", json!({})).await;
    let tools = result["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 25);
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"apply_objective_by_tag"));
    assert!(names.contains(&"wait_for_job"));
    assert!(tools.iter().all(|t| t["inputSchema"].is_object()));

    let body: Value = server
        .client
        .get(format!("http://{}/tools", server.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["tools"].as_array().unwrap().len(), 25);
}

#[tokio::test]
async fn test_tag_then_search_via_tools_call() {
    let server = TestServer::start(fabric()).await;

    let tagged = server
        .rpc(
            "tools/call",
            json!({
                "name": "tag_file",
                "arguments": {"path": "/hub/a.mp4", "tags": {"project": "alpha"}}
            }),
        )
        .await;
    assert_eq!(tagged["success"], true, "{}", tagged);

    let found = server
        .rpc(
            "tools/call",
            json!({
                "name": "search_files_by_tag",
                "arguments": {"tag_name": "user.project", "tag_value": "alpha", "source": "live"}
            }),
        )
        .await;
    assert_eq!(found["success"], true, "{}", found);
    assert_eq!(found["total_count"], 1);
    assert_eq!(found["matching_files"][0]["path"], "/hub/a.mp4");
}

#[tokio::test]
async fn test_tools_call_failure_is_a_result() {
    let server = TestServer::start(fabric()).await;

    let response = server
        .rpc_raw(
            "tools/call",
            json!({"name": "get_job_status", "arguments": {"job_id": "missing"}}),
        )
        .await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["success"], false);
    assert_eq!(response["result"]["error_kind"], "not_found");
}

#[tokio::test]
async fn test_direct_tool_call() {
    let server = TestServer::start(fabric()).await;

    let result = server.rpc("list_shares", json!({})).await;
    assert_eq!(result["success"], true);
    assert_eq!(result["shares"].as_array().unwrap().len(), 1);

    let response = server
        .rpc_raw("get_job_status", json!({"job_id": "missing"}))
        .await;
    assert_eq!(response["error"]["code"], -32002);
    assert_eq!(response["error"]["data"]["kind"], "not_found");
}

#[tokio::test]
async fn test_unknown_method() {
    let server = TestServer::start(fabric()).await;

    let response = server.rpc_raw("no_such_method", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 1);
}

#[tokio::test]
async fn test_invalid_params() {
    let server = TestServer::start(fabric()).await;

    // missing required tag_value
    let response = server
        .rpc_raw("search_files_by_tag", json!({"tag_name": "project"}))
        .await;
    assert_eq!(response["error"]["code"], -32602);

    let response = server
        .rpc_raw("tools/call", json!({"name": "not_a_tool", "arguments": {}}))
        .await;
    assert_eq!(response["error"]["code"], -32602);

    let response = server.rpc_raw("tools/call", json!({"arguments": {}})).await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_apply_objective_by_tag_over_rpc() {
    let server = TestServer::start(fabric()).await;

    for path in ["/hub/a.mp4", "/hub/b.mp4"] {
        let tagged = server
            .rpc("tag_file", json!({"path": path, "tags": {"tier": "cold"}}))
            .await;
        assert_eq!(tagged["success"], true);
    }

    let result = server
        .rpc(
            "apply_objective_by_tag",
            json!({
                "tag_name": "user.tier",
                "tag_value": "cold",
                "objective_type": "place_on_tier",
                "tier_name": "archive",
                "source": "live"
            }),
        )
        .await;

    assert_eq!(result["success"], true, "{}", result);
    assert_eq!(result["requested"], 2);
    assert_eq!(result["accepted"], 2);
    assert_eq!(result["job_ids"].as_array().unwrap().len(), 2);
}

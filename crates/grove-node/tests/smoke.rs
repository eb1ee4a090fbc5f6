//! End-to-end smoke test for grove-node.
//!
//! Starts a real node process, creates a group, posts content through the
//! HTTP API, and reads it back through the content index.
//!
//! Run with:
//!   cargo test -p grove-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

struct NodeGuard {
    child: Child,
    root: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn spawn_node(root: &std::path::Path, api_port: u16, p2p_port: u16) -> Child {
    Command::new(env!("CARGO_BIN_EXE_grove-node"))
        .args([
            "--datadir",
            root.join("data").to_str().unwrap(),
            "--keystoredir",
            root.join("keystore").to_str().unwrap(),
            "--configdir",
            root.join("config").to_str().unwrap(),
            "--apilisten",
            &format!("127.0.0.1:{api_port}"),
            "--listen",
            &format!("/ip4/127.0.0.1/tcp/{p2p_port}"),
        ])
        .env("GROVE_PASSWORD", "smoke-test-password")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn grove-node")
}

async fn wait_for_api(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

#[tokio::test]
async fn create_group_post_and_read_back_content() {
    let root = std::env::temp_dir().join(format!("grove_smoke_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();

    let api_port = free_port();
    let p2p_port = free_port();
    let base_url = format!("http://127.0.0.1:{api_port}");

    let child = spawn_node(&root, api_port, p2p_port);
    let _guard = NodeGuard { child, root };

    let http = reqwest::Client::new();
    assert!(
        wait_for_api(&http, &format!("{base_url}/api/v1/node"), Duration::from_secs(20)).await,
        "grove-node did not become ready within 20 seconds"
    );

    // A lone node has no peers sharing its protocol prefix yet.
    let node_info: serde_json::Value = http
        .get(format!("{base_url}/api/v1/node"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(node_info["status"], "OFFLINE");

    // ── Create a group ────────────────────────────────────────────────────────
    let create_resp: serde_json::Value = http
        .post(format!("{base_url}/api/v1/group"))
        .json(&serde_json::json!({
            "group_name": "book-club",
            "consensus_type": "poa",
            "encrypt_type": "public",
            "app_key": "chat-app",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let group_id = create_resp["group_id"].as_str().unwrap().to_string();

    // ── Post a note ───────────────────────────────────────────────────────────
    let post_resp = http
        .post(format!("{base_url}/api/v1/group/content"))
        .json(&serde_json::json!({
            "type": "Add",
            "object": {"type": "Note", "content": "hello, book club"},
            "target": {"type": "Group", "id": group_id},
        }))
        .send()
        .await
        .unwrap();
    assert!(post_resp.status().is_success(), "posting content should succeed");
    let post_body: serde_json::Value = post_resp.json().await.unwrap();
    let trx_id = post_body["trx_id"].as_str().unwrap().to_string();
    assert_eq!(trx_id.len(), 32, "trx id should be 16 bytes hex-encoded");

    // Give the content indexer a moment to catch up with the committed block.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // ── Read it back ──────────────────────────────────────────────────────────
    let content: serde_json::Value = http
        .get(format!("{base_url}/api/v1/group/{group_id}/content"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let trxs = content["trxs"].as_array().expect("trxs array");
    assert_eq!(trxs.len(), 1);
    assert_eq!(trxs[0]["trx_id"], trx_id);

    let content_hex = trxs[0]["content_hex"].as_str().unwrap();
    let decoded = hex::decode(content_hex).unwrap();
    assert_eq!(decoded, b"hello, book club");

    // ── Fetch the same trx directly ──────────────────────────────────────────
    let trx: serde_json::Value = http
        .get(format!("{base_url}/api/v1/trx/{group_id}/{trx_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(trx["trx_type"], "post");
}

#[tokio::test]
async fn unknown_group_lookups_return_400() {
    let root = std::env::temp_dir().join(format!("grove_smoke_404_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();

    let api_port = free_port();
    let p2p_port = free_port();
    let base_url = format!("http://127.0.0.1:{api_port}");

    let child = spawn_node(&root, api_port, p2p_port);
    let _guard = NodeGuard { child, root };

    let http = reqwest::Client::new();
    assert!(wait_for_api(&http, &format!("{base_url}/api/v1/node"), Duration::from_secs(20)).await);

    let resp = http
        .get(format!("{base_url}/api/v1/group/not-a-real-group/content"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("group not found"));
}

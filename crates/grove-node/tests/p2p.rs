//! P2P integration test for grove-node.
//!
//! Starts two node processes — node B bootstraps by dialing node A — and
//! verifies each reports the other as an ONLINE peer (spec §6 `GET
//! /api/v1/node`: "ONLINE iff at least one peer shares this node's protocol
//! prefix").
//!
//! Run with:
//!   cargo test -p grove-node --test p2p

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

struct NodeGuard {
    child: Child,
    _dir: tempfile::TempDir,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn spawn_node(api_port: u16, p2p_port: u16, bootstrap: Option<&str>) -> NodeGuard {
    let dir = tempfile::tempdir().unwrap();
    let mut args = vec![
        "--datadir".to_string(),
        dir.path().join("data").to_string_lossy().into_owned(),
        "--keystoredir".to_string(),
        dir.path().join("keystore").to_string_lossy().into_owned(),
        "--configdir".to_string(),
        dir.path().join("config").to_string_lossy().into_owned(),
        "--apilisten".to_string(),
        format!("127.0.0.1:{api_port}"),
        "--listen".to_string(),
        format!("/ip4/127.0.0.1/tcp/{p2p_port}"),
    ];
    if let Some(addr) = bootstrap {
        args.push("--bootstrap".to_string());
        args.push(addr.to_string());
    }

    let child = Command::new(env!("CARGO_BIN_EXE_grove-node"))
        .args(&args)
        .env("GROVE_PASSWORD", "p2p-test-password")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn grove-node");

    NodeGuard { child, _dir: dir }
}

async fn node_info(client: &reqwest::Client, url: &str) -> Option<serde_json::Value> {
    let resp = client.get(url).send().await.ok()?;
    resp.json().await.ok()
}

async fn wait_for_status(client: &reqwest::Client, url: &str, want: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(info) = node_info(client, url).await {
            if info["status"] == want {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    false
}

#[tokio::test]
async fn two_nodes_see_each_other_online() {
    let http = reqwest::Client::new();

    let a_api = free_port();
    let a_p2p = free_port();
    let a_url = format!("http://127.0.0.1:{a_api}");
    let node_a = spawn_node(a_api, a_p2p, None);

    assert!(
        wait_for_status(&http, &format!("{a_url}/api/v1/node"), "OFFLINE", Duration::from_secs(20)).await,
        "node A did not come up"
    );

    let a_info = node_info(&http, &format!("{a_url}/api/v1/node")).await.unwrap();
    let a_peer_id = a_info["peer_id"].as_str().unwrap().to_string();
    let a_multiaddr = format!("/ip4/127.0.0.1/tcp/{a_p2p}/p2p/{a_peer_id}");

    let b_api = free_port();
    let b_p2p = free_port();
    let b_url = format!("http://127.0.0.1:{b_api}");
    let node_b = spawn_node(b_api, b_p2p, Some(&a_multiaddr));

    assert!(
        wait_for_status(&http, &format!("{b_url}/api/v1/node"), "ONLINE", Duration::from_secs(30)).await,
        "node B never saw node A as an online peer"
    );
    assert!(
        wait_for_status(&http, &format!("{a_url}/api/v1/node"), "ONLINE", Duration::from_secs(30)).await,
        "node A never saw node B as an online peer"
    );

    drop(node_a);
    drop(node_b);
}

//! grove-node — the Grove full-node binary.
//!
//! Startup sequence:
//!   1. Open the storage database (exit code 16 on lock contention)
//!   2. Open the keystore and unlock it with `GROVE_PASSWORD`
//!   3. Reload every persisted group and resume its sync (restart durability)
//!   4. Start the P2P network and the inbound gossip dispatcher
//!   5. Start the HTTP API server
//!   6. Wait for SIGTERM/SIGINT (or `/api/quit`) and shut down

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use grove_api::{ApiConfig, AppState};
use grove_chain::ContentIndexer;
use grove_core::constants::{DEFAULT_TRX_EXPIRATION_SECS, EXIT_CODE_STORAGE_LOCKED, PROTOCOL_PREFIX_BASE};
use grove_core::error::GroveError;
use grove_group::{ContentReader, GroupMgr};
use grove_index::Indexer;
use grove_keystore::Keystore;
use grove_p2p::{Package, P2pConfig, P2pNetwork};
use grove_storage::StorageDb;

#[derive(Parser, Debug)]
#[command(name = "grove-node", version, about = "Grove — permissioned P2P group messaging node")]
struct Args {
    /// Display name for this node (spec §6 `--peername`).
    #[arg(long, default_value = "grove-node")]
    peername: String,

    /// Directory for node configuration (spec §6 `--configdir`).
    #[arg(long, default_value = "~/.grove/config")]
    configdir: PathBuf,

    /// Directory for the persistent storage database (spec §6 `--datadir`).
    #[arg(long, default_value = "~/.grove/data")]
    datadir: PathBuf,

    /// Directory for the per-group key material (spec §6 `--keystoredir`).
    #[arg(long, default_value = "~/.grove/keystore")]
    keystoredir: PathBuf,

    /// HTTP API listen address (spec §6 `--apilisten`).
    #[arg(long, default_value = "0.0.0.0:5001")]
    apilisten: std::net::SocketAddr,

    /// P2P listen multiaddr (spec §6 `--listen`).
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/7777")]
    listen: String,

    /// Rendezvous string used for peer discovery (spec §6 `--rendezvous`).
    #[arg(long, default_value = "grove-default")]
    rendezvous: String,

    /// Bootstrap peer multiaddresses, comma-separated (spec §6 `--bootstrap`).
    #[arg(long, value_delimiter = ',')]
    bootstrap: Vec<String>,

    /// Emit structured JSON logs instead of the default text format
    /// (spec §6 `--jsontracer`).
    #[arg(long)]
    jsontracer: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.jsontracer);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(GroveError::StorageLocked) = e.downcast_ref::<GroveError>() {
                warn!("storage is locked by another process");
                return ExitCode::from(EXIT_CODE_STORAGE_LOCKED as u8);
            }
            eprintln!("grove-node: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,grove=debug".parse().unwrap());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!(peername = %args.peername, "grove node starting");

    let configdir = expand_tilde(&args.configdir);
    let datadir = expand_tilde(&args.datadir);
    let keystoredir = expand_tilde(&args.keystoredir);
    std::fs::create_dir_all(&configdir).with_context(|| format!("creating config dir {}", configdir.display()))?;

    let passphrase = std::env::var("GROVE_PASSWORD")
        .context("GROVE_PASSWORD must be set to unlock the keystore")?;

    // ── Storage ──────────────────────────────────────────────────────────────
    let storage = Arc::new(StorageDb::open(&datadir).map_err(|e| match e {
        GroveError::StorageLocked => anyhow::Error::new(GroveError::StorageLocked),
        other => anyhow::Error::new(other).context("opening storage database"),
    })?);

    // ── Keystore ─────────────────────────────────────────────────────────────
    let keystore = Arc::new(Keystore::open(&keystoredir).context("opening keystore")?);
    let unlocked = keystore.unlock_all(&passphrase).context("unlocking keystore")?;
    info!(keys = unlocked, "keystore unlocked");

    // ── Content index ────────────────────────────────────────────────────────
    let indexer = Arc::new(Indexer::new(storage.clone()));
    let content_indexer: Arc<dyn ContentIndexer> = indexer.clone();
    let content_reader: Arc<dyn ContentReader> = indexer;

    // ── P2P network ──────────────────────────────────────────────────────────
    let protocol_version = format!("{PROTOCOL_PREFIX_BASE}/{}", env!("CARGO_PKG_VERSION"));
    let p2p_config = P2pConfig {
        listen_addr: args.listen.clone(),
        bootstrap_peers: args.bootstrap.clone(),
        protocol_version: protocol_version.clone(),
        rendezvous: args.rendezvous.clone(),
    };
    let (p2p_network, mut p2p_handle) =
        P2pNetwork::new(&p2p_config).map_err(|e| anyhow::anyhow!("building P2P network: {e}"))?;
    info!(peer_id = %p2p_handle.local_peer_id, "P2P identity");
    let protocol_peers = p2p_handle.protocol_peers.clone();
    let local_peer_id = p2p_handle.local_peer_id.to_string();

    // ── Group manager ────────────────────────────────────────────────────────
    let group_mgr = Arc::new(GroupMgr::new(
        storage.clone(),
        keystore.clone(),
        p2p_handle.command_tx.clone(),
        env!("CARGO_PKG_VERSION").to_string(),
        DEFAULT_TRX_EXPIRATION_SECS,
        Some(content_indexer),
    ));
    group_mgr.load_persisted().await.context("reloading persisted groups")?;

    // ── Inbound gossip dispatcher ────────────────────────────────────────────
    let dispatch_group_mgr = group_mgr.clone();
    tokio::spawn(async move {
        while let Some(pkg) = p2p_handle.inbound_rx.recv().await {
            let Some(group) = dispatch_group_mgr.get(&pkg.group_id).await else {
                warn!(group = %pkg.group_id, "dropping gossip for unknown group");
                continue;
            };
            let result = match pkg.package {
                Package::Trx(trx) => group.chain().handle_trx(trx).await,
                Package::Block(block) => group.chain().handle_block(block).await,
            };
            if let Err(e) = result {
                warn!(group = %pkg.group_id, error = %e, "failed to handle inbound gossip package");
            }
        }
    });

    tokio::spawn(p2p_network.run());

    // ── HTTP API ─────────────────────────────────────────────────────────────
    let shutdown = Arc::new(Notify::new());
    let api_state = Arc::new(AppState {
        group_mgr,
        content_reader,
        passphrase,
        peername: args.peername,
        node_version: env!("CARGO_PKG_VERSION").to_string(),
        local_peer_id,
        protocol_version,
        peer_count_fn: Arc::new(move || protocol_peers.read().unwrap().len()),
        shutdown: shutdown.clone(),
    });

    let api_config = ApiConfig { listen_addr: args.apilisten };
    let listener = tokio::net::TcpListener::bind(api_config.listen_addr)
        .await
        .with_context(|| format!("binding API listener on {}", api_config.listen_addr))?;
    info!(addr = %api_config.listen_addr, "API server listening");

    let router = grove_api::build_router(api_state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal(notified: Arc<Notify>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("installing Ctrl+C handler");
    };
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };
    let quit = async { notified.notified().await };

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = sigterm => info!("received SIGTERM, shutting down"),
        _ = quit => info!("received /api/quit, shutting down"),
    }
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

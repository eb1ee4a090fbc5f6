//! grove-api
//!
//! The REST surface over a running node's `GroupMgr` (spec §6 "EXTERNAL
//! INTERFACES"). Grounded on `rishy2211-mlsnitch/api-gateway`'s axum 0.8
//! `Router`/`SharedState`/`routes/*.rs` layering — handlers are thin
//! adapters from JSON to `grove-group`/`grove-chain` calls, with no
//! business logic of their own.

pub mod config;
pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ApiConfig;
pub use server::build_router;
pub use state::{AppState, SharedState};

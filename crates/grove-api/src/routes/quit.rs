//! `GET /api/quit` (spec §6: "sends SIGTERM to the running process"),
//! mirroring `original_source/api/server.go`'s `quitapp` handler writing to
//! its signal channel — here we raise the real signal so the same
//! `tokio::signal::unix` handler `grove-node` installs for an operator's
//! `kill` catches it too.

use axum::http::StatusCode;
use axum::extract::State;

use crate::state::SharedState;

pub async fn quit(State(state): State<SharedState>) -> StatusCode {
    state.shutdown.notify_one();
    // SAFETY: raising a signal at ourselves, no pointers involved.
    unsafe {
        libc::kill(libc::getpid(), libc::SIGTERM);
    }
    StatusCode::OK
}

//! API server configuration (spec §6 `--apilisten`).

use std::net::SocketAddr;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5001"
                .parse()
                .expect("hard-coded API listen address should parse"),
        }
    }
}

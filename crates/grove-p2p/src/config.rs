/// Configuration for the Grove P2P network (spec §6 node flags).
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Local listen address (e.g. "/ip4/0.0.0.0/tcp/7777").
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Protocol version string advertised to peers, `<base>/<version>`.
    pub protocol_version: String,
    /// Rendezvous string used for peer discovery (spec §6 `--rendezvous`).
    pub rendezvous: String,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7777".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: format!("{}/1.0.0", grove_core::constants::PROTOCOL_PREFIX_BASE),
            rendezvous: "grove-default".into(),
        }
    }
}

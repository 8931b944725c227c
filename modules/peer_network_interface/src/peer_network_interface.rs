//! Upstream Cardano nodes as chain follower peers
//!
//! Each configured node gets a [`PeerConnection`] speaking node-to-node
//! chain-sync and block-fetch through pallas.

mod configuration;
mod connection;

pub use configuration::InterfaceConfig;
pub use connection::{PeerConnection, from_pallas_point, to_pallas_point};

use follower_module_chain_db::peer::{ChainPeer, PeerId};
use std::sync::Arc;

/// Open connections to the configured nodes, numbering peers in order
pub fn connect_peers(cfg: &InterfaceConfig) -> Vec<Arc<dyn ChainPeer>> {
    cfg.peer_addresses()
        .iter()
        .enumerate()
        .map(|(index, address)| {
            let peer = PeerConnection::connect(PeerId(index as u64), address.clone(), cfg.magic_number);
            Arc::new(peer) as Arc<dyn ChainPeer>
        })
        .collect()
}

//! Block download for collected extensions and forks
//!
//! Bodies are fetched from the peer that reported them and written to the
//! volatile store before chain selection runs. Anything a peer cannot
//! deliver is dropped for this round.

use crate::{
    chain_fork::ForkHeaders,
    extensions::{PeerSession, UniqueExtensions},
    peer::{ChainPeer, PeerId},
    volatile_db::VolatileDb,
};
use anyhow::{bail, Result};
use follower_codec::MultiEraHeader;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Headers and forks whose blocks are all stored
#[derive(Debug, Default)]
pub struct Downloaded {
    pub extensions: Vec<MultiEraHeader>,
    pub forks: Vec<ForkHeaders>,
}

/// Fetch and store the blocks of one round's extensions and forks
pub async fn download_blocks(
    db: &VolatileDb,
    sessions: &[PeerSession],
    collected: UniqueExtensions,
) -> Downloaded {
    let peer_of = |id: PeerId| -> Option<Arc<dyn ChainPeer>> {
        sessions.iter().find(|s| s.id() == id).map(|s| s.peer().clone())
    };

    let extensions = join_all(collected.extensions.into_iter().filter_map(|(id, header)| {
        let peer = peer_of(id)?;
        Some(async move {
            let stored = download(db, peer.as_ref(), std::slice::from_ref(&header)).await;
            accepted(id, &header, stored).then_some(header)
        })
    }));

    let forks = join_all(collected.forks.into_iter().filter_map(|(id, fork)| {
        let peer = peer_of(id)?;
        let last = fork.headers.last()?.clone();
        Some(async move {
            let stored = download(db, peer.as_ref(), &fork.headers).await;
            accepted(id, &last, stored).then_some(fork)
        })
    }));

    let (extensions, forks) = futures::join!(extensions, forks);
    Downloaded {
        extensions: extensions.into_iter().flatten().collect(),
        forks: forks.into_iter().flatten().collect(),
    }
}

fn accepted(peer: PeerId, header: &MultiEraHeader, stored: Result<bool>) -> bool {
    match stored {
        Ok(true) => true,
        Ok(false) => {
            warn!(%peer, point = %header.point(), "Peer has no blocks up to header");
            false
        }
        Err(e) => {
            warn!(%peer, point = %header.point(), "Block download failed: {e:#}");
            false
        }
    }
}

/// Store the blocks of consecutive `headers`; `false` if the peer lacks them
async fn download(db: &VolatileDb, peer: &dyn ChainPeer, headers: &[MultiEraHeader]) -> Result<bool> {
    let (Some(first), Some(last)) = (headers.first(), headers.last()) else {
        return Ok(true);
    };

    let mut stored = true;
    for header in headers {
        if !db.contains(&header.point()).await? {
            stored = false;
            break;
        }
    }
    if stored {
        return Ok(true);
    }

    let Some(bodies) = peer.request_range(first.point(), last.point()).await? else {
        return Ok(false);
    };
    if bodies.len() != headers.len() {
        bail!("expected {} blocks, peer sent {}", headers.len(), bodies.len());
    }

    for (header, body) in headers.iter().zip(&bodies) {
        db.put_block(header, body).await?;
    }
    debug!(peer = %peer.id(), from = %first.point(), count = bodies.len(), "Downloaded blocks");
    Ok(true)
}

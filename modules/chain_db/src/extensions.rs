//! Unique-extension collection
//!
//! Turns one round of per-peer chain-sync replies into the distinct single
//! header extensions and the distinct forks reported by the peers. A
//! rollback is followed up on that peer until its reported tip, so the
//! whole fork fragment is known before chain selection sees it.

use crate::{
    chain_fork::ForkHeaders,
    peer::{ChainPeer, NextResponse, PeerError, PeerId},
};
use follower_codec::{CodecError, MultiEraHeader};
use follower_common::{Point, RealPoint};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("peer reached its tip while a fork was being collected")]
    UnnoticedTip,

    #[error("peer rolled back twice without rolling forward")]
    UnexpectedRollback,

    #[error("peer rolled back to {0} but reports origin as its tip")]
    InvalidPeerTip(Point),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Peer(#[from] PeerError),
}

/// Per-peer chain-sync state kept across rounds
pub struct PeerSession {
    peer: Arc<dyn ChainPeer>,
    rolled_back: bool,
}

impl PeerSession {
    pub fn new(peer: Arc<dyn ChainPeer>) -> Self {
        Self {
            peer,
            rolled_back: false,
        }
    }

    pub fn id(&self) -> PeerId {
        self.peer.id()
    }

    pub fn peer(&self) -> &Arc<dyn ChainPeer> {
        &self.peer
    }

    /// Whether the last reply was a rollback not yet followed by a header
    pub fn rolled_back(&self) -> bool {
        self.rolled_back
    }
}

/// Distinct updates of one round, tagged with the first peer reporting each
#[derive(Debug, Default)]
pub struct UniqueExtensions {
    pub extensions: Vec<(PeerId, MultiEraHeader)>,
    pub forks: Vec<(PeerId, ForkHeaders)>,
    /// Peers whose session violated the protocol or failed
    pub failures: Vec<(PeerId, CollectError)>,
}

impl UniqueExtensions {
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.forks.is_empty()
    }

    fn push_extension(&mut self, peer: PeerId, header: MultiEraHeader) {
        let hash = header.hash();
        if self.extensions.iter().any(|(_, h)| h.hash() == hash) {
            debug!(%peer, %hash, "Duplicate extension");
            return;
        }
        self.extensions.push((peer, header));
    }

    fn push_fork(&mut self, peer: PeerId, fork: ForkHeaders) {
        let fork_points = fork.to_fork();
        if self.forks.iter().any(|(_, f)| f.to_fork() == fork_points) {
            debug!(%peer, intersection = %fork.intersection, "Duplicate fork");
            return;
        }
        self.forks.push((peer, fork));
    }
}

enum PeerUpdate {
    Extension(MultiEraHeader),
    Fork(ForkHeaders),
    Unchanged,
}

/// Classify one round of replies, `responses[i]` coming from `sessions[i]`
///
/// Forks are collected from all peers concurrently; deduplication keeps the
/// first report in session order.
pub async fn collect_unique_extensions(
    sessions: &mut [PeerSession],
    responses: Vec<Result<NextResponse, PeerError>>,
    our_tip: Point,
) -> UniqueExtensions {
    let updates = join_all(
        sessions
            .iter_mut()
            .zip(responses)
            .map(|(session, response)| async move {
                let id = session.id();
                (id, collect_from_peer(session, response, our_tip).await)
            }),
    )
    .await;

    let mut result = UniqueExtensions::default();
    for (peer, update) in updates {
        match update {
            Ok(PeerUpdate::Extension(header)) => result.push_extension(peer, header),
            Ok(PeerUpdate::Fork(fork)) => result.push_fork(peer, fork),
            Ok(PeerUpdate::Unchanged) => {}
            Err(e) => {
                warn!(%peer, "Chain-sync session failed: {e}");
                result.failures.push((peer, e));
            }
        }
    }
    result
}

async fn collect_from_peer(
    session: &mut PeerSession,
    response: Result<NextResponse, PeerError>,
    our_tip: Point,
) -> Result<PeerUpdate, CollectError> {
    match response? {
        NextResponse::RollForward(wrapped, _) => {
            session.rolled_back = false;
            Ok(PeerUpdate::Extension(wrapped.decode()?))
        }
        NextResponse::RollBackward(point, tip) => {
            if session.rolled_back {
                return Err(CollectError::UnexpectedRollback);
            }
            session.rolled_back = true;

            if point == tip || point == our_tip {
                debug!(peer = %session.id(), %point, "Rollback needs no fork");
                return Ok(PeerUpdate::Unchanged);
            }
            let Some(target) = tip.as_real() else {
                return Err(CollectError::InvalidPeerTip(point));
            };

            let fork = collect_fork(session.peer.as_ref(), point, target).await?;
            session.rolled_back = false;
            Ok(PeerUpdate::Fork(fork))
        }
        NextResponse::AwaitReply => Ok(PeerUpdate::Unchanged),
    }
}

/// Request headers after a rollback to `intersection` until `target`
async fn collect_fork(
    peer: &dyn ChainPeer,
    intersection: Point,
    target: RealPoint,
) -> Result<ForkHeaders, CollectError> {
    let mut headers = Vec::new();
    loop {
        match peer.request_next().await? {
            NextResponse::RollForward(wrapped, _) => {
                let header = wrapped.decode()?;
                let reached = header.point() == target;
                headers.push(header);
                if reached {
                    debug!(peer = %peer.id(), %intersection, length = headers.len(), "Collected fork");
                    return Ok(ForkHeaders {
                        intersection,
                        headers,
                    });
                }
            }
            NextResponse::RollBackward(..) => return Err(CollectError::UnexpectedRollback),
            NextResponse::AwaitReply => return Err(CollectError::UnnoticedTip),
        }
    }
}

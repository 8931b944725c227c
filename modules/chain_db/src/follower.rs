//! Multi-peer chain following loop
//!
//! Each round asks every peer for its next update, collects the distinct
//! extensions and forks, downloads their blocks and only then applies chain
//! selection. Peers that violate the protocol are dropped from later rounds.

use crate::{
    chain_sel::{ChainSel, ChainSelObserver, Selection},
    download::download_blocks,
    extensions::{collect_unique_extensions, PeerSession},
    peer::{ChainPeer, PeerId},
    ChainDb,
};
use anyhow::{bail, Result};
use follower_common::Point;
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, info_span, warn, Instrument};

/// Pause after a round in which no peer had anything new
const IDLE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub extensions: usize,
    pub forks: usize,
    pub selections: Vec<Selection>,
    /// Peers torn down this round
    pub disconnected: Vec<PeerId>,
}

impl RoundReport {
    pub fn is_idle(&self) -> bool {
        self.extensions == 0 && self.forks == 0
    }
}

pub struct ChainFollower {
    chain_db: ChainDb,
    selection: ChainSel,
    sessions: Vec<PeerSession>,
}

impl ChainFollower {
    pub fn new(chain_db: ChainDb, observer: Arc<dyn ChainSelObserver>) -> Self {
        Self {
            chain_db,
            selection: ChainSel::new(observer),
            sessions: Vec::new(),
        }
    }

    pub fn add_peer(&mut self, peer: Arc<dyn ChainPeer>) {
        info!(peer = %peer.id(), "Following peer");
        self.sessions.push(PeerSession::new(peer));
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.sessions.iter().map(PeerSession::id).collect()
    }

    pub fn chain_db(&self) -> &ChainDb {
        &self.chain_db
    }

    /// Position every peer on the newest point of main it knows
    ///
    /// Peers that cannot be reached are dropped.
    pub async fn intersect(&mut self) -> Vec<(PeerId, Option<Point>)> {
        let points = self.chain_db.volatile().intersect_points();
        let results = join_all(
            self.sessions
                .iter()
                .map(|s| s.peer().find_intersect(points.clone())),
        )
        .await;

        let mut found = Vec::new();
        let mut failed = Vec::new();
        for (session, result) in self.sessions.iter().zip(results) {
            let peer = session.id();
            match result {
                Ok((Some(point), tip)) => {
                    info!(%peer, %point, %tip, "Found intersection");
                    found.push((peer, Some(point)));
                }
                Ok((None, tip)) => {
                    warn!(%peer, %tip, "No intersection found, peer starts from origin");
                    found.push((peer, None));
                }
                Err(e) => {
                    warn!(%peer, "Intersection failed: {e}");
                    failed.push(peer);
                }
            }
        }
        self.disconnect(&failed);
        found
    }

    /// Run one collect, download and select round
    pub async fn step(&mut self) -> RoundReport {
        let span = info_span!("follower.round", peers = self.sessions.len());
        self.do_step().instrument(span).await
    }

    async fn do_step(&mut self) -> RoundReport {
        let responses = join_all(self.sessions.iter().map(|s| s.peer().request_next())).await;

        let our_tip = self.chain_db.volatile().tip();
        let collected = collect_unique_extensions(&mut self.sessions, responses, our_tip).await;
        let disconnected: Vec<PeerId> = collected.failures.iter().map(|(peer, _)| *peer).collect();
        self.disconnect(&disconnected);

        let extensions = collected.extensions.len();
        let forks = collected.forks.len();
        let downloaded = download_blocks(self.chain_db.volatile(), &self.sessions, collected).await;

        let selections = self
            .selection
            .select_batch(&mut self.chain_db, &downloaded.extensions, &downloaded.forks)
            .await;
        debug!(extensions, forks, ?selections, tip = %self.chain_db.volatile().tip(), "Round done");

        RoundReport {
            extensions,
            forks,
            selections,
            disconnected,
        }
    }

    /// Follow the peers until none is left
    pub async fn run(&mut self) -> Result<()> {
        self.intersect().await;
        loop {
            if self.sessions.is_empty() {
                bail!("No peers left to follow");
            }
            if self.step().await.is_idle() {
                tokio::time::sleep(IDLE_DELAY).await;
            }
        }
    }

    fn disconnect(&mut self, peers: &[PeerId]) {
        if peers.is_empty() {
            return;
        }
        self.sessions.retain(|session| {
            let dropped = peers.contains(&session.id());
            if dropped {
                warn!(peer = %session.id(), "Disconnecting peer");
            }
            !dropped
        });
    }
}

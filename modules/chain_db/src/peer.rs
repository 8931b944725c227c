//! Upstream peer abstraction
//!
//! A [`ChainPeer`] is one chain-sync plus block-fetch session. The follower
//! only needs the request/response shape of those protocols; transports
//! implement this trait.

use async_trait::async_trait;
use follower_codec::WrappedHeader;
use follower_common::{Point, RealPoint};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Reply to a chain-sync `RequestNext`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextResponse {
    /// A header and the peer's tip
    RollForward(WrappedHeader, Point),
    /// Rollback point and the peer's tip
    RollBackward(Point, Point),
    /// The peer is at its tip and has nothing new yet
    AwaitReply,
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait ChainPeer: Send + Sync {
    fn id(&self) -> PeerId;

    /// Ask for the next chain update without blocking at the tip
    async fn request_next(&self) -> Result<NextResponse, PeerError>;

    /// Find the newest of `points` the peer knows; returns it and the peer's tip
    async fn find_intersect(&self, points: Vec<Point>)
    -> Result<(Option<Point>, Point), PeerError>;

    /// Fetch the bodies of the blocks from `from` to `to` inclusive
    ///
    /// `None` if the peer does not have the whole range.
    async fn request_range(
        &self,
        from: RealPoint,
        to: RealPoint,
    ) -> Result<Option<Vec<Vec<u8>>>, PeerError>;
}

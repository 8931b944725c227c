use anyhow::{Result, bail};
use async_trait::async_trait;
use follower_codec::WrappedHeader;
use follower_common::{BlockHash, Era, Point, RealPoint};
use follower_module_chain_db::peer::{ChainPeer, NextResponse, PeerError, PeerId};
use pallas::network::{
    facades::PeerClient,
    miniprotocols::{self, blockfetch, chainsync},
};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, info};

type Reply<T> = oneshot::Sender<Result<T, PeerError>>;

/// Handle on a node-to-node connection served by a background worker
pub struct PeerConnection {
    id: PeerId,
    pub address: String,
    chainsync: mpsc::UnboundedSender<ChainsyncCommand>,
    blockfetch: mpsc::UnboundedSender<BlockfetchCommand>,
}

impl PeerConnection {
    /// Start connecting to `address`; requests queue until the handshake is done
    pub fn connect(id: PeerId, address: String, magic: u32) -> Self {
        let worker = PeerConnectionWorker {
            id,
            address: address.clone(),
            magic,
        };
        let (chainsync_tx, chainsync_rx) = mpsc::unbounded_channel();
        let (blockfetch_tx, blockfetch_rx) = mpsc::unbounded_channel();
        tokio::spawn(worker.run(chainsync_rx, blockfetch_rx));
        Self {
            id,
            address,
            chainsync: chainsync_tx,
            blockfetch: blockfetch_tx,
        }
    }
}

async fn call<C, T>(
    commands: &mpsc::UnboundedSender<C>,
    command: impl FnOnce(Reply<T>) -> C,
) -> Result<T, PeerError> {
    let (tx, rx) = oneshot::channel();
    commands.send(command(tx)).map_err(|_| PeerError::Closed)?;
    rx.await.map_err(|_| PeerError::Closed)?
}

#[async_trait]
impl ChainPeer for PeerConnection {
    fn id(&self) -> PeerId {
        self.id
    }

    async fn request_next(&self) -> Result<NextResponse, PeerError> {
        call(&self.chainsync, ChainsyncCommand::RequestNext).await
    }

    async fn find_intersect(&self, points: Vec<Point>) -> Result<(Option<Point>, Point), PeerError> {
        let points = points.iter().map(to_pallas_point).collect();
        call(&self.chainsync, |reply| ChainsyncCommand::FindIntersect(points, reply)).await
    }

    async fn request_range(
        &self,
        from: RealPoint,
        to: RealPoint,
    ) -> Result<Option<Vec<Vec<u8>>>, PeerError> {
        let range = (to_pallas_point(&from.into()), to_pallas_point(&to.into()));
        call(&self.blockfetch, |reply| BlockfetchCommand::FetchRange(range, reply)).await
    }
}

enum ChainsyncCommand {
    RequestNext(Reply<NextResponse>),
    FindIntersect(Vec<miniprotocols::Point>, Reply<(Option<Point>, Point)>),
}

enum BlockfetchCommand {
    FetchRange((miniprotocols::Point, miniprotocols::Point), Reply<Option<Vec<Vec<u8>>>>),
}

struct PeerConnectionWorker {
    id: PeerId,
    address: String,
    magic: u32,
}

impl PeerConnectionWorker {
    async fn run(
        self,
        chainsync: mpsc::UnboundedReceiver<ChainsyncCommand>,
        blockfetch: mpsc::UnboundedReceiver<BlockfetchCommand>,
    ) {
        if let Err(err) = self.do_run(chainsync, blockfetch).await {
            error!(peer = %self.id, address = self.address, "{err:#}");
        }
    }

    async fn do_run(
        &self,
        chainsync: mpsc::UnboundedReceiver<ChainsyncCommand>,
        blockfetch: mpsc::UnboundedReceiver<BlockfetchCommand>,
    ) -> Result<()> {
        let client = PeerClient::connect(self.address.clone(), self.magic.into()).await?;
        info!(peer = %self.id, address = self.address, "Connected");
        select! {
            res = self.run_chainsync(client.chainsync, chainsync) => res,
            res = self.run_blockfetch(client.blockfetch, blockfetch) => res,
        }
    }

    async fn run_chainsync(
        &self,
        mut client: chainsync::N2NClient,
        mut commands: mpsc::UnboundedReceiver<ChainsyncCommand>,
    ) -> Result<()> {
        while let Some(cmd) = commands.recv().await {
            match cmd {
                ChainsyncCommand::RequestNext(reply) => {
                    // After an await reply the next message is already on its way
                    let msg = if client.has_agency() {
                        client.request_next().await
                    } else {
                        client.recv_while_must_reply().await
                    };
                    let response = msg.map_err(protocol_error).and_then(to_next_response);
                    let _ = reply.send(response);
                }
                ChainsyncCommand::FindIntersect(points, reply) => {
                    if !client.has_agency() {
                        client.recv_while_must_reply().await?;
                    }
                    let result = match client.find_intersect(points).await {
                        Ok((point, tip)) => from_pallas_point(tip.0).and_then(|tip| {
                            let point = point.map(from_pallas_point).transpose()?;
                            Ok((point, tip))
                        }),
                        Err(e) => Err(protocol_error(e)),
                    };
                    let _ = reply.send(result);
                }
            }
        }
        bail!("peer handle dropped");
    }

    async fn run_blockfetch(
        &self,
        mut client: blockfetch::Client,
        mut commands: mpsc::UnboundedReceiver<BlockfetchCommand>,
    ) -> Result<()> {
        while let Some(BlockfetchCommand::FetchRange(range, reply)) = commands.recv().await {
            let result = match client.fetch_range(range).await {
                Ok(bodies) => Ok(Some(bodies)),
                Err(blockfetch::ClientError::NoBlocks) => Ok(None),
                Err(e) => Err(protocol_error(e)),
            };
            if let Ok(Some(bodies)) = &result {
                debug!(peer = %self.id, count = bodies.len(), "Fetched blocks");
            }
            let _ = reply.send(result);
        }
        bail!("peer handle dropped");
    }
}

fn protocol_error(e: impl std::fmt::Display) -> PeerError {
    PeerError::Protocol(e.to_string())
}

fn to_next_response(
    msg: chainsync::NextResponse<chainsync::HeaderContent>,
) -> Result<NextResponse, PeerError> {
    match msg {
        chainsync::NextResponse::RollForward(header, tip) => Ok(NextResponse::RollForward(
            wrap_header(header)?,
            from_pallas_point(tip.0)?,
        )),
        chainsync::NextResponse::RollBackward(point, tip) => Ok(NextResponse::RollBackward(
            from_pallas_point(point)?,
            from_pallas_point(tip.0)?,
        )),
        chainsync::NextResponse::Await => Ok(NextResponse::AwaitReply),
    }
}

fn wrap_header(header: chainsync::HeaderContent) -> Result<WrappedHeader, PeerError> {
    let era = Era::try_from(header.variant).map_err(protocol_error)?;
    Ok(WrappedHeader {
        era,
        byron_prefix: header.byron_prefix,
        cbor: header.cbor,
    })
}

pub fn to_pallas_point(point: &Point) -> miniprotocols::Point {
    match point {
        Point::Origin => miniprotocols::Point::Origin,
        Point::Specific { slot, hash } => miniprotocols::Point::Specific(*slot, hash.to_vec()),
    }
}

pub fn from_pallas_point(point: miniprotocols::Point) -> Result<Point, PeerError> {
    match point {
        miniprotocols::Point::Origin => Ok(Point::Origin),
        miniprotocols::Point::Specific(slot, hash) => {
            let hash = BlockHash::try_from(hash.as_slice())
                .map_err(|_| PeerError::Protocol(format!("invalid hash length {}", hash.len())))?;
            Ok(Point::Specific { slot, hash })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_convert_both_ways() {
        let point = Point::Specific {
            slot: 42,
            hash: BlockHash::new([7; 32]),
        };
        let pallas = to_pallas_point(&point);
        assert_eq!(pallas, miniprotocols::Point::Specific(42, vec![7; 32]));
        assert_eq!(from_pallas_point(pallas).unwrap(), point);
        assert_eq!(to_pallas_point(&Point::Origin), miniprotocols::Point::Origin);
    }

    #[test]
    fn short_hashes_are_rejected() {
        let result = from_pallas_point(miniprotocols::Point::Specific(1, vec![0; 28]));
        assert!(matches!(result, Err(PeerError::Protocol(_))));
    }

    #[test]
    fn byron_header_content_keeps_its_prefix() {
        let header = chainsync::HeaderContent {
            variant: 0,
            byron_prefix: Some((1, 812)),
            cbor: vec![0x85],
        };
        let wrapped = wrap_header(header).unwrap();
        assert_eq!(wrapped.era, Era::Byron);
        assert_eq!(wrapped.byron_prefix, Some((1, 812)));
        assert_eq!(wrapped.cbor, vec![0x85]);
    }

    #[test]
    fn unknown_era_variant_is_a_protocol_error() {
        let header = chainsync::HeaderContent {
            variant: 12,
            byron_prefix: None,
            cbor: vec![],
        };
        assert!(matches!(wrap_header(header), Err(PeerError::Protocol(_))));
    }

    #[tokio::test]
    async fn unreachable_peer_reports_closed() {
        let peer = PeerConnection::connect(PeerId(0), "127.0.0.1:1".to_string(), 2);
        assert_eq!(peer.id(), PeerId(0));
        assert!(matches!(peer.request_next().await, Err(PeerError::Closed)));
    }
}

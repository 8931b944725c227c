//! Chain selection
//!
//! Decides how a newly stored header or fork changes the chain: extend main,
//! grow or open a fork (switching to it once strictly longer), or keep it as
//! an orphan. Ties always keep the current chain.

use crate::{
    chain_fork::ForkHeaders,
    db_error::ChainDbError,
    immutable_db::ImmutableTip,
    volatile_db::SwitchOutcome,
    ChainDb, ExtendOutcome,
};
use follower_codec::MultiEraHeader;
use follower_common::{BlockHash, Point};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of selecting one header or fork
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Previously rejected
    Invalid,
    /// At or behind the immutable tip
    TooOld,
    AlreadyKnown,
    ExtendedMain,
    /// Grew or opened a fork, possibly adopting it
    Fork { switched: bool },
    /// Unconnected to main or any fork
    Orphaned,
}

/// Callback receiver for chain selection events
pub trait ChainSelObserver: Send + Sync {
    /// A header already known to be invalid was offered again
    fn block_invalid(&self, hash: BlockHash);

    /// Main was rolled back to `intersection` and now ends at `tip`
    fn chain_switched(&self, intersection: Point, tip: Point);
}

/// Observer that only logs
pub struct LoggingObserver;

impl ChainSelObserver for LoggingObserver {
    fn block_invalid(&self, hash: BlockHash) {
        warn!(%hash, "Ignoring invalid block");
    }

    fn chain_switched(&self, intersection: Point, tip: Point) {
        info!(%intersection, %tip, "Chain switched");
    }
}

pub struct ChainSel {
    observer: Arc<dyn ChainSelObserver>,
}

impl ChainSel {
    pub fn new(observer: Arc<dyn ChainSelObserver>) -> Self {
        Self { observer }
    }

    /// Whether a header is at or behind the immutable tip
    ///
    /// A boundary block shares its number with the block before it, so one
    /// carrying exactly the immutable tip's number may still follow it.
    pub fn is_older_than_k(header: &MultiEraHeader, immutable_tip: Option<&ImmutableTip>) -> bool {
        let Some(tip) = immutable_tip else {
            return false;
        };
        if header.is_boundary() && header.block_number() == tip.block_number {
            return false;
        }
        header.block_number() <= tip.block_number
    }

    /// Select a single stored header
    ///
    /// A rejected header's files are scheduled for removal.
    pub async fn select_block(
        &self,
        db: &mut ChainDb,
        header: &MultiEraHeader,
    ) -> Result<Selection, ChainDbError> {
        let point = header.point();
        if !db.volatile().contains(&point).await? {
            return Err(ChainDbError::UnreachableBlock { point });
        }

        let volatile = db.volatile();
        if volatile.is_invalid(&point.hash) {
            self.observer.block_invalid(point.hash);
            db.volatile_mut().discard(point);
            return Ok(Selection::Invalid);
        }
        if Self::is_older_than_k(header, volatile.immutable_tip()) {
            debug!(%point, number = header.block_number(), "Header is older than k");
            db.volatile_mut().discard(point);
            return Ok(Selection::TooOld);
        }
        if volatile.is_adopted(&point) {
            return Ok(Selection::AlreadyKnown);
        }

        if volatile.extends_tip(header) && db.extend_main(header).await == ExtendOutcome::Extended {
            return Ok(Selection::ExtendedMain);
        }

        let volatile = db.volatile();
        if let Some(index) = volatile.fork_with_tip(&header.prev_hash()) {
            db.volatile_mut().extend_fork(index, header);
            let switched = self.try_switch(db, index).await;
            return Ok(Selection::Fork { switched });
        }

        // A sibling of a block on main opens a new fork at its parent
        let parent = volatile.main().iter().find(|p| p.hash == header.prev_hash()).copied();
        if let Some(parent) = parent {
            let index = db.volatile_mut().add_fork(parent.into(), std::slice::from_ref(header));
            let switched = self.try_switch(db, index).await;
            return Ok(Selection::Fork { switched });
        }

        debug!(%point, "Keeping unconnected header as orphan");
        db.volatile_mut().add_orphan(point);
        Ok(Selection::Orphaned)
    }

    /// Select a fork whose blocks are all stored
    pub async fn select_fork(
        &self,
        db: &mut ChainDb,
        fork: &ForkHeaders,
    ) -> Result<Selection, ChainDbError> {
        for header in &fork.headers {
            let point = header.point();
            if !db.volatile().contains(&point).await? {
                return Err(ChainDbError::UnreachableBlock { point });
            }
        }

        let mut intersection = fork.intersection;
        let mut headers = fork.headers.as_slice();

        let invalid = headers.iter().position(|h| db.volatile().is_invalid(&h.hash()));
        if let Some(position) = invalid {
            self.observer.block_invalid(headers[position].hash());
            let volatile = db.volatile_mut();
            for header in &headers[position..] {
                volatile.discard(header.point());
            }
            headers = &headers[..position];
        }

        let volatile = db.volatile();

        // Blocks main already has only move the intersection forward
        while let Some((first, rest)) = headers.split_first() {
            if !volatile.is_on_main(&first.point()) {
                break;
            }
            intersection = first.point().into();
            headers = rest;
        }

        let Some(last) = headers.last() else {
            return Ok(Selection::AlreadyKnown);
        };
        if Self::is_older_than_k(last, volatile.immutable_tip()) {
            let volatile = db.volatile_mut();
            for header in headers {
                volatile.discard(header.point());
            }
            return Ok(Selection::TooOld);
        }

        if volatile.get_distance_from_tip(&intersection).is_none() {
            info!(%intersection, length = headers.len(), "Fork intersection is not on main, orphaning it");
            let volatile = db.volatile_mut();
            for header in headers {
                volatile.add_orphan(header.point());
            }
            return Ok(Selection::Orphaned);
        }

        let index = db.volatile_mut().add_fork(intersection, headers);
        let switched = self.try_switch(db, index).await;
        Ok(Selection::Fork { switched })
    }

    /// Select one round's extensions and forks
    ///
    /// Extensions go first, in block number order, so forks are weighed
    /// against the updated tip. A header that fails selection is logged and
    /// skipped.
    pub async fn select_batch(
        &self,
        db: &mut ChainDb,
        extensions: &[MultiEraHeader],
        forks: &[ForkHeaders],
    ) -> Vec<Selection> {
        let mut ordered: Vec<&MultiEraHeader> = extensions.iter().collect();
        ordered.sort_by_key(|h| (h.block_number(), h.slot()));

        let mut selections = Vec::with_capacity(extensions.len() + forks.len());
        for header in ordered {
            match self.select_block(db, header).await {
                Ok(selection) => selections.push(selection),
                Err(e) => error!("Selection of {} failed: {e}", header.point()),
            }
        }
        for fork in forks {
            match self.select_fork(db, fork).await {
                Ok(selection) => selections.push(selection),
                Err(e) => error!("Selection of fork at {} failed: {e}", fork.intersection),
            }
        }
        selections
    }

    async fn try_switch(&self, db: &mut ChainDb, index: usize) -> bool {
        let Some(intersection) = db.volatile().forks().get(index).map(|f| f.intersection) else {
            return false;
        };
        match db.try_switch_to_fork(index).await {
            SwitchOutcome::Switched => {
                self.observer.chain_switched(intersection, db.volatile().tip());
                true
            }
            _ => false,
        }
    }
}

//! Volatile chain database
//!
//! Owns the adopted chain within the rollback window (`main`), the competing
//! forks, the orphan pool and the blocks awaiting migration to the immutable
//! store. Block headers and bodies live on disk as one file each, keyed by
//! `{hash}-{slot}`; headers are kept in their era envelope. The chain
//! structure itself is held in memory, and after a restart resumes from the
//! immutable tip.

use crate::{
    chain_fork::ChainFork, configuration::ChainDbConfig, db_error::ChainDbError,
    immutable_db::{ImmutableDb, ImmutableTip},
};
use follower_codec::{MultiEraHeader, WrappedHeader};
use follower_common::{BlockHash, Point, RealPoint};
use std::{
    collections::{HashMap, HashSet},
    io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, error, info, warn};

const HEADERS_DIR: &str = "headers";
const BLOCKS_DIR: &str = "blocks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    Extended,
    /// The header no longer builds on the tip
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// The fork is not longer than what it would replace
    Kept,
    /// The fork's intersection left `main`; its blocks were orphaned
    IntersectionLost,
    NoSuchFork,
}

pub struct VolatileDb {
    headers_dir: PathBuf,
    blocks_dir: PathBuf,
    security_parameter: usize,
    migration_batch: usize,

    main: Vec<RealPoint>,
    forks: Vec<ChainFork>,
    orphans: Vec<RealPoint>,
    immutable: Vec<RealPoint>,
    /// Migrated or discarded points whose files are still to be removed
    pending_deletions: Vec<RealPoint>,

    /// Block numbers of the points on main and in forks
    block_numbers: HashMap<BlockHash, u64>,
    immutable_tip: Option<ImmutableTip>,
    invalid: HashSet<BlockHash>,
}

impl VolatileDb {
    /// Open the store on top of the immutable chain ending at `immutable_tip`
    ///
    /// Files of blocks at or behind the immutable tip are left over from an
    /// interrupted collection and are removed.
    pub async fn open(
        path: impl AsRef<Path>,
        config: &ChainDbConfig,
        immutable_tip: Option<ImmutableTip>,
    ) -> Result<Self, ChainDbError> {
        let path = path.as_ref();
        let headers_dir = path.join(HEADERS_DIR);
        let blocks_dir = path.join(BLOCKS_DIR);
        for dir in [&headers_dir, &blocks_dir] {
            fs::create_dir_all(dir).await.map_err(ChainDbError::io(dir))?;
            if let Some(tip) = &immutable_tip {
                remove_settled_files(dir, tip.point.slot).await?;
            }
        }

        Ok(Self {
            headers_dir,
            blocks_dir,
            security_parameter: config.security_parameter as usize,
            migration_batch: config.migration_batch,
            main: Vec::new(),
            forks: Vec::new(),
            orphans: Vec::new(),
            immutable: Vec::new(),
            pending_deletions: Vec::new(),
            block_numbers: HashMap::new(),
            immutable_tip,
            invalid: HashSet::new(),
        })
    }

    // ── Block storage ──────────────────────────────────────────────────

    fn key(point: &RealPoint) -> String {
        format!("{}-{}", point.hash, point.slot)
    }

    fn header_path(&self, point: &RealPoint) -> PathBuf {
        self.headers_dir.join(Self::key(point))
    }

    fn block_path(&self, point: &RealPoint) -> PathBuf {
        self.blocks_dir.join(Self::key(point))
    }

    /// Persist a header and its block body
    ///
    /// The body is written first, so a stored header implies a stored body.
    /// The header is wrapped with its era, which its bytes alone do not
    /// always determine.
    pub async fn put_block(&self, header: &MultiEraHeader, block: &[u8]) -> Result<(), ChainDbError> {
        let point = header.point();
        let block_path = self.block_path(&point);
        fs::write(&block_path, block)
            .await
            .map_err(ChainDbError::io(&block_path))?;
        let header_path = self.header_path(&point);
        fs::write(&header_path, WrappedHeader::from(header).to_envelope())
            .await
            .map_err(ChainDbError::io(&header_path))?;
        debug!(%point, size = block.len(), "Stored block");
        Ok(())
    }

    /// Look up a stored header; `None` if it was never stored
    pub async fn resolve_point(
        &self,
        point: &RealPoint,
    ) -> Result<Option<MultiEraHeader>, ChainDbError> {
        let Some(bytes) = read_optional(self.header_path(point)).await? else {
            return Ok(None);
        };
        WrappedHeader::from_envelope(&bytes)
            .and_then(|wrapped| wrapped.decode())
            .map(Some)
            .map_err(|source| ChainDbError::CorruptHeader {
                point: *point,
                source,
            })
    }

    pub async fn contains(&self, point: &RealPoint) -> Result<bool, ChainDbError> {
        let path = self.header_path(point);
        fs::try_exists(&path).await.map_err(ChainDbError::io(path))
    }

    pub async fn read_block(&self, point: &RealPoint) -> Result<Option<Vec<u8>>, ChainDbError> {
        read_optional(self.block_path(point)).await
    }

    async fn remove_files(&self, point: &RealPoint) -> Result<(), ChainDbError> {
        for path in [self.header_path(point), self.block_path(point)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(ChainDbError::Io { path, source }),
            }
        }
        Ok(())
    }

    // ── Chain state ────────────────────────────────────────────────────

    pub fn main(&self) -> &[RealPoint] {
        &self.main
    }

    pub fn forks(&self) -> &[ChainFork] {
        &self.forks
    }

    pub fn orphans(&self) -> &[RealPoint] {
        &self.orphans
    }

    pub fn immutable(&self) -> &[RealPoint] {
        &self.immutable
    }

    pub fn immutable_tip(&self) -> Option<&ImmutableTip> {
        self.immutable_tip.as_ref()
    }

    pub fn security_parameter(&self) -> usize {
        self.security_parameter
    }

    /// Oldest block still within the rollback window
    pub fn anchor(&self) -> Option<&RealPoint> {
        self.main.first()
    }

    /// Newest adopted point; the immutable tip or origin when main is empty
    pub fn tip(&self) -> Point {
        match (self.main.last(), &self.immutable_tip) {
            (Some(tip), _) => (*tip).into(),
            (None, Some(immutable)) => immutable.point.into(),
            (None, None) => Point::Origin,
        }
    }

    pub fn block_number(&self, hash: &BlockHash) -> Option<u64> {
        self.block_numbers.get(hash).copied()
    }

    pub fn mark_invalid(&mut self, hash: BlockHash) {
        self.invalid.insert(hash);
    }

    pub fn is_invalid(&self, hash: &BlockHash) -> bool {
        self.invalid.contains(hash)
    }

    pub fn is_on_main(&self, point: &RealPoint) -> bool {
        self.main.contains(point)
    }

    /// On main or in a fork
    pub fn is_adopted(&self, point: &RealPoint) -> bool {
        self.is_on_main(point) || self.forks.iter().any(|f| f.fragment.contains(point))
    }

    pub fn fork_with_tip(&self, hash: &BlockHash) -> Option<usize> {
        self.forks
            .iter()
            .position(|f| f.tip().is_some_and(|tip| tip.hash == *hash))
    }

    /// Distance from `point` to the tip of main, the tip itself being 0
    ///
    /// Origin is only reachable while nothing has become immutable.
    pub fn get_distance_from_tip(&self, point: &Point) -> Option<usize> {
        match point {
            Point::Origin => self.immutable_tip.is_none().then_some(self.main.len()),
            Point::Specific { slot, hash } => self
                .main
                .iter()
                .rev()
                .position(|p| p.slot == *slot && p.hash == *hash),
        }
    }

    /// Recent points of main for intersecting with a peer
    ///
    /// The 5 most recent, then 5 spaced by 10 blocks, then 5 spaced by 100,
    /// followed by the immutable tip and origin.
    pub fn intersect_points(&self) -> Vec<Point> {
        let mut iterator = self.main.iter().rev();
        let mut result: Vec<Point> = iterator.by_ref().take(5).map(|p| (*p).into()).collect();

        let mut iterator = iterator.step_by(10);
        result.extend(iterator.by_ref().take(5).map(|p| Point::from(*p)));
        result.extend(iterator.step_by(10).take(5).map(|p| Point::from(*p)));

        if let Some(immutable) = &self.immutable_tip {
            result.push(immutable.point.into());
        }
        result.push(Point::Origin);
        result
    }

    // ── Chain updates ──────────────────────────────────────────────────

    /// Whether `header` builds directly on the tip
    ///
    /// Before anything is adopted the first header anchors the chain.
    pub fn extends_tip(&self, header: &MultiEraHeader) -> bool {
        match self.tip() {
            Point::Specific { hash, .. } => header.prev_hash() == hash,
            Point::Origin => true,
        }
    }

    /// Append a header that extends the tip of main
    ///
    /// A header that no longer builds on the tip is left alone: another peer
    /// may have moved the tip first. Blocks pushed beyond `k` become
    /// immutable and are migrated once a full batch has built up.
    pub async fn extend_main(
        &mut self,
        header: &MultiEraHeader,
        immutable_db: &mut ImmutableDb,
    ) -> ExtendOutcome {
        if !self.extends_tip(header) {
            debug!(
                slot = header.slot(),
                hash = %header.hash(),
                tip = %self.tip(),
                "Header does not extend the tip, ignoring"
            );
            return ExtendOutcome::Stale;
        }

        let point = header.point();
        self.remove_orphan(&point);
        self.block_numbers.insert(point.hash, header.block_number());
        self.main.push(point);
        debug!(%point, number = header.block_number(), "Extended main chain");

        self.enforce_security_parameter();
        self.collect_if_due(immutable_db).await;
        ExtendOutcome::Extended
    }

    /// Run garbage collection once a full batch is immutable
    pub async fn collect_if_due(&mut self, immutable_db: &mut ImmutableDb) {
        if self.immutable.len() >= self.migration_batch {
            if let Err(e) = self.garbage_collection(immutable_db).await {
                error!("Garbage collection failed, will retry: {e}");
            }
        }
    }

    /// Switch main to the fork at `index` if it is strictly longer than the
    /// part of main it replaces
    ///
    /// The replaced suffix of main becomes the fork's fragment, so the
    /// old chain stays available for a later switch back.
    pub fn try_switch_to_fork(&mut self, index: usize) -> SwitchOutcome {
        let Some(fork) = self.forks.get(index) else {
            return SwitchOutcome::NoSuchFork;
        };
        let intersection = fork.intersection;
        let length = fork.len();

        let Some(distance) = self.get_distance_from_tip(&intersection) else {
            let fork = self.forks.remove(index);
            info!(%intersection, length, "Fork intersection is gone, orphaning fork");
            self.orphan_fragment(fork.fragment);
            return SwitchOutcome::IntersectionLost;
        };

        if length <= distance {
            return SwitchOutcome::Kept;
        }

        let displaced = self.main.split_off(self.main.len() - distance);
        let adopted = std::mem::replace(&mut self.forks[index].fragment, displaced);
        info!(
            %intersection,
            rolled_back = distance,
            adopted = adopted.len(),
            "Switched to fork"
        );
        if self.forks[index].is_empty() {
            self.forks.remove(index);
        }
        self.main.extend(adopted);
        self.enforce_security_parameter();
        SwitchOutcome::Switched
    }

    /// Track a fork reported after `intersection` and return its index
    ///
    /// A fork sharing its intersection and first blocks with a tracked one
    /// is merged with it: the longer continuation is kept and the other
    /// one's unshared blocks are orphaned.
    pub fn add_fork(&mut self, intersection: Point, headers: &[MultiEraHeader]) -> usize {
        let fragment: Vec<RealPoint> = headers.iter().map(MultiEraHeader::point).collect();
        for header in headers {
            self.remove_orphan(&header.point());
            self.block_numbers.insert(header.hash(), header.block_number());
        }

        let overlap = self.forks.iter().enumerate().find_map(|(index, fork)| {
            let shared = fork
                .fragment
                .iter()
                .zip(&fragment)
                .take_while(|(a, b)| a == b)
                .count();
            (fork.intersection == intersection && shared > 0).then_some((index, shared))
        });

        let Some((index, shared)) = overlap else {
            debug!(%intersection, length = fragment.len(), "Tracking new fork");
            self.forks.push(ChainFork::new(intersection, fragment));
            return self.forks.len() - 1;
        };

        let stale = if fragment.len() > self.forks[index].len() {
            let mut replaced = std::mem::replace(&mut self.forks[index].fragment, fragment);
            replaced.split_off(shared)
        } else {
            fragment[shared..].to_vec()
        };
        self.orphan_fragment(stale);
        index
    }

    /// Append a header to the fork whose tip it builds on
    pub fn extend_fork(&mut self, index: usize, header: &MultiEraHeader) -> bool {
        let Some(fork) = self.forks.get_mut(index) else {
            return false;
        };
        let parent = match fork.tip() {
            Some(tip) => Some(tip.hash),
            None => fork.intersection.hash().copied(),
        };
        if parent != Some(header.prev_hash()) {
            return false;
        }

        let point = header.point();
        fork.fragment.push(point);
        self.block_numbers.insert(point.hash, header.block_number());
        self.remove_orphan(&point);
        true
    }

    pub fn add_orphan(&mut self, point: RealPoint) {
        if !self.orphans.contains(&point) && !self.is_adopted(&point) {
            self.orphans.push(point);
        }
    }

    /// Schedule the files of a rejected block for removal by the next
    /// collection
    ///
    /// Blocks on the chain, in a fork or awaiting migration are kept.
    pub fn discard(&mut self, point: RealPoint) {
        if self.is_adopted(&point)
            || self.immutable.contains(&point)
            || self.pending_deletions.contains(&point)
        {
            return;
        }
        debug!(%point, "Discarding block");
        self.remove_orphan(&point);
        self.pending_deletions.push(point);
    }

    fn remove_orphan(&mut self, point: &RealPoint) {
        self.orphans.retain(|p| p != point);
    }

    fn orphan_fragment(&mut self, fragment: Vec<RealPoint>) {
        for point in fragment {
            self.block_numbers.remove(&point.hash);
            self.add_orphan(point);
        }
    }

    /// Move everything beyond `k` blocks from the tip into `immutable`
    fn enforce_security_parameter(&mut self) {
        if self.main.len() <= self.security_parameter {
            return;
        }

        let excess = self.main.len() - self.security_parameter;
        let settled: Vec<RealPoint> = self.main.drain(..excess).collect();
        if let Some(last) = settled.last() {
            self.immutable_tip = Some(ImmutableTip {
                point: *last,
                block_number: self.block_numbers.get(&last.hash).copied().unwrap_or_default(),
            });
        }
        for point in &settled {
            self.block_numbers.remove(&point.hash);
        }
        self.immutable.extend_from_slice(&settled);
        debug!(count = settled.len(), "Blocks became immutable");

        // Forks diverging from a now-immutable point can never be adopted
        let forks = std::mem::take(&mut self.forks);
        let (kept, lost): (Vec<_>, Vec<_>) = forks
            .into_iter()
            .partition(|fork| self.get_distance_from_tip(&fork.intersection).is_some());
        self.forks = kept;
        for fork in lost {
            info!(
                intersection = %fork.intersection,
                length = fork.len(),
                "Fork fell behind the immutable tip, orphaning it"
            );
            self.orphan_fragment(fork.fragment);
        }
    }

    // ── Garbage collection ─────────────────────────────────────────────

    /// Migrate immutable blocks into a chunk and drop stale orphans
    ///
    /// Volatile files are only removed once the chunk is durable. A failed
    /// removal leaves the remaining points pending, and the next pass only
    /// retries those removals, so no block is written to two chunks.
    pub async fn garbage_collection(
        &mut self,
        immutable_db: &mut ImmutableDb,
    ) -> Result<(), ChainDbError> {
        if !self.immutable.is_empty() {
            let mut bodies = Vec::with_capacity(self.immutable.len());
            for point in &self.immutable {
                match self.read_block(point).await? {
                    Some(body) => bodies.push(body),
                    None => warn!(%point, "Immutable block missing from volatile storage"),
                }
            }

            match self.immutable_tip {
                Some(tip) if !bodies.is_empty() => {
                    let chunk = immutable_db.append_chunk(&bodies, tip).await?;
                    info!(chunk, blocks = bodies.len(), tip = %tip.point, "Migrated blocks to immutable storage");
                }
                _ => {}
            }
            self.pending_deletions.append(&mut self.immutable);
        }

        if let Some(anchor_slot) = self.anchor().map(|anchor| anchor.slot) {
            let (stale, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.orphans)
                .into_iter()
                .partition(|orphan| orphan.slot < anchor_slot);
            if !stale.is_empty() {
                debug!(count = stale.len(), "Discarding stale orphans");
            }
            self.orphans = kept;
            self.pending_deletions.extend(stale);
        }

        while let Some(point) = self.pending_deletions.last() {
            self.remove_files(point).await?;
            self.pending_deletions.pop();
        }
        Ok(())
    }
}

/// Remove `{hash}-{slot}` files at or before `slot`
async fn remove_settled_files(dir: &Path, slot: u64) -> Result<(), ChainDbError> {
    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await.map_err(ChainDbError::io(dir))?;
    while let Some(entry) = entries.next_entry().await.map_err(ChainDbError::io(dir))? {
        let file = entry.path();
        let file_slot = file
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.rsplit_once('-'))
            .and_then(|(_, slot)| slot.parse::<u64>().ok());
        if file_slot.is_some_and(|file_slot| file_slot <= slot) {
            fs::remove_file(&file).await.map_err(ChainDbError::io(&file))?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!("Removed {removed} settled files from {}", dir.display());
    }
    Ok(())
}

async fn read_optional(path: PathBuf) -> Result<Option<Vec<u8>>, ChainDbError> {
    match fs::read(&path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ChainDbError::Io { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use follower_codec::HeaderKind;
    use follower_test_utils::{block_body, chain_from, test_hash, TestHeader};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        db: VolatileDb,
        immutable: ImmutableDb,
    }

    async fn fixture(security_parameter: u64, migration_batch: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = ChainDbConfig {
            database_path: dir.path().to_path_buf(),
            security_parameter,
            migration_batch,
        };
        let db = VolatileDb::open(dir.path().join("volatile"), &config, None).await.unwrap();
        let immutable = ImmutableDb::open(dir.path().join("immutable")).await.unwrap();
        Fixture { dir, db, immutable }
    }

    impl Fixture {
        async fn store(&self, headers: &[MultiEraHeader]) {
            for header in headers {
                self.db.put_block(header, &block_body(header)).await.unwrap();
            }
        }

        async fn extend(&mut self, headers: &[MultiEraHeader]) {
            for header in headers {
                let outcome = self.db.extend_main(header, &mut self.immutable).await;
                assert_eq!(outcome, ExtendOutcome::Extended);
            }
        }

        async fn store_and_extend(&mut self, headers: &[MultiEraHeader]) {
            self.store(headers).await;
            self.extend(headers).await;
        }

        fn header_file(&self, header: &MultiEraHeader) -> PathBuf {
            self.db.header_path(&header.point())
        }
    }

    fn points(headers: &[MultiEraHeader]) -> Vec<RealPoint> {
        headers.iter().map(MultiEraHeader::point).collect()
    }

    #[tokio::test]
    async fn stored_headers_resolve_by_point() {
        let f = fixture(10, 100).await;
        let header = TestHeader::conway(test_hash(1), 500, 7).build();
        f.store(&[header.clone()]).await;
        // Storing again is harmless
        f.store(&[header.clone()]).await;

        let key = format!("{}-500", header.hash());
        assert!(f.dir.path().join("volatile/headers").join(&key).is_file());
        assert_eq!(
            std::fs::read(f.dir.path().join("volatile/blocks").join(&key)).unwrap(),
            block_body(&header)
        );

        let resolved = f.db.resolve_point(&header.point()).await.unwrap().unwrap();
        assert_eq!(resolved.hash(), header.hash());
        assert_eq!(resolved.to_cbor(), header.to_cbor());
        assert!(f.db.contains(&header.point()).await.unwrap());

        let unknown = RealPoint::new(500, test_hash(9));
        assert!(f.db.resolve_point(&unknown).await.unwrap().is_none());
        assert!(!f.db.contains(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn stored_headers_keep_their_era() {
        let f = fixture(10, 100).await;
        // Blocks signalling the next era carry its protocol version
        let signalling = [
            TestHeader::conway(test_hash(1), 10, 1).kind(HeaderKind::Alonzo).protocol_major(7),
            TestHeader::conway(test_hash(2), 20, 2).kind(HeaderKind::Allegra).protocol_major(4),
            TestHeader::conway(test_hash(3), 30, 3).kind(HeaderKind::Byron),
        ];
        for header in signalling.iter().map(TestHeader::build) {
            f.store(std::slice::from_ref(&header)).await;
            let resolved = f.db.resolve_point(&header.point()).await.unwrap().unwrap();
            assert_eq!(resolved.kind(), header.kind());
            assert_eq!(resolved, header);
            assert_eq!(resolved.hash(), header.hash());
        }
    }

    #[tokio::test]
    async fn settled_files_are_removed_on_open() {
        let f = fixture(10, 100).await;
        let chain = chain_from(test_hash(0), 10, 1, 3, 0);
        f.store(&chain).await;
        let config = ChainDbConfig::at(f.dir.path());
        let tip = ImmutableTip {
            point: chain[1].point(),
            block_number: 2,
        };

        let db = VolatileDb::open(f.dir.path().join("volatile"), &config, Some(tip))
            .await
            .unwrap();
        assert_eq!(db.immutable_tip(), Some(&tip));
        assert_eq!(db.tip(), Point::from(chain[1].point()));
        assert!(db.extends_tip(&chain[2]));
        assert_eq!(db.intersect_points(), vec![chain[1].point().into(), Point::Origin]);
        for settled in &chain[..2] {
            assert!(!db.contains(&settled.point()).await.unwrap());
            assert!(db.read_block(&settled.point()).await.unwrap().is_none());
        }
        assert!(db.contains(&chain[2].point()).await.unwrap());
    }

    #[tokio::test]
    async fn rejected_blocks_are_discarded_by_collection() {
        let mut f = fixture(10, 100).await;
        let chain = chain_from(test_hash(0), 10, 1, 2, 0);
        f.store_and_extend(&chain).await;
        let rejected = TestHeader::conway(test_hash(40), 40, 9).build();
        f.store(&[rejected.clone()]).await;

        f.db.discard(rejected.point());
        // Adopted blocks are never discarded
        f.db.discard(chain[1].point());
        f.db.garbage_collection(&mut f.immutable).await.unwrap();

        assert!(!f.db.contains(&rejected.point()).await.unwrap());
        assert!(f.db.contains(&chain[1].point()).await.unwrap());
        assert!(f.db.pending_deletions.is_empty());
    }

    #[tokio::test]
    async fn extension_must_build_on_tip() {
        let mut f = fixture(10, 100).await;
        let chain = chain_from(test_hash(0), 100, 1, 2, 0);
        f.store_and_extend(&chain).await;

        let stale = TestHeader::conway(chain[0].hash(), 101, 2).issuer(9).build();
        let outcome = f.db.extend_main(&stale, &mut f.immutable).await;
        assert_eq!(outcome, ExtendOutcome::Stale);
        assert_eq!(f.db.main(), points(&chain).as_slice());
    }

    #[tokio::test]
    async fn blocks_beyond_k_become_immutable() {
        let mut f = fixture(2, 100).await;
        let chain = chain_from(test_hash(0), 100, 1, 3, 0);
        f.store_and_extend(&chain[..2]).await;
        assert_eq!(f.db.main(), points(&chain[..2]).as_slice());

        f.store_and_extend(&chain[2..]).await;
        assert_eq!(f.db.main(), points(&chain[1..]).as_slice());
        assert_eq!(f.db.immutable(), &[chain[0].point()]);
        assert_eq!(
            f.db.immutable_tip(),
            Some(&ImmutableTip {
                point: chain[0].point(),
                block_number: 1
            })
        );
        assert_eq!(f.immutable.chunks(), 0);
    }

    #[tokio::test]
    async fn main_never_exceeds_k() {
        let mut f = fixture(3, 100).await;
        for header in chain_from(test_hash(0), 1, 1, 20, 0) {
            f.store_and_extend(&[header]).await;
            assert!(f.db.main().len() <= 3);
        }
        assert_eq!(f.db.immutable().len(), 17);
    }

    #[tokio::test]
    async fn distance_from_tip() {
        let mut f = fixture(10, 100).await;
        let chain = chain_from(test_hash(0), 1, 1, 3, 0);
        assert_eq!(f.db.get_distance_from_tip(&Point::Origin), Some(0));

        f.store_and_extend(&chain).await;
        assert_eq!(f.db.get_distance_from_tip(&chain[2].point().into()), Some(0));
        assert_eq!(f.db.get_distance_from_tip(&chain[0].point().into()), Some(2));
        assert_eq!(f.db.get_distance_from_tip(&Point::Origin), Some(3));
        let elsewhere = RealPoint::new(2, test_hash(42));
        assert_eq!(f.db.get_distance_from_tip(&elsewhere.into()), None);
    }

    #[tokio::test]
    async fn longer_fork_is_adopted_and_old_suffix_kept_as_fork() {
        let mut f = fixture(10, 100).await;
        let main = chain_from(test_hash(0), 101, 2, 2, 0);
        f.store_and_extend(&main).await;
        let (b, c) = (&main[0], &main[1]);

        let fork = chain_from(b.hash(), 102, 3, 2, 1);
        f.store(&fork).await;
        let index = f.db.add_fork(b.point().into(), &fork);
        assert_eq!(f.db.try_switch_to_fork(index), SwitchOutcome::Switched);

        assert_eq!(f.db.main(), &[b.point(), fork[0].point(), fork[1].point()]);
        assert_eq!(
            f.db.forks(),
            &[ChainFork::new(b.point().into(), vec![c.point()])]
        );
        assert_eq!(f.db.tip(), Point::from(fork[1].point()));
    }

    #[tokio::test]
    async fn equal_length_fork_keeps_current_chain() {
        let mut f = fixture(10, 100).await;
        let main = chain_from(test_hash(0), 101, 2, 2, 0);
        f.store_and_extend(&main).await;

        let fork = chain_from(main[0].hash(), 102, 3, 1, 1);
        let index = f.db.add_fork(main[0].point().into(), &fork);
        assert_eq!(f.db.try_switch_to_fork(index), SwitchOutcome::Kept);
        assert_eq!(f.db.main(), points(&main).as_slice());
        assert_eq!(f.db.forks().len(), 1);
    }

    #[tokio::test]
    async fn fork_at_tip_is_adopted() {
        let mut f = fixture(10, 100).await;
        let main = chain_from(test_hash(0), 101, 2, 2, 0);
        f.store_and_extend(&main).await;

        let fork = chain_from(main[1].hash(), 103, 4, 1, 1);
        let index = f.db.add_fork(main[1].point().into(), &fork);
        assert_eq!(f.db.try_switch_to_fork(index), SwitchOutcome::Switched);
        assert_eq!(f.db.main().len(), 3);
        assert!(f.db.forks().is_empty());
    }

    #[tokio::test]
    async fn fork_with_unknown_intersection_is_orphaned() {
        let mut f = fixture(10, 100).await;
        f.store_and_extend(&chain_from(test_hash(0), 1, 1, 2, 0)).await;

        let fork = chain_from(test_hash(77), 5, 5, 1, 1);
        let index = f.db.add_fork(RealPoint::new(4, test_hash(77)).into(), &fork);
        assert_eq!(f.db.try_switch_to_fork(index), SwitchOutcome::IntersectionLost);
        assert!(f.db.forks().is_empty());
        assert_eq!(f.db.orphans(), &[fork[0].point()]);
        assert_eq!(f.db.try_switch_to_fork(3), SwitchOutcome::NoSuchFork);
    }

    #[tokio::test]
    async fn fork_behind_immutable_tip_is_orphaned() {
        let mut f = fixture(2, 100).await;
        let main = chain_from(test_hash(0), 100, 1, 3, 0);
        f.store_and_extend(&main[..2]).await;

        let fork = chain_from(main[0].hash(), 101, 2, 1, 1);
        f.db.add_fork(main[0].point().into(), &fork);
        assert_eq!(f.db.forks().len(), 1);

        f.store_and_extend(&main[2..]).await;
        assert!(f.db.forks().is_empty());
        assert_eq!(f.db.orphans(), &[fork[0].point()]);
    }

    #[tokio::test]
    async fn overlapping_forks_are_merged() {
        let mut f = fixture(10, 100).await;
        let main = chain_from(test_hash(0), 1, 1, 3, 0);
        f.store_and_extend(&main).await;

        let fork = chain_from(main[0].hash(), 2, 2, 3, 1);
        let first = f.db.add_fork(main[0].point().into(), &fork[..2]);
        let second = f.db.add_fork(main[0].point().into(), &fork);
        assert_eq!(first, second);
        assert_eq!(f.db.forks().len(), 1);
        assert_eq!(f.db.forks()[0].fragment, points(&fork));

        assert!(f.db.extend_fork(first, &chain_from(fork[2].hash(), 5, 5, 1, 1)[0]));
        assert_eq!(f.db.forks()[0].len(), 4);
    }

    #[tokio::test]
    async fn full_batch_is_migrated_to_a_chunk() {
        let mut f = fixture(1, 2).await;
        let chain = chain_from(test_hash(0), 10, 1, 3, 0);
        f.store_and_extend(&chain).await;

        assert_eq!(f.immutable.chunks(), 1);
        assert!(f.db.immutable().is_empty());
        let mut expected = block_body(&chain[0]);
        expected.extend(block_body(&chain[1]));
        assert_eq!(std::fs::read(f.immutable.chunk_path(0)).unwrap(), expected);

        assert!(f.db.resolve_point(&chain[0].point()).await.unwrap().is_none());
        assert!(f.db.read_block(&chain[1].point()).await.unwrap().is_none());
        assert!(f.db.resolve_point(&chain[2].point()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn interrupted_cleanup_never_duplicates_blocks() {
        let mut f = fixture(1, 100).await;
        let chain = chain_from(test_hash(0), 10, 1, 3, 0);
        f.store_and_extend(&chain).await;
        assert_eq!(f.db.immutable(), &points(&chain[..2])[..]);

        // A header path that cannot be unlinked stands in for a crash after the chunk write
        let blocked = f.header_file(&chain[0]);
        std::fs::remove_file(&blocked).unwrap();
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("busy"), b"x").unwrap();

        assert!(f.db.garbage_collection(&mut f.immutable).await.is_err());
        assert_eq!(f.immutable.chunks(), 1);
        assert!(f.db.immutable().is_empty());
        assert_eq!(f.db.pending_deletions, vec![chain[0].point()]);

        std::fs::remove_dir_all(&blocked).unwrap();
        f.db.garbage_collection(&mut f.immutable).await.unwrap();
        assert_eq!(f.immutable.chunks(), 1);
        assert!(f.db.pending_deletions.is_empty());
        assert!(f.db.read_block(&chain[0].point()).await.unwrap().is_none());

        let mut expected = block_body(&chain[0]);
        expected.extend(block_body(&chain[1]));
        assert_eq!(std::fs::read(f.immutable.chunk_path(0)).unwrap(), expected);
    }

    #[tokio::test]
    async fn missing_volatile_files_do_not_fail_migration() {
        let mut f = fixture(1, 100).await;
        let chain = chain_from(test_hash(0), 10, 1, 3, 0);
        f.store_and_extend(&chain).await;
        std::fs::remove_file(f.db.block_path(&chain[0].point())).unwrap();

        f.db.garbage_collection(&mut f.immutable).await.unwrap();
        assert_eq!(
            std::fs::read(f.immutable.chunk_path(0)).unwrap(),
            block_body(&chain[1])
        );
        assert!(f.db.immutable().is_empty());
    }

    #[tokio::test]
    async fn stale_orphans_are_discarded() {
        let mut f = fixture(2, 100).await;
        let chain = chain_from(test_hash(0), 10, 1, 3, 0);
        f.store_and_extend(&chain).await;

        let old = TestHeader::conway(test_hash(50), 5, 1).build();
        let recent = TestHeader::conway(test_hash(51), 50, 9).build();
        f.store(&[old.clone(), recent.clone()]).await;
        f.db.add_orphan(old.point());
        f.db.add_orphan(recent.point());

        f.db.garbage_collection(&mut f.immutable).await.unwrap();
        assert_eq!(f.db.orphans(), &[recent.point()]);
        assert!(f.db.resolve_point(&old.point()).await.unwrap().is_none());
        assert!(f.db.resolve_point(&recent.point()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn intersect_points_thin_out_with_depth() {
        let mut f = fixture(100, 100).await;
        let chain = chain_from(test_hash(0), 1, 1, 30, 0);
        f.store_and_extend(&chain).await;

        let expected: Vec<Point> = [29, 28, 27, 26, 25, 24, 14, 4]
            .iter()
            .map(|&i| chain[i].point().into())
            .chain([Point::Origin])
            .collect();
        assert_eq!(f.db.intersect_points(), expected);
    }
}

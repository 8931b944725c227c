//! Chain database and multi-peer chain following
//!
//! [`ChainDb`] groups the volatile store (the adopted chain within the
//! rollback window plus forks and orphans), the immutable chunk store and the
//! ledger store directory. [`ChainSel`] applies the chain selection rules to
//! it, and [`ChainFollower`] drives both from a set of upstream peers.

mod chain_fork;
mod chain_sel;
mod configuration;
mod db_error;
mod download;
mod extensions;
mod follower;
mod immutable_db;
mod ledger_db;
pub mod peer;
mod volatile_db;

pub use chain_fork::*;
pub use chain_sel::*;
pub use configuration::*;
pub use db_error::*;
pub use download::*;
pub use extensions::*;
pub use follower::*;
pub use immutable_db::*;
pub use ledger_db::*;
pub use volatile_db::*;

use follower_codec::MultiEraHeader;
use tracing::info;

const VOLATILE_DIR: &str = "volatile";
const IMMUTABLE_DIR: &str = "immutable";
const LEDGER_DIR: &str = "ledger";

pub struct ChainDb {
    volatile: VolatileDb,
    immutable: ImmutableDb,
    ledger: LedgerDb,
}

impl ChainDb {
    pub async fn open(config: ChainDbConfig) -> Result<Self, ChainDbError> {
        let path = &config.database_path;
        let immutable = ImmutableDb::open(path.join(IMMUTABLE_DIR)).await?;
        let volatile =
            VolatileDb::open(path.join(VOLATILE_DIR), &config, immutable.tip().copied()).await?;
        let ledger = LedgerDb::open(path.join(LEDGER_DIR)).await?;

        info!(
            "Opened chain database at {} (k={}, migration batch {})",
            path.display(),
            config.security_parameter,
            config.migration_batch
        );
        Ok(Self {
            volatile,
            immutable,
            ledger,
        })
    }

    pub fn volatile(&self) -> &VolatileDb {
        &self.volatile
    }

    pub fn volatile_mut(&mut self) -> &mut VolatileDb {
        &mut self.volatile
    }

    pub fn immutable(&self) -> &ImmutableDb {
        &self.immutable
    }

    pub fn ledger(&self) -> &LedgerDb {
        &self.ledger
    }

    /// Number of immutable chunks written
    pub fn chunks(&self) -> u64 {
        self.immutable.chunks()
    }

    pub async fn extend_main(&mut self, header: &MultiEraHeader) -> ExtendOutcome {
        self.volatile.extend_main(header, &mut self.immutable).await
    }

    pub async fn try_switch_to_fork(&mut self, index: usize) -> SwitchOutcome {
        let outcome = self.volatile.try_switch_to_fork(index);
        self.volatile.collect_if_due(&mut self.immutable).await;
        outcome
    }

    pub async fn garbage_collection(&mut self) -> Result<(), ChainDbError> {
        self.volatile.garbage_collection(&mut self.immutable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use follower_common::Point;
    use follower_test_utils::{block_body, chain_from, test_hash};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_store_layout() {
        let dir = TempDir::new().unwrap();
        let db = ChainDb::open(ChainDbConfig::at(dir.path())).await.unwrap();

        for sub in ["volatile/headers", "volatile/blocks", "immutable", "ledger"] {
            assert!(dir.path().join(sub).is_dir(), "{sub} missing");
        }
        assert_eq!(db.chunks(), 0);
        assert_eq!(db.ledger().path(), dir.path().join("ledger"));
    }

    #[tokio::test]
    async fn reopened_database_resumes_after_the_immutable_tip() {
        let dir = TempDir::new().unwrap();
        let config = ChainDbConfig {
            database_path: dir.path().to_path_buf(),
            security_parameter: 1,
            migration_batch: 1,
        };
        let chain = chain_from(test_hash(0), 1, 1, 3, 0);
        {
            let mut db = ChainDb::open(config.clone()).await.unwrap();
            for header in &chain {
                db.volatile().put_block(header, &block_body(header)).await.unwrap();
                assert_eq!(db.extend_main(header).await, ExtendOutcome::Extended);
            }
            assert_eq!(db.chunks(), 2);
        }

        let mut db = ChainDb::open(config).await.unwrap();
        assert_eq!(db.chunks(), 2);
        assert_eq!(
            db.volatile().immutable_tip().map(|tip| tip.point),
            Some(chain[1].point())
        );
        assert_eq!(
            db.volatile().intersect_points(),
            vec![Point::from(chain[1].point()), Point::Origin]
        );

        // A peer replaying from genesis must not duplicate migrated blocks
        let selection = ChainSel::new(Arc::new(LoggingObserver));
        let mut outcomes = Vec::new();
        for header in &chain {
            db.volatile().put_block(header, &block_body(header)).await.unwrap();
            outcomes.push(selection.select_block(&mut db, header).await.unwrap());
        }
        assert_eq!(
            outcomes,
            vec![Selection::TooOld, Selection::TooOld, Selection::ExtendedMain]
        );

        db.garbage_collection().await.unwrap();
        assert_eq!(db.chunks(), 2);
        assert_eq!(db.volatile().main(), &[chain[2].point()]);
        for migrated in &chain[..2] {
            assert!(!db.volatile().contains(&migrated.point()).await.unwrap());
        }
        assert_eq!(
            std::fs::read(db.immutable().chunk_path(0)).unwrap(),
            block_body(&chain[0])
        );
    }
}

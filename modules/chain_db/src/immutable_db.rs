//! Immutable store: numbered chunk files of migrated block bodies
//!
//! Every chunk `N.chunk` has a sidecar `N.tip` naming the newest block it
//! settled, so a reopened store knows where the immutable chain ends.

use crate::db_error::ChainDbError;
use follower_common::RealPoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};

const CHUNK_EXTENSION: &str = "chunk";
const TIP_EXTENSION: &str = "tip";
const PARTIAL_EXTENSION: &str = "partial";

/// Newest block migrated out of the volatile window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableTip {
    pub point: RealPoint,
    pub block_number: u64,
}

pub struct ImmutableDb {
    path: PathBuf,
    /// Index of the next chunk to write
    chunks: u64,
    tip: Option<ImmutableTip>,
}

impl ImmutableDb {
    /// Open the store, recovering the chunk counter and tip from the files
    /// on disk
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ChainDbError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)
            .await
            .map_err(ChainDbError::io(&path))?;

        let mut chunks = 0;
        let mut tips = Vec::new();
        let mut entries = fs::read_dir(&path).await.map_err(ChainDbError::io(&path))?;
        while let Some(entry) = entries.next_entry().await.map_err(ChainDbError::io(&path))? {
            let file = entry.path();
            let index = file
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok());
            match (file.extension().and_then(|e| e.to_str()), index) {
                (Some(CHUNK_EXTENSION), Some(index)) => chunks = chunks.max(index + 1),
                (Some(TIP_EXTENSION), Some(index)) => tips.push(index),
                (Some(PARTIAL_EXTENSION), _) => {
                    warn!("Removing incomplete file {}", file.display());
                    fs::remove_file(&file).await.map_err(ChainDbError::io(&file))?;
                }
                _ => warn!("Ignoring unexpected file {}", file.display()),
            }
        }

        let mut db = Self {
            path,
            chunks,
            tip: None,
        };

        // A tip written ahead of a chunk that never got its final name
        for index in tips.iter().filter(|&&index| index >= chunks) {
            let stray = db.tip_path(*index);
            warn!("Removing tip without chunk {}", stray.display());
            fs::remove_file(&stray).await.map_err(ChainDbError::io(&stray))?;
        }
        if chunks > 0 {
            let tip_path = db.tip_path(chunks - 1);
            if tips.contains(&(chunks - 1)) {
                let bytes = fs::read(&tip_path).await.map_err(ChainDbError::io(&tip_path))?;
                let tip = serde_json::from_slice(&bytes).map_err(|source| {
                    ChainDbError::CorruptTip {
                        path: tip_path.clone(),
                        source,
                    }
                })?;
                db.tip = Some(tip);
            } else {
                warn!("Chunk {} has no tip, immutable chain end unknown", chunks - 1);
            }
        }

        match &db.tip {
            Some(tip) => info!(
                "Immutable store at {} has {chunks} chunks, tip {} (block {})",
                db.path.display(),
                tip.point,
                tip.block_number
            ),
            None => info!("Immutable store at {} has {chunks} chunks", db.path.display()),
        }
        Ok(db)
    }

    /// Number of chunks written so far, which is also the next chunk index
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Newest block of the last chunk
    pub fn tip(&self) -> Option<&ImmutableTip> {
        self.tip.as_ref()
    }

    pub fn chunk_path(&self, index: u64) -> PathBuf {
        self.path.join(format!("{index}.{CHUNK_EXTENSION}"))
    }

    fn tip_path(&self, index: u64) -> PathBuf {
        self.path.join(format!("{index}.{TIP_EXTENSION}"))
    }

    /// Durably write `bodies` as the next chunk, settled up to `tip`, and
    /// return its index
    ///
    /// The tip is committed before the chunk takes its final name, so a
    /// crash leaves at most `.partial` files and a tip without a chunk, all
    /// of which are removed on open.
    pub async fn append_chunk(
        &mut self,
        bodies: &[Vec<u8>],
        tip: ImmutableTip,
    ) -> Result<u64, ChainDbError> {
        let index = self.chunks;
        let final_path = self.chunk_path(index);
        let tmp_path = final_path.with_extension(format!("{CHUNK_EXTENSION}.{PARTIAL_EXTENSION}"));
        let tip_path = self.tip_path(index);
        let tmp_tip_path = tip_path.with_extension(format!("{TIP_EXTENSION}.{PARTIAL_EXTENSION}"));

        let result = async {
            let mut file = fs::File::create(&tmp_path)
                .await
                .map_err(ChainDbError::io(&tmp_path))?;
            for body in bodies {
                file.write_all(body).await.map_err(ChainDbError::io(&tmp_path))?;
            }
            file.sync_all().await.map_err(ChainDbError::io(&tmp_path))?;

            let encoded = serde_json::to_vec(&tip).map_err(|source| ChainDbError::CorruptTip {
                path: tip_path.clone(),
                source,
            })?;
            write_synced(&tmp_tip_path, &encoded).await?;
            fs::rename(&tmp_tip_path, &tip_path)
                .await
                .map_err(ChainDbError::io(&tip_path))?;
            fs::rename(&tmp_path, &final_path)
                .await
                .map_err(ChainDbError::io(&final_path))?;

            // Persist the renames themselves
            let dir = fs::File::open(&self.path)
                .await
                .map_err(ChainDbError::io(&self.path))?;
            dir.sync_all().await.map_err(ChainDbError::io(&self.path))
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
            let _ = fs::remove_file(&tmp_tip_path).await;
            if !fs::try_exists(&final_path).await.unwrap_or(true) {
                let _ = fs::remove_file(&tip_path).await;
            }
        }
        result?;

        self.chunks += 1;
        self.tip = Some(tip);
        Ok(index)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), ChainDbError> {
    let mut file = fs::File::create(path).await.map_err(ChainDbError::io(path))?;
    file.write_all(bytes).await.map_err(ChainDbError::io(path))?;
    file.sync_all().await.map_err(ChainDbError::io(path))
}

use crate::db_error::ChainDbError;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Ledger state store; only its directory is managed here
pub struct LedgerDb {
    path: PathBuf,
}

impl LedgerDb {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ChainDbError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)
            .await
            .map_err(ChainDbError::io(&path))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

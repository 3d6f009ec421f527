use crate::domain::ports::StateStore;
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Column Family holding saved component state.
pub const CF_STATE: &str = "state";

/// A persistent [`StateStore`] backed by RocksDB.
///
/// Values are stored JSON-encoded in the `state` column family, so a
/// delegate recreated after process death finds its action and payment data.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStateStore {
    db: Arc<DB>,
}

impl RocksDBStateStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_state = ColumnFamilyDescriptor::new(CF_STATE, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_state])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_STATE)
            .ok_or_else(|| CheckoutError::checkout("State column family not found"))
    }
}

#[async_trait]
impl StateStore for RocksDBStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let cf = self.cf()?;
        let bytes = serde_json::to_vec(&value)?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let cf = self.cf()?;
        self.db.delete_cf(cf, key.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStateStore::open(dir.path()).unwrap();
            store.put("ACTION_KEY", json!({"type": "await"})).await.unwrap();
            store.put("IS_POLLING_KEY", json!(true)).await.unwrap();
            store.remove("IS_POLLING_KEY").await.unwrap();
        }

        let store = RocksDBStateStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get("ACTION_KEY").await.unwrap(),
            Some(json!({"type": "await"}))
        );
        assert!(store.get("IS_POLLING_KEY").await.unwrap().is_none());
    }
}

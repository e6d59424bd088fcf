//! redb-backed store, one table per record type.
//!
//! Values are JSON-serialized into the table's `&[u8]` column and keyed by
//! the record's stringified UUID.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use super::types::{Store, StoreError, StoreResult};

macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

pub struct RedbStore<T> {
    db: Arc<Database>,
    table: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> RedbStore<T> {
    /// Open (or create) the database file and make sure `table` exists.
    pub fn open(path: &Path, table: &str) -> StoreResult<Self> {
        let db = Database::create(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let store = RedbStore {
            db: Arc::new(db),
            table: table.to_string(),
            _record: PhantomData,
        };
        store.ensure_table()?;
        debug!(?path, table, "store opened");
        Ok(store)
    }

    fn definition(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.table)
    }

    fn ensure_table(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(self.definition()).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl<T> Store<T> for RedbStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn put(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<T> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn list(&self) -> StoreResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            records.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(records)
    }

    fn count(&self) -> StoreResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }
}

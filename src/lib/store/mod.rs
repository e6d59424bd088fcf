pub mod memory;
pub mod persistent;
pub mod types;

pub use memory::MemoryStore;
pub use persistent::RedbStore;
pub use types::{Store, StoreError, StoreKind, StoreResult};

use std::path::Path;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

/// Build the store a component was configured with. `file` is only used
/// for [`StoreKind::Persistent`].
pub fn open<T>(kind: StoreKind, file: &Path, table: &str) -> StoreResult<Arc<dyn Store<T>>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    Ok(match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Persistent => Arc::new(RedbStore::open(file, table)?),
    })
}

//! Durable state: the subscription checkpoint cursor and the recorded
//! nullifiers. Everything else is rebuildable from the event log.

use murmur_types::{ExternalNullifier, MurmurError, MurmurResult, NullifierHash};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use tracing::info;

const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_KEY: &[u8] = b"__schema_version__";
const CHECKPOINT_KEY: &[u8] = b"cursor";

#[derive(Serialize, Deserialize)]
struct NullifierRecord {
    recorded_at: i64,
}

pub struct SignalStorage {
    db: Db,
    schema: Tree,
    checkpoint: Tree,
    nullifiers: Tree,
}

impl SignalStorage {
    pub fn open(path: &Path) -> MurmurResult<Self> {
        info!("Opening storage at {:?}", path);
        let db = sled::Config::new()
            .path(path)
            .open()
            .map_err(|e| MurmurError::Storage(format!("Failed to open database: {}", e)))?;
        Self::create_from_db(db)
    }

    /// Temporary database for tests.
    pub fn in_memory() -> MurmurResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| MurmurError::Storage(format!("Failed to open temp database: {}", e)))?;
        Self::create_from_db(db)
    }

    fn create_from_db(db: Db) -> MurmurResult<Self> {
        let schema = Self::open_tree(&db, "schema")?;
        let checkpoint = Self::open_tree(&db, "checkpoint")?;
        let nullifiers = Self::open_tree(&db, "nullifiers")?;

        let storage = Self {
            db,
            schema,
            checkpoint,
            nullifiers,
        };
        storage.ensure_schema()?;
        Ok(storage)
    }

    fn open_tree(db: &Db, name: &str) -> MurmurResult<Tree> {
        db.open_tree(name)
            .map_err(|e| MurmurError::Storage(format!("Failed to open {} tree: {}", name, e)))
    }

    fn ensure_schema(&self) -> MurmurResult<()> {
        match self
            .schema
            .get(SCHEMA_KEY)
            .map_err(|e| MurmurError::Storage(format!("Failed to read schema: {}", e)))?
        {
            Some(bytes) => {
                let version = u32::from_be_bytes(bytes.as_ref().try_into().map_err(|_| {
                    MurmurError::Storage("Corrupt schema version".into())
                })?);
                if version > CURRENT_SCHEMA_VERSION {
                    return Err(MurmurError::Storage(format!(
                        "Database schema version {} is newer than supported {}",
                        version, CURRENT_SCHEMA_VERSION
                    )));
                }
            }
            None => {
                self.schema
                    .insert(SCHEMA_KEY, &CURRENT_SCHEMA_VERSION.to_be_bytes())
                    .map_err(|e| MurmurError::Storage(format!("Failed to store schema: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Sequence of the last applied log entry; 0 means genesis.
    pub fn checkpoint(&self) -> MurmurResult<u64> {
        match self
            .checkpoint
            .get(CHECKPOINT_KEY)
            .map_err(|e| MurmurError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(u64::from_be_bytes(bytes.as_ref().try_into().map_err(
                |_| MurmurError::Storage("Corrupt checkpoint cursor".into()),
            )?)),
            None => Ok(0),
        }
    }

    pub fn set_checkpoint(&self, sequence: u64) -> MurmurResult<()> {
        self.checkpoint
            .insert(CHECKPOINT_KEY, &sequence.to_be_bytes())
            .map_err(|e| MurmurError::Storage(e.to_string()))?;
        Ok(())
    }

    fn nullifier_key(nullifier: &NullifierHash, scope: &ExternalNullifier) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(nullifier.as_bytes());
        key[32..].copy_from_slice(scope.as_bytes());
        key
    }

    /// Record a nullifier. Returns false (without writing) when it was
    /// already present for this scope.
    pub fn record_nullifier(
        &self,
        nullifier: &NullifierHash,
        scope: &ExternalNullifier,
    ) -> MurmurResult<bool> {
        let key = Self::nullifier_key(nullifier, scope);
        let record = NullifierRecord {
            recorded_at: chrono::Utc::now().timestamp(),
        };
        let value = bincode::serialize(&record)
            .map_err(|e| MurmurError::Serialization(e.to_string()))?;

        let previous = self
            .nullifiers
            .compare_and_swap(key, None::<&[u8]>, Some(value))
            .map_err(|e| MurmurError::Storage(e.to_string()))?;

        Ok(previous.is_ok())
    }

    pub fn nullifier_exists(
        &self,
        nullifier: &NullifierHash,
        scope: &ExternalNullifier,
    ) -> MurmurResult<bool> {
        let key = Self::nullifier_key(nullifier, scope);
        self.nullifiers
            .contains_key(key)
            .map_err(|e| MurmurError::Storage(e.to_string()))
    }

    /// All recorded nullifiers, for warm-starting the in-memory set.
    pub fn load_nullifiers(&self) -> MurmurResult<Vec<(NullifierHash, ExternalNullifier)>> {
        let mut out = Vec::new();
        for item in self.nullifiers.iter() {
            let (key, _) = item.map_err(|e| MurmurError::Storage(e.to_string()))?;
            if key.len() != 64 {
                return Err(MurmurError::Storage("Corrupt nullifier key".into()));
            }
            let mut nullifier = [0u8; 32];
            let mut scope = [0u8; 32];
            nullifier.copy_from_slice(&key[..32]);
            scope.copy_from_slice(&key[32..]);
            out.push((
                NullifierHash::from_bytes(nullifier),
                ExternalNullifier::from_bytes(scope),
            ));
        }
        Ok(out)
    }

    pub fn flush(&self) -> MurmurResult<()> {
        self.db
            .flush()
            .map_err(|e| MurmurError::Storage(format!("Flush error: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_roundtrip() {
        let storage = SignalStorage::in_memory().unwrap();
        assert_eq!(storage.checkpoint().unwrap(), 0);
        storage.set_checkpoint(42).unwrap();
        assert_eq!(storage.checkpoint().unwrap(), 42);
    }

    #[test]
    fn test_nullifier_recorded_once() {
        let storage = SignalStorage::in_memory().unwrap();
        let n = NullifierHash::from_bytes([0xaa; 32]);
        let scope = ExternalNullifier::from_bytes([0x01; 32]);

        assert!(storage.record_nullifier(&n, &scope).unwrap());
        assert!(!storage.record_nullifier(&n, &scope).unwrap());
        assert!(storage.nullifier_exists(&n, &scope).unwrap());
    }

    #[test]
    fn test_nullifier_scope_isolation() {
        let storage = SignalStorage::in_memory().unwrap();
        let n = NullifierHash::from_bytes([0xaa; 32]);
        let scope1 = ExternalNullifier::from_bytes([0x01; 32]);
        let scope2 = ExternalNullifier::from_bytes([0x02; 32]);

        storage.record_nullifier(&n, &scope1).unwrap();
        assert!(!storage.nullifier_exists(&n, &scope2).unwrap());
    }

    #[test]
    fn test_load_nullifiers() {
        let storage = SignalStorage::in_memory().unwrap();
        let n = NullifierHash::from_bytes([0xaa; 32]);
        let scope = ExternalNullifier::from_bytes([0x01; 32]);
        storage.record_nullifier(&n, &scope).unwrap();

        let loaded = storage.load_nullifiers().unwrap();
        assert_eq!(loaded, vec![(n, scope)]);
    }
}

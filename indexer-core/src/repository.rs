//! Entity repository
//!
//! A [`Repository`] is the unit of work of one event: handlers load, create
//! and save entities through it, and nothing reaches the [`EntityStore`]
//! until [`Repository::commit`]. Dropping a repository without committing
//! discards every staged write.
//!
//! # Invariants
//!
//! - A `load` after a `save` of the same id observes the saved entity
//! - `get_or_create` never writes; the caller decides whether to `save`
//! - `commit` hands every staged entity to the store as one batch

use crate::entities::EntityFamily;
use crate::storage::{EntityStore, EntityWrite};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// A persisted entity of a known family
pub trait Entity: Serialize + DeserializeOwned {
    /// Family (storage column family) of the entity
    const FAMILY: EntityFamily;

    /// Stable id within the family
    fn id(&self) -> &str;
}

/// An entity family that is created lazily on first reference
///
/// `with_defaults` is the single place the initial values of the family are
/// defined.
pub trait Seeded: Entity {
    /// Input the id and the defaults are derived from
    type Seed;

    /// Id of the entity the seed creates
    fn id_for(seed: &Self::Seed) -> String;

    /// Fresh entity with the family's defaults
    fn with_defaults(seed: Self::Seed) -> Self;
}

/// Per-event unit of work over an entity store
#[derive(Debug)]
pub struct Repository<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    staged: BTreeMap<(EntityFamily, String), Vec<u8>>,
}

impl<'a, S: EntityStore + ?Sized> Repository<'a, S> {
    /// Start a unit of work
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
        }
    }

    /// Load an entity by id (staged writes first, then the store)
    pub fn load<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let key = (E::FAMILY, id.to_string());
        let bytes = match self.staged.get(&key) {
            Some(bytes) => Some(bytes.clone()),
            None => self.store.get(E::FAMILY, id)?,
        };

        match bytes {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load an entity that must exist
    pub fn require<E: Entity>(&self, id: &str) -> Result<E> {
        self.load(id)?.ok_or_else(|| Error::EntityNotFound {
            family: E::FAMILY,
            id: id.to_string(),
        })
    }

    /// Check existence without decoding
    pub fn exists<E: Entity>(&self, id: &str) -> Result<bool> {
        if self.staged.contains_key(&(E::FAMILY, id.to_string())) {
            return Ok(true);
        }
        Ok(self.store.get(E::FAMILY, id)?.is_some())
    }

    /// Load the entity for `seed`, or build it with the family defaults
    ///
    /// Returns the entity and whether it was created. A created entity is not
    /// staged until the caller saves it.
    pub fn get_or_create<E: Seeded>(&self, seed: E::Seed) -> Result<(E, bool)> {
        let id = E::id_for(&seed);
        match self.load::<E>(&id)? {
            Some(entity) => Ok((entity, false)),
            None => {
                tracing::trace!(family = %E::FAMILY, id = %id, "Creating entity with defaults");
                Ok((E::with_defaults(seed), true))
            }
        }
    }

    /// Stage an entity write
    pub fn save<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let value = bincode::serialize(entity)?;
        self.staged
            .insert((E::FAMILY, entity.id().to_string()), value);
        Ok(())
    }

    /// Number of staged writes
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Write all staged entities in one batch
    pub fn commit(self) -> Result<usize> {
        let count = self.staged.len();
        if count == 0 {
            return Ok(0);
        }

        let writes = self
            .staged
            .into_iter()
            .map(|((family, id), value)| EntityWrite { family, id, value })
            .collect();
        self.store.write_batch(writes)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Account, Market};
    use crate::storage::MemoryStore;
    use crate::types::Address;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn test_load_observes_staged_save() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);

        let mut market = Market::new(addr(1));
        market.symbol = "cDAI".to_string();
        repo.save(&market).unwrap();

        let loaded: Market = repo.require(&market.id).unwrap();
        assert_eq!(loaded.symbol, "cDAI");
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_or_create_does_not_stage() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);

        let (account, created) = repo.get_or_create::<Account>(addr(2)).unwrap();
        assert!(created);
        assert_eq!(repo.staged_len(), 0);

        repo.save(&account).unwrap();
        let (_, created) = repo.get_or_create::<Account>(addr(2)).unwrap();
        assert!(!created);
    }

    #[test]
    fn test_commit_and_discard() {
        let store = MemoryStore::new();

        let mut repo = Repository::new(&store);
        repo.save(&Account { id: addr(3).to_hex() }).unwrap();
        drop(repo);
        assert!(store.is_empty());

        let mut repo = Repository::new(&store);
        repo.save(&Account { id: addr(3).to_hex() }).unwrap();
        repo.save(&Market::new(addr(4))).unwrap();
        assert_eq!(repo.commit().unwrap(), 2);

        let repo = Repository::new(&store);
        assert!(repo.exists::<Account>(&addr(3).to_hex()).unwrap());
        assert!(repo.load::<Market>(&addr(4).to_hex()).unwrap().is_some());
    }

    #[test]
    fn test_require_missing() {
        let store = MemoryStore::new();
        let repo = Repository::new(&store);

        let err = repo.require::<Market>("0xmissing").unwrap_err();
        assert!(matches!(
            err,
            Error::EntityNotFound {
                family: EntityFamily::Market,
                ..
            }
        ));
    }
}

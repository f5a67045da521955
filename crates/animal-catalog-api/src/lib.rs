use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use animal_catalog_core::{
    filter_by_query, find_by_id, next_animal_id, parse_new_animal, Animal, AnimalQuery,
    CatalogError, ValidationReport,
};
use animal_catalog_store_json::AnimalStore;
use serde_json::Value;
use tracing::{debug, error, info};

/// Result of a create request that did not fail on I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Animal),
    Rejected(ValidationReport),
}

/// Shared handle over the in-memory catalog and its backing store.
///
/// Clones share the same sequence. Creates hold the lock across id assignment,
/// append and persist so concurrent creates cannot interleave.
#[derive(Debug, Clone)]
pub struct AnimalCatalogApi {
    store: Arc<dyn AnimalStore>,
    animals: Arc<Mutex<Vec<Animal>>>,
}

impl AnimalCatalogApi {
    /// Load the catalog once from `store`.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn open(store: Arc<dyn AnimalStore>) -> Result<Self> {
        let animals = store.load()?;
        info!(location = %store.location(), count = animals.len(), "loaded animal catalog");
        Ok(Self::with_animals(store, animals))
    }

    #[must_use]
    pub fn with_animals(store: Arc<dyn AnimalStore>, animals: Vec<Animal>) -> Self {
        Self { store, animals: Arc::new(Mutex::new(animals)) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Animal>>> {
        self.animals.lock().map_err(|_| anyhow!("animal catalog lock poisoned"))
    }

    /// Records matching every criterion in `query`, in catalog order.
    ///
    /// # Errors
    /// Returns an error when the catalog lock is poisoned.
    pub fn list_animals(&self, query: &AnimalQuery) -> Result<Vec<Animal>> {
        let animals = self.lock()?;
        Ok(filter_by_query(query, &animals))
    }

    /// # Errors
    /// Returns an error when the catalog lock is poisoned.
    pub fn find_animal(&self, id: &str) -> Result<Option<Animal>> {
        let animals = self.lock()?;
        Ok(find_by_id(id, &animals).cloned())
    }

    /// Validate `candidate`, assign the next id, append it and rewrite the store.
    ///
    /// A rejected candidate leaves memory and storage untouched. The append is not
    /// rolled back when the rewrite fails; the record stays in memory and the error is
    /// returned.
    ///
    /// # Errors
    /// Returns an error when the lock is poisoned or the store cannot be written.
    pub fn create_animal(&self, candidate: &Value) -> Result<CreateOutcome> {
        let new_animal = match parse_new_animal(candidate) {
            Ok(new_animal) => new_animal,
            Err(CatalogError::Validation(report)) => {
                debug!(violations = %report, "rejected animal candidate");
                return Ok(CreateOutcome::Rejected(report));
            }
        };

        let mut animals = self.lock()?;
        let animal = new_animal.into_animal(next_animal_id(&animals));
        animals.push(animal.clone());

        if let Err(err) = self.store.persist(&animals) {
            error!(
                location = %self.store.location(),
                error = %format!("{err:#}"),
                "failed to persist animal catalog"
            );
            return Err(err.context(format!("failed to persist animal {}", animal.id)));
        }

        info!(id = %animal.id, name = %animal.name, count = animals.len(), "created animal");
        Ok(CreateOutcome::Created(animal))
    }

    /// # Errors
    /// Returns an error when the catalog lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// # Errors
    /// Returns an error when the catalog lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Copy of the full in-memory sequence.
    ///
    /// # Errors
    /// Returns an error when the catalog lock is poisoned.
    pub fn snapshot(&self) -> Result<Vec<Animal>> {
        Ok(self.lock()?.clone())
    }
}

//! Typed collections served by the `/api/{collection}` read path.

use async_trait::async_trait;
use dashmap::DashMap;
use query_engine::{evaluate, QueryError, Query, Record, Schema};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Collection not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Collection source error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Read access to named collections and their schemas.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    async fn schema(&self, collection: &str) -> Result<Schema, CollectionError>;

    /// Records of `collection` that satisfy `query`, sorted and projected.
    async fn read(&self, collection: &str, query: &Query) -> Result<Vec<Record>, CollectionError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    pub schema: Schema,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Collections held in memory, optionally seeded from a JSON file of the form
/// `{"users": {"schema": {...}, "records": [...]}}`.
#[derive(Default)]
pub struct InMemoryCollections {
    collections: DashMap<String, Collection>,
}

impl InMemoryCollections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, collection: Collection) {
        self.collections.insert(name.into(), collection);
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read collection seed {}: {}", path.display(), e)
        })?;
        let seed: BTreeMap<String, Collection> = serde_json::from_str(&raw).map_err(|e| {
            anyhow::anyhow!("Failed to parse collection seed {}: {}", path.display(), e)
        })?;

        let collections = Self::new();
        for (name, collection) in seed {
            tracing::info!(
                collection = %name,
                records = collection.records.len(),
                "Seeded collection"
            );
            collections.insert(name, collection);
        }
        Ok(collections)
    }

    fn snapshot(&self, collection: &str) -> Result<Collection, CollectionError> {
        self.collections
            .get(collection)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CollectionError::NotFound(collection.to_string()))
    }
}

#[async_trait]
impl CollectionSource for InMemoryCollections {
    async fn schema(&self, collection: &str) -> Result<Schema, CollectionError> {
        self.collections
            .get(collection)
            .map(|entry| entry.schema.clone())
            .ok_or_else(|| CollectionError::NotFound(collection.to_string()))
    }

    async fn read(&self, collection: &str, query: &Query) -> Result<Vec<Record>, CollectionError> {
        let Collection { schema, records } = self.snapshot(collection)?;
        Ok(evaluate(query, &schema, records)?)
    }
}

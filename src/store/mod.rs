// Document store client - key-addressed JSON documents with queries,
// atomic batches and change feeds. Everything above this module talks to
// the trait; the SQLite implementation is one backing.
pub mod query;
pub mod sqlite;
pub mod subscription;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub use query::{Direction, Filter, Query};
pub use sqlite::SqliteDocumentStore;
pub use subscription::{subscribe, Snapshot, Subscription};

/// Field map of a single document.
pub type Fields = serde_json::Map<String, Value>;

/// Sentinel replaced with the store clock when a write is committed.
pub const SERVER_TIMESTAMP: &str = "$serverTimestamp";

pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP.to_string())
}

/// Unwrap a `json!({...})` literal into a field map.
/// Anything other than an object yields an empty map.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

/// Fresh, time-ordered document id.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Deserialize into a model. The document id is exposed to the model as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// One mutation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replace the document, creating it if needed.
    Set {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Merge fields into the document, creating it if needed.
    Merge {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Merge fields into an existing document; fails with `NotFound` otherwise.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Put-if-absent. Applied only when no document exists at the key.
    Create {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Add values missing from an array field of an existing document.
    ArrayUnion {
        collection: String,
        id: String,
        field: String,
        values: Vec<Value>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl Write {
    pub fn set(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self::Set {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }

    pub fn merge(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self::Merge {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }

    pub fn update(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }

    pub fn create(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self::Create {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }

    pub fn array_union(
        collection: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
        values: Vec<Value>,
    ) -> Self {
        Self::ArrayUnion {
            collection: collection.into(),
            id: id.into(),
            field: field.into(),
            values,
        }
    }

    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Set { collection, .. }
            | Self::Merge { collection, .. }
            | Self::Update { collection, .. }
            | Self::Create { collection, .. }
            | Self::ArrayUnion { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Set { id, .. }
            | Self::Merge { id, .. }
            | Self::Update { id, .. }
            | Self::Create { id, .. }
            | Self::ArrayUnion { id, .. }
            | Self::Delete { id, .. } => id,
        }
    }
}

/// Emitted once per applied write after its batch commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
}

/// Store trait - the only way the rest of the crate touches persistence
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Apply all writes atomically. Returns, per write, whether it changed
    /// anything (a `Create` over an existing key or a `Delete` of a missing
    /// key reports `false`).
    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<bool>, StoreError>;

    /// Feed of committed changes, used by subscriptions.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.commit(vec![Write::set(collection, id, fields)]).await?;
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.commit(vec![Write::merge(collection, id, fields)])
            .await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.commit(vec![Write::update(collection, id, fields)])
            .await?;
        Ok(())
    }

    /// Returns `true` when the document was created by this call.
    async fn create(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StoreError> {
        let applied = self
            .commit(vec![Write::create(collection, id, fields)])
            .await?;
        Ok(applied.first().copied().unwrap_or(false))
    }

    /// Create a document under a generated id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = new_id();
        self.commit(vec![Write::create(collection, id.as_str(), fields)])
            .await?;
        Ok(id)
    }

    /// Returns `true` when a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let applied = self.commit(vec![Write::delete(collection, id)]).await?;
        Ok(applied.first().copied().unwrap_or(false))
    }

    /// Returns `true` when at least one value was added.
    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<bool, StoreError> {
        let applied = self
            .commit(vec![Write::array_union(collection, id, field, values)])
            .await?;
        Ok(applied.first().copied().unwrap_or(false))
    }
}

/// Type alias for Arc-wrapped store (for AppState and services)
pub type DynDocumentStore = Arc<dyn DocumentStore>;

//! Document store boundary.
//!
//! The registry only ever talks to [`DocumentStore`] and [`Transaction`]; the
//! in-memory and PostgreSQL backends are interchangeable behind them.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub mod memory;
pub mod postgres;
pub mod query;
pub mod retry;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use query::{Direction, Op, OrderBy, Predicate, Query};
pub use retry::{run_transaction, RetryPolicy, Retryable};

pub const EVENTS: &str = "events";
pub const EVENT_REGISTRATIONS: &str = "event_registrations";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("transaction conflict")]
    Conflict,

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("malformed document")]
    Malformed(#[from] serde_json::Error),

    #[error("database error")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // serialization_failure, deadlock_detected, unique_violation
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("40001" | "40P01" | "23505")) =>
            {
                StoreError::Conflict
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// A stored record: its id plus the full JSON body (which also carries `id`).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Inserts a new document and returns its generated id.
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    /// Shallow-merges `partial` into the stored document.
    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// A unit of reads and writes that commits atomically or not at all.
///
/// Dropping a transaction without calling [`Transaction::commit`] discards
/// every write made through it.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&mut self, collection: &str, query: &Query)
        -> Result<Vec<Document>, StoreError>;

    async fn create(&mut self, collection: &str, data: Value) -> Result<String, StoreError>;

    async fn update(&mut self, collection: &str, id: &str, partial: Value)
        -> Result<(), StoreError>;

    async fn delete(&mut self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Conflict`] when a concurrent writer invalidated
    /// anything this transaction read.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Stamps `id` into a JSON object body.
pub(crate) fn with_id(data: Value, id: &str) -> Result<Value, StoreError> {
    match data {
        Value::Object(mut map) => {
            map.insert("id".to_string(), Value::String(id.to_string()));
            Ok(Value::Object(map))
        }
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Top-level merge, same semantics as jsonb `||`.
pub(crate) fn merge(target: &mut Value, partial: Value) -> Result<(), StoreError> {
    match (target, partial) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields {
                existing.insert(key, value);
            }
            Ok(())
        }
        (_, other) => Err(StoreError::InvalidDocument(format!(
            "partial update must be a JSON object, got {}",
            other
        ))),
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;
use serde_json::Value;

use super::{merge, new_document_id, with_id, Document, DocumentStore, Query, StoreError, Transaction};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    data: Value,
}

#[derive(Debug, Default)]
struct Collection {
    docs: BTreeMap<String, Versioned>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    clock: u64,
}

impl Inner {
    fn version_of(&self, collection: &str, id: &str) -> Option<u64> {
        self.collections
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .map(|doc| doc.version)
    }

    /// Ids and versions of the committed documents a query selects, in id order.
    fn matching(&self, collection: &str, query: &Query) -> Vec<(String, u64)> {
        self.collections
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .filter(|(_, doc)| query.matches(&doc.data))
                    .map(|(id, doc)| (id.clone(), doc.version))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get(&self, collection: &str, id: &str) -> Option<Versioned> {
        self.collections
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .cloned()
    }

    fn scan(&self, collection: &str) -> Vec<(String, Value)> {
        self.collections
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .map(|(id, doc)| (id.clone(), doc.data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `None` deletes.
    fn write(&mut self, collection: &str, id: &str, data: Option<Value>) {
        self.clock += 1;
        let version = self.clock;
        let target = self.collections.entry(collection.to_string()).or_default();
        match data {
            Some(data) => {
                target.docs.insert(id.to_string(), Versioned { version, data });
            }
            None => {
                target.docs.remove(id);
            }
        }
    }
}

fn run_query(mut docs: Vec<(String, Value)>, query: &Query) -> Vec<Document> {
    docs.retain(|(_, data)| query.matches(data));
    query.sort(&mut docs);
    docs.into_iter()
        .map(|(id, data)| Document { id, data })
        .collect()
}

/// In-process document store.
///
/// Transactions are optimistic: they record what they read (single documents
/// and the result sets of queries) and fail to commit with
/// [`StoreError::Conflict`] if any of it changed underneath them.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.get(collection, id).map(|doc| Document {
            id: id.to_string(),
            data: doc.data,
        }))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(run_query(inner.scan(collection), query))
    }

    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = new_document_id();
        let data = with_id(data, &id)?;
        self.inner.lock().await.write(collection, &id, Some(data));
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let mut doc = inner
            .get(collection, id)
            .ok_or_else(|| StoreError::not_found(collection, id))?
            .data;
        merge(&mut doc, partial)?;
        inner.write(collection, id, Some(doc));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.version_of(collection, id).is_none() {
            return Err(StoreError::not_found(collection, id));
        }
        inner.write(collection, id, None);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            reads: HashMap::new(),
            scans: Vec::new(),
            writes: BTreeMap::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

type Key = (String, String);

/// A predicate read. Any committed insert, update or delete that changes the
/// selected set invalidates it; writes to documents outside it do not.
struct Scan {
    collection: String,
    query: Query,
    seen: Vec<(String, u64)>,
}

pub struct MemoryTransaction {
    store: MemoryStore,
    /// Document version observed on first read; `None` if it did not exist.
    reads: HashMap<Key, Option<u64>>,
    /// Queries run against committed state, with what they selected.
    scans: Vec<Scan>,
    /// Buffered writes; `None` is a delete.
    writes: BTreeMap<Key, Option<Value>>,
}

impl MemoryTransaction {
    fn key(collection: &str, id: &str) -> Key {
        (collection.to_string(), id.to_string())
    }

    /// Current view of a document: own writes first, then committed state.
    async fn load(&mut self, collection: &str, id: &str) -> Option<Value> {
        let key = Self::key(collection, id);
        if let Some(pending) = self.writes.get(&key) {
            return pending.clone();
        }
        let inner = self.store.inner.lock().await;
        let committed = inner.get(collection, id);
        self.reads
            .entry(key)
            .or_insert(committed.as_ref().map(|doc| doc.version));
        committed.map(|doc| doc.data)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.load(collection, id).await.map(|data| Document {
            id: id.to_string(),
            data,
        }))
    }

    async fn query(
        &mut self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs: BTreeMap<String, Value> = {
            let inner = self.store.inner.lock().await;
            self.scans.push(Scan {
                collection: collection.to_string(),
                query: query.clone(),
                seen: inner.matching(collection, query),
            });
            inner.scan(collection).into_iter().collect()
        };

        for ((write_collection, id), data) in &self.writes {
            if write_collection != collection {
                continue;
            }
            match data {
                Some(data) => {
                    docs.insert(id.clone(), data.clone());
                }
                None => {
                    docs.remove(id);
                }
            }
        }

        Ok(run_query(docs.into_iter().collect(), query))
    }

    async fn create(&mut self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = new_document_id();
        let data = with_id(data, &id)?;
        self.writes.insert(Self::key(collection, &id), Some(data));
        Ok(id)
    }

    async fn update(
        &mut self,
        collection: &str,
        id: &str,
        partial: Value,
    ) -> Result<(), StoreError> {
        let mut doc = self
            .load(collection, id)
            .await
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        merge(&mut doc, partial)?;
        self.writes.insert(Self::key(collection, id), Some(doc));
        Ok(())
    }

    async fn delete(&mut self, collection: &str, id: &str) -> Result<(), StoreError> {
        if self.load(collection, id).await.is_none() {
            return Err(StoreError::not_found(collection, id));
        }
        self.writes.insert(Self::key(collection, id), None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            store,
            reads,
            scans,
            writes,
        } = *self;
        let mut inner = store.inner.lock().await;

        let stale_read = reads
            .iter()
            .any(|((collection, id), seen)| inner.version_of(collection, id) != *seen);
        let stale_scan = scans
            .iter()
            .any(|scan| inner.matching(&scan.collection, &scan.query) != scan.seen);
        if stale_read || stale_scan {
            return Err(StoreError::Conflict);
        }

        for ((collection, id), data) in writes {
            inner.write(&collection, &id, data);
        }
        Ok(())
    }
}

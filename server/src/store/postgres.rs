use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{PgExecutor, QueryBuilder};

use super::{new_document_id, with_id, Direction, Document, DocumentStore, Query, StoreError, Transaction};

/// Document store on a single JSONB table (see `migrations/`).
///
/// Transactions run at `SERIALIZABLE`; PostgreSQL aborts the loser of a
/// read-write race with SQLSTATE 40001, which surfaces as
/// [`StoreError::Conflict`].
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn select_one<'e, E>(
    executor: E,
    collection: &str,
    id: &str,
) -> Result<Option<Document>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<(String, Value)> =
        sqlx::query_as("SELECT id, data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(executor)
            .await?;

    Ok(row.map(|(id, data)| Document { id, data }))
}

fn build_select(collection: &str, query: &Query) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
    builder.push_bind(collection.to_string());

    for predicate in &query.predicates {
        builder.push(" AND data -> ");
        builder.push_bind(predicate.field.clone());
        builder.push(" ");
        builder.push(predicate.op.sql());
        builder.push(" ");
        builder.push_bind(predicate.value.clone());
    }

    match &query.order_by {
        Some(order) => {
            builder.push(" ORDER BY data -> ");
            builder.push_bind(order.field.clone());
            builder.push(match order.direction {
                Direction::Asc => " ASC, id ASC",
                Direction::Desc => " DESC, id ASC",
            });
        }
        None => {
            builder.push(" ORDER BY id ASC");
        }
    }

    builder
}

async fn select_many<'e, E>(
    executor: E,
    collection: &str,
    query: &Query,
) -> Result<Vec<Document>, StoreError>
where
    E: PgExecutor<'e>,
{
    let mut builder = build_select(collection, query);
    let rows: Vec<(String, Value)> = builder.build_query_as().fetch_all(executor).await?;

    Ok(rows
        .into_iter()
        .map(|(id, data)| Document { id, data })
        .collect())
}

async fn insert<'e, E>(executor: E, collection: &str, data: Value) -> Result<String, StoreError>
where
    E: PgExecutor<'e>,
{
    let id = new_document_id();
    let data = with_id(data, &id)?;

    sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
        .bind(collection)
        .bind(&id)
        .bind(data)
        .execute(executor)
        .await?;

    Ok(id)
}

async fn merge_into<'e, E>(
    executor: E,
    collection: &str,
    id: &str,
    partial: Value,
) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    if !partial.is_object() {
        return Err(StoreError::InvalidDocument(
            "partial update must be a JSON object".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE documents SET data = data || $3, updated_at = now() \
         WHERE collection = $1 AND id = $2",
    )
    .bind(collection)
    .bind(id)
    .bind(partial)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(collection, id));
    }
    Ok(())
}

async fn remove<'e, E>(executor: E, collection: &str, id: &str) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(collection, id));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        select_one(&self.pool, collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        select_many(&self.pool, collection, query).await
    }

    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        insert(&self.pool, collection, data).await
    }

    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<(), StoreError> {
        merge_into(&self.pool, collection, id, partial).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        remove(&self.pool, collection, id).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        select_one(&mut *self.tx, collection, id).await
    }

    async fn query(
        &mut self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        select_many(&mut *self.tx, collection, query).await
    }

    async fn create(&mut self, collection: &str, data: Value) -> Result<String, StoreError> {
        insert(&mut *self.tx, collection, data).await
    }

    async fn update(
        &mut self,
        collection: &str,
        id: &str,
        partial: Value,
    ) -> Result<(), StoreError> {
        merge_into(&mut *self.tx, collection, id, partial).await
    }

    async fn delete(&mut self, collection: &str, id: &str) -> Result<(), StoreError> {
        remove(&mut *self.tx, collection, id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

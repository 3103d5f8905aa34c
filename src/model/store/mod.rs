//! The data access layer.
//!
//! Everything the application persists goes through the [`Store`] trait, a
//! small insert/select/update/delete interface over named tables. The
//! production implementation is [`MongoStore`]; [`MemoryStore`] is an
//! in-process stand-in with the same uniqueness guarantees.

use std::ops::Deref;
use std::sync::Arc;

use mongodb::bson::{self, Document};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

mod memory;
mod mongo;
mod query;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use query::{Filter, Order, Query, Table, UniqueIndex, UNIQUE_INDEXES};

/// Errors raised by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
    #[error("Failed to encode row: {0}")]
    Serialize(#[from] bson::ser::Error),
    #[error("Failed to decode row: {0}")]
    Deserialize(#[from] bson::de::Error),
    #[error("Duplicate key for unique index {0}")]
    DuplicateKey(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    /// All the given rows were inserted.
    Created,
    /// At least one row matched the filter and was updated.
    Updated,
    /// Nothing matched; nothing changed.
    Unmatched,
}

/// The rows affected by a write, and how the store reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    pub data: Vec<Document>,
    pub status: WriteStatus,
}

/// A remote table store.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Insert all the given rows. Violating a [`UniqueIndex`] fails the
    /// whole call with [`StoreError::DuplicateKey`].
    async fn insert(&self, table: Table, rows: Vec<Document>) -> Result<Written, StoreError>;

    /// Fetch the rows matching the query.
    async fn select(&self, table: Table, query: Query) -> Result<Vec<Document>, StoreError>;

    /// Set the fields of `patch` on every row matching `filter`.
    async fn update(
        &self,
        table: Table,
        patch: Document,
        filter: Filter,
    ) -> Result<Written, StoreError>;

    /// Delete every row matching `filter`, returning how many went.
    async fn delete(&self, table: Table, filter: Filter) -> Result<u64, StoreError>;
}

/// A shared handle on the application's store. This is what lives in Rocket's
/// managed state, and what the domain components are built from.
#[derive(Clone)]
pub struct Db(Arc<dyn Store>);

impl Db {
    pub fn new(store: impl Store + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// Wrap a store the caller keeps its own handle on.
    pub fn from_shared(store: Arc<dyn Store>) -> Self {
        Self(store)
    }

    /// Serialise and insert rows.
    pub async fn insert_rows<T: Serialize>(
        &self,
        table: Table,
        rows: &[T],
    ) -> Result<Written, StoreError> {
        let docs = rows
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.0.insert(table, docs).await
    }

    /// Select and deserialise rows.
    pub async fn select_rows<T: DeserializeOwned>(
        &self,
        table: Table,
        query: Query,
    ) -> Result<Vec<T>, StoreError> {
        self.0
            .select(table, query)
            .await?
            .into_iter()
            .map(|doc| bson::from_document(doc).map_err(StoreError::from))
            .collect()
    }

    /// Select and deserialise the first matching row, if any.
    pub async fn first_row<T: DeserializeOwned>(
        &self,
        table: Table,
        query: Query,
    ) -> Result<Option<T>, StoreError> {
        Ok(self
            .select_rows(table, query.limit(1))
            .await?
            .into_iter()
            .next())
    }
}

impl Deref for Db {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Db {
    type Error = ();

    /// Get the store handle from the managed state.
    ///
    /// Panics iff no [`Db`] is managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Db>>().await.unwrap();
        request::Outcome::Success(db.inner().clone())
    }
}

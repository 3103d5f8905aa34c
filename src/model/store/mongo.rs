use mongodb::{
    bson::{doc, Bson, Document},
    error::{Error as DbError, ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Collection, Database, IndexModel,
};
use log::debug;
use rocket::futures::TryStreamExt;

use super::query::{Filter, Query, Table, UNIQUE_INDEXES};
use super::{Store, StoreError, WriteStatus, Written};

/// The mongodb crate doesn't provide error code constants.
const DUPLICATE_KEY: i32 = 11000;

/// A [`Store`] backed by a MongoDB database, one collection per [`Table`].
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self, table: Table) -> Collection<Document> {
        self.db.collection(table.name())
    }

    /// Ensure that every index in [`UNIQUE_INDEXES`] exists.
    ///
    /// This operation is idempotent.
    pub async fn ensure_indexes_exist(&self) -> Result<(), DbError> {
        debug!("Ensuring collection indexes exist");

        for index in UNIQUE_INDEXES {
            let keys: Document = index
                .keys
                .iter()
                .map(|key| (key.to_string(), Bson::Int32(1)))
                .collect();
            let options = match index.partial {
                Some((field, value)) => {
                    let mut partial = Document::new();
                    partial.insert(field, value);
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(partial)
                        .build()
                }
                None => IndexOptions::builder().unique(true).build(),
            };
            let model = IndexModel::builder().keys(keys).options(options).build();
            self.collection(index.table).create_index(model, None).await?;
        }

        Ok(())
    }
}

/// Translate unique index violations into [`StoreError::DuplicateKey`].
fn classify(table: Table, err: DbError) -> StoreError {
    let duplicate = match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(ref failure) => failure
            .write_errors
            .iter()
            .flatten()
            .any(|e| e.code == DUPLICATE_KEY),
        _ => false,
    };
    if duplicate {
        StoreError::DuplicateKey(format!("{table}: {err}"))
    } else {
        StoreError::Mongo(err)
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn insert(&self, table: Table, rows: Vec<Document>) -> Result<Written, StoreError> {
        if rows.is_empty() {
            return Ok(Written {
                data: rows,
                status: WriteStatus::Created,
            });
        }
        let result = self
            .collection(table)
            .insert_many(&rows, None)
            .await
            .map_err(|e| classify(table, e))?;
        if result.inserted_ids.len() != rows.len() {
            return Err(StoreError::Unavailable(format!(
                "inserted {} of {} rows into {table}",
                result.inserted_ids.len(),
                rows.len()
            )));
        }
        Ok(Written {
            data: rows,
            status: WriteStatus::Created,
        })
    }

    async fn select(&self, table: Table, query: Query) -> Result<Vec<Document>, StoreError> {
        let options = FindOptions::builder()
            .sort(query.sort_document())
            .limit(query.limit.map(i64::from))
            .projection(doc! { "_id": 0 })
            .build();
        let rows = self
            .collection(table)
            .find(query.filter.to_document(), options)
            .await?
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn update(
        &self,
        table: Table,
        patch: Document,
        filter: Filter,
    ) -> Result<Written, StoreError> {
        let collection = self.collection(table);

        // Pin the affected rows by `_id`, since the patch may stop them matching `filter`.
        let ids: Vec<Bson> = collection
            .find(filter.to_document(), None)
            .await?
            .try_collect::<Vec<Document>>()
            .await?
            .into_iter()
            .filter_map(|row| row.get("_id").cloned())
            .collect();
        if ids.is_empty() {
            return Ok(Written {
                data: Vec::new(),
                status: WriteStatus::Unmatched,
            });
        }

        let pinned = doc! { "_id": { "$in": ids } };
        let result = collection
            .update_many(pinned.clone(), doc! { "$set": patch }, None)
            .await
            .map_err(|e| classify(table, e))?;
        if result.matched_count == 0 {
            return Ok(Written {
                data: Vec::new(),
                status: WriteStatus::Unmatched,
            });
        }

        let options = FindOptions::builder().projection(doc! { "_id": 0 }).build();
        let data = collection
            .find(pinned, options)
            .await?
            .try_collect()
            .await?;
        Ok(Written {
            data,
            status: WriteStatus::Updated,
        })
    }

    async fn delete(&self, table: Table, filter: Filter) -> Result<u64, StoreError> {
        let result = self
            .collection(table)
            .delete_many(filter.to_document(), None)
            .await?;
        Ok(result.deleted_count)
    }
}

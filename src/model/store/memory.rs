use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use mongodb::bson::Document;

use super::query::{bson_cmp, bson_equal, Filter, Query, Table, UNIQUE_INDEXES};
use super::{Store, StoreError, WriteStatus, Written};

/// An in-process [`Store`]. Rows live in plain vectors in insertion order,
/// and the schema's [`UNIQUE_INDEXES`] are enforced exactly as the database
/// would.
///
/// Used by the test suite and by deployments configured with `store = "memory"`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, Vec<Document>>>,
    broken: Mutex<HashSet<Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to `table` fail, as if the remote store
    /// had gone away halfway through a request.
    pub fn break_table(&self, table: Table) {
        lock(&self.broken).insert(table);
    }

    /// Undo [`MemoryStore::break_table`].
    pub fn repair_table(&self, table: Table) {
        lock(&self.broken).remove(&table);
    }

    fn check_available(&self, table: Table) -> Result<(), StoreError> {
        if lock(&self.broken).contains(&table) {
            Err(StoreError::Unavailable(format!("writes to {table} are failing")))
        } else {
            Ok(())
        }
    }
}

/// A poisoned lock only means another test thread panicked; the rows are still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Find the first unique index that `candidate` would violate against `existing`.
fn violated_index<'a>(
    table: Table,
    existing: impl Iterator<Item = &'a Document> + Clone,
    candidate: &Document,
) -> Option<String> {
    UNIQUE_INDEXES
        .iter()
        .filter(|index| index.table == table && index.covers(candidate))
        .find(|index| {
            let key = index.key_of(candidate);
            existing.clone().filter(|row| index.covers(row)).any(|row| {
                index
                    .key_of(row)
                    .iter()
                    .zip(&key)
                    .all(|(a, b)| match (a, b) {
                        (Some(a), Some(b)) => bson_equal(a, b),
                        (None, None) => true,
                        _ => false,
                    })
            })
        })
        .map(|index| index.describe())
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn insert(&self, table: Table, rows: Vec<Document>) -> Result<Written, StoreError> {
        self.check_available(table)?;
        let mut tables = lock(&self.tables);
        let existing = tables.entry(table).or_default();

        // Validate the whole batch first so a failed insert leaves nothing behind.
        for (i, row) in rows.iter().enumerate() {
            if let Some(index) = violated_index(table, existing.iter().chain(&rows[..i]), row) {
                return Err(StoreError::DuplicateKey(index));
            }
        }

        existing.extend(rows.iter().cloned());
        Ok(Written {
            data: rows,
            status: WriteStatus::Created,
        })
    }

    async fn select(&self, table: Table, query: Query) -> Result<Vec<Document>, StoreError> {
        let tables = lock(&self.tables);
        let rows = tables.get(&table).map(Vec::as_slice).unwrap_or_default();

        let mut selected: Vec<Document> = match query.order {
            Some(ref order) if order.descending => {
                // Newest rows first among equal keys, as a descending scan would return them.
                let mut rows: Vec<_> = rows
                    .iter()
                    .rev()
                    .filter(|row| query.filter.matches(row))
                    .cloned()
                    .collect();
                rows.sort_by(|a, b| bson_cmp(b.get(&order.field), a.get(&order.field)));
                rows
            }
            Some(ref order) => {
                let mut rows: Vec<_> = rows
                    .iter()
                    .filter(|row| query.filter.matches(row))
                    .cloned()
                    .collect();
                rows.sort_by(|a, b| bson_cmp(a.get(&order.field), b.get(&order.field)));
                rows
            }
            None => rows
                .iter()
                .filter(|row| query.filter.matches(row))
                .cloned()
                .collect(),
        };

        if let Some(limit) = query.limit {
            selected.truncate(limit as usize);
        }
        Ok(selected)
    }

    async fn update(
        &self,
        table: Table,
        patch: Document,
        filter: Filter,
    ) -> Result<Written, StoreError> {
        self.check_available(table)?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table).or_default();

        let targets: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| filter.matches(row))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return Ok(Written {
                data: Vec::new(),
                status: WriteStatus::Unmatched,
            });
        }

        let mut patched = rows.clone();
        for &i in &targets {
            for (field, value) in &patch {
                patched[i].insert(field.clone(), value.clone());
            }
        }
        for &i in &targets {
            let others = patched
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, row)| row);
            if let Some(index) = violated_index(table, others, &patched[i]) {
                return Err(StoreError::DuplicateKey(index));
            }
        }

        let data = targets.iter().map(|&i| patched[i].clone()).collect();
        *rows = patched;
        Ok(Written {
            data,
            status: WriteStatus::Updated,
        })
    }

    async fn delete(&self, table: Table, filter: Filter) -> Result<u64, StoreError> {
        self.check_available(table)?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table).or_default();
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }
}

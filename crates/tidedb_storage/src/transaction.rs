//! Read and write transactions.

use crate::database::{Inner, Snapshot};
use crate::error::{StorageError, StorageResult};
use crate::table::{Column, Table, TableSpec};
use crate::types::{ColKey, RowKey, TableKey};
use crate::value::Value;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use std::collections::BTreeMap;
use std::sync::Arc;

impl Snapshot {
    fn table(&self, key: TableKey) -> StorageResult<&Table> {
        self.tables
            .get(&key)
            .ok_or(StorageError::UnknownTableKey { key: key.as_u32() })
    }

    fn table_mut(&mut self, key: TableKey) -> StorageResult<&mut Table> {
        self.tables
            .get_mut(&key)
            .ok_or(StorageError::UnknownTableKey { key: key.as_u32() })
    }

    fn rows(&self, key: TableKey) -> StorageResult<Vec<RowKey>> {
        Ok(self.table(key)?.rows.keys().copied().collect())
    }

    fn find_by_primary_key(&self, key: TableKey, value: &Value) -> StorageResult<Option<RowKey>> {
        let table = self.table(key)?;
        let pk = table.primary_key.ok_or_else(|| StorageError::NoPrimaryKey {
            table: table.name.clone(),
        })?;
        table.find_first(pk, value)
    }
}

/// A read transaction: an isolated snapshot of the committed state.
///
/// Holding a read transaction does not block writers; the snapshot simply
/// never observes later commits.
#[derive(Debug)]
pub struct ReadTransaction {
    snapshot: Snapshot,
}

impl ReadTransaction {
    pub(crate) fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Returns the commit version this snapshot was taken at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    /// Looks up a table key by name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<TableKey> {
        self.snapshot.by_name.get(name).copied()
    }

    /// Looks up a column key by name.
    pub fn col_key(&self, table: TableKey, name: &str) -> StorageResult<ColKey> {
        Ok(self.snapshot.table(table)?.column_by_name(name)?.key)
    }

    /// Returns all row keys of a table, in insertion order.
    pub fn rows(&self, table: TableKey) -> StorageResult<Vec<RowKey>> {
        self.snapshot.rows(table)
    }

    /// Returns the number of rows in a table.
    pub fn row_count(&self, table: TableKey) -> StorageResult<usize> {
        Ok(self.snapshot.table(table)?.rows.len())
    }

    /// Reads one cell.
    pub fn get(&self, table: TableKey, row: RowKey, col: ColKey) -> StorageResult<Value> {
        self.snapshot.table(table)?.get(row, col)
    }

    /// Returns the first row whose cell in `col` equals `value`.
    pub fn find_first(
        &self,
        table: TableKey,
        col: ColKey,
        value: &Value,
    ) -> StorageResult<Option<RowKey>> {
        self.snapshot.table(table)?.find_first(col, value)
    }

    /// Returns the row whose primary-key cell equals `value`.
    pub fn find_by_primary_key(
        &self,
        table: TableKey,
        value: &Value,
    ) -> StorageResult<Option<RowKey>> {
        self.snapshot.find_by_primary_key(table, value)
    }
}

/// A write transaction holding the exclusive writer lock.
///
/// Changes are staged against a private copy of the committed state and
/// become visible atomically on [`WriteTransaction::commit`]. Dropping the
/// transaction without committing discards all staged changes and releases
/// the lock; a rolled-back transaction consumes no commit version.
pub struct WriteTransaction {
    inner: Arc<Inner>,
    _guard: ArcMutexGuard<RawMutex, ()>,
    working: Snapshot,
}

impl WriteTransaction {
    pub(crate) fn new(
        inner: Arc<Inner>,
        guard: ArcMutexGuard<RawMutex, ()>,
        working: Snapshot,
    ) -> Self {
        Self {
            inner,
            _guard: guard,
            working,
        }
    }

    /// Returns the version this transaction will commit as.
    #[must_use]
    pub fn commit_version(&self) -> u64 {
        self.working.version + 1
    }

    /// Looks up a table key by name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<TableKey> {
        self.working.by_name.get(name).copied()
    }

    /// Looks up a column key by name.
    pub fn col_key(&self, table: TableKey, name: &str) -> StorageResult<ColKey> {
        Ok(self.working.table(table)?.column_by_name(name)?.key)
    }

    /// Returns all row keys of a table, in insertion order.
    pub fn rows(&self, table: TableKey) -> StorageResult<Vec<RowKey>> {
        self.working.rows(table)
    }

    /// Returns the number of rows in a table.
    pub fn row_count(&self, table: TableKey) -> StorageResult<usize> {
        Ok(self.working.table(table)?.rows.len())
    }

    /// Reads one cell from the staged state.
    pub fn get(&self, table: TableKey, row: RowKey, col: ColKey) -> StorageResult<Value> {
        self.working.table(table)?.get(row, col)
    }

    /// Returns the first row whose cell in `col` equals `value`.
    pub fn find_first(
        &self,
        table: TableKey,
        col: ColKey,
        value: &Value,
    ) -> StorageResult<Option<RowKey>> {
        self.working.table(table)?.find_first(col, value)
    }

    /// Returns the row whose primary-key cell equals `value`.
    pub fn find_by_primary_key(
        &self,
        table: TableKey,
        value: &Value,
    ) -> StorageResult<Option<RowKey>> {
        self.working.find_by_primary_key(table, value)
    }

    /// Creates a new table from a spec.
    ///
    /// Fails if a table with the same name exists, or if the declared
    /// primary key does not name one of the columns.
    pub fn add_table(&mut self, spec: TableSpec) -> StorageResult<TableKey> {
        if self.working.by_name.contains_key(&spec.name) {
            return Err(StorageError::TableExists { name: spec.name });
        }
        let key = TableKey::new(self.working.next_table);
        self.working.next_table += 1;

        let mut columns = Vec::with_capacity(spec.columns.len());
        for col_spec in spec.columns {
            let col_key = ColKey::new(self.working.next_col);
            self.working.next_col += 1;
            columns.push(Column {
                key: col_key,
                spec: col_spec,
            });
        }

        let primary_key = match &spec.primary_key {
            Some(name) => Some(
                columns
                    .iter()
                    .find(|c| &c.spec.name == name)
                    .ok_or_else(|| StorageError::column_not_found(&spec.name, name))?
                    .key,
            ),
            None => None,
        };

        self.working.by_name.insert(spec.name.clone(), key);
        self.working.tables.insert(
            key,
            Table {
                name: spec.name,
                columns,
                primary_key,
                rows: BTreeMap::new(),
                next_row: 0,
            },
        );
        Ok(key)
    }

    /// Returns the existing table with the spec's name, or creates it.
    pub fn get_or_add_table(&mut self, spec: TableSpec) -> StorageResult<TableKey> {
        if let Some(key) = self.working.by_name.get(&spec.name) {
            return Ok(*key);
        }
        self.add_table(spec)
    }

    /// Inserts an empty row and returns its key.
    pub fn insert_row(&mut self, table: TableKey) -> StorageResult<RowKey> {
        Ok(self.working.table_mut(table)?.insert_row())
    }

    /// Deletes a row.
    pub fn delete_row(&mut self, table: TableKey, row: RowKey) -> StorageResult<()> {
        self.working.table_mut(table)?.delete_row(row)
    }

    /// Removes every row of a table, keeping its columns.
    pub fn clear_table(&mut self, table: TableKey) -> StorageResult<()> {
        self.working.table_mut(table)?.rows.clear();
        Ok(())
    }

    /// Writes one cell, checking the value against the column's declaration.
    pub fn set(
        &mut self,
        table: TableKey,
        row: RowKey,
        col: ColKey,
        value: Value,
    ) -> StorageResult<()> {
        self.working.table_mut(table)?.set(row, col, value)
    }

    /// Commits the staged changes and returns the new commit version.
    ///
    /// The writer lock is released before commit observers run, so observers
    /// may begin their own transactions.
    pub fn commit(mut self) -> StorageResult<u64> {
        self.working.version += 1;
        let version = self.working.version;
        {
            let mut committed = self.inner.committed.write();
            *committed = std::mem::replace(&mut self.working, Snapshot::new());
        }
        let inner = Arc::clone(&self.inner);
        drop(self);

        let observers: Vec<_> = inner.observers.read().clone();
        for observer in observers {
            observer(version);
        }
        Ok(version)
    }

    /// Discards all staged changes and releases the writer lock.
    ///
    /// Equivalent to dropping the transaction; provided for call sites where
    /// the rollback should be explicit.
    pub fn rollback(self) {}
}

impl std::fmt::Debug for WriteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("commit_version", &self.commit_version())
            .finish()
    }
}

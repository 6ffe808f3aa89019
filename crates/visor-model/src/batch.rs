use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use visor_store::StoreContext;

use crate::error::{ModelError, ModelResult};

/// Where a model's rows go: table name plus primary key columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub primary_key: &'static [&'static str],
}

impl TableSpec {
    /// Render the primary key of `row` as `a/b/c`.
    pub fn key_of(&self, row: &Value) -> ModelResult<String> {
        let mut parts = Vec::with_capacity(self.primary_key.len());
        for column in self.primary_key {
            let value = row.get(column).ok_or_else(|| ModelError::MissingKeyColumn {
                table: self.name.to_string(),
                column: (*column).to_string(),
            })?;
            parts.push(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        Ok(parts.join("/"))
    }
}

/// A unit of writes against the model database.
#[async_trait]
pub trait StorageBatch: Send + Sync {
    /// Write `rows` into `table`. Either every row is accepted or none is.
    async fn persist_model(
        &self,
        ctx: &StoreContext,
        table: &TableSpec,
        rows: Vec<Value>,
    ) -> ModelResult<()>;
}

/// A model that knows how to write itself into a batch.
#[async_trait]
pub trait Persistable: Send + Sync {
    async fn persist(&self, ctx: &StoreContext, batch: &dyn StorageBatch) -> ModelResult<()>;
}

#[derive(Debug, Default)]
struct Table {
    keys: HashSet<String>,
    rows: Vec<Value>,
}

/// In-memory [`StorageBatch`] that enforces primary keys.
#[derive(Debug, Default)]
pub struct MemoryBatch {
    tables: Mutex<HashMap<&'static str, Table>>,
}

impl MemoryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows written to `table`, in write order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .expect("batch lock poisoned")
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .expect("batch lock poisoned")
            .get(table)
            .map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl StorageBatch for MemoryBatch {
    async fn persist_model(
        &self,
        ctx: &StoreContext,
        table: &TableSpec,
        rows: Vec<Value>,
    ) -> ModelResult<()> {
        ctx.check()?;
        let keys = rows
            .iter()
            .map(|row| table.key_of(row))
            .collect::<ModelResult<Vec<_>>>()?;

        let mut tables = self.tables.lock().expect("batch lock poisoned");
        let entry = tables.entry(table.name).or_default();
        let mut incoming = HashSet::with_capacity(keys.len());
        for key in &keys {
            if entry.keys.contains(key) || !incoming.insert(key.as_str()) {
                return Err(ModelError::DuplicateKey {
                    table: table.name.to_string(),
                    key: key.clone(),
                });
            }
        }
        entry.keys.extend(keys);
        entry.rows.extend(rows);
        Ok(())
    }
}

//! Table CRUD operations
//!
//! Each operation maps one inbound request onto one or two backend calls.
//! Nothing is held between requests; the only sequencing is the read that
//! precedes create (id assignment) and, when enabled, the existence probe that
//! precedes replace and delete. None of these sequences are atomic.

use crate::backend::{BackendClient, BackendError};
use crate::envelope::ApiError;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info};

/// The operation a request was mapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    ListAll,
    GetOne,
    ReplaceOne,
    PatchOne,
    DeleteOne,
}

impl Operation {
    /// Message used in the error envelope when the backend gives nothing better
    pub fn failure_message(self) -> &'static str {
        match self {
            Operation::Create => "failed to create record",
            Operation::ListAll => "failed to list records",
            Operation::GetOne => "failed to fetch record",
            Operation::ReplaceOne => "failed to replace record",
            Operation::PatchOne => "failed to patch record",
            Operation::DeleteOne => "failed to delete record",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::ListAll => "list",
            Operation::GetOne => "get",
            Operation::ReplaceOne => "replace",
            Operation::PatchOne => "patch",
            Operation::DeleteOne => "delete",
        };
        f.write_str(name)
    }
}

/// Forwards table operations to the backend
#[derive(Clone)]
pub struct Gateway {
    backend: BackendClient,
    existence_probe: bool,
}

impl Gateway {
    pub fn new(backend: BackendClient, existence_probe: bool) -> Self {
        Self {
            backend,
            existence_probe,
        }
    }

    /// Assign `max(id) + 1` to the payload and submit it as a new record
    pub async fn create(
        &self,
        table: &str,
        mut payload: Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let op = Operation::Create;
        let records = self.backend.list(table).await.map_err(|e| fail(op, e))?;
        let id = next_id(&records).map_err(|e| fail(op, e))?;
        debug!(table, id, "Assigned record id");

        payload.insert("id".to_string(), Value::from(id));
        let created = self
            .backend
            .create(table, &payload)
            .await
            .map_err(|e| fail(op, e))?;

        info!(table, id, "Record created");
        Ok(created)
    }

    /// Return the backend's collection unmodified
    pub async fn list_all(&self, table: &str) -> Result<Value, ApiError> {
        self.backend
            .list(table)
            .await
            .map_err(|e| fail(Operation::ListAll, e))
    }

    pub async fn get_one(&self, table: &str, id: &str) -> Result<Value, ApiError> {
        self.backend
            .get(table, id)
            .await
            .map_err(|e| fail(Operation::GetOne, e))
    }

    /// Replace a record in full, probing `table/id` first when probing is on
    pub async fn replace_one(
        &self,
        table: &str,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let op = Operation::ReplaceOne;
        self.probe(op, table, id).await?;
        self.backend
            .replace(table, id, &payload)
            .await
            .map_err(|e| fail(op, e))
    }

    /// Forward a partial update as-is; no probe
    pub async fn patch_one(
        &self,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, ApiError> {
        self.backend
            .patch(table, id, &fields)
            .await
            .map_err(|e| fail(Operation::PatchOne, e))
    }

    /// Delete a record. A failed probe means no delete is issued.
    pub async fn delete_one(&self, table: &str, id: &str) -> Result<bool, ApiError> {
        let op = Operation::DeleteOne;
        self.probe(op, table, id).await?;
        self.backend
            .delete(table, id)
            .await
            .map_err(|e| fail(op, e))?;

        info!(table, id, "Record deleted");
        Ok(true)
    }

    async fn probe(&self, op: Operation, table: &str, id: &str) -> Result<(), ApiError> {
        if !self.existence_probe {
            return Ok(());
        }
        self.backend
            .get(table, id)
            .await
            .map(|_| ())
            .map_err(|e| fail(op, e))
    }
}

fn fail(op: Operation, source: BackendError) -> ApiError {
    ApiError::Backend { op, source }
}

/// Compute `1 + max(id)` over a collection read, `1` for an empty collection.
///
/// Ids are read from numbers and from strings holding a non-negative integer
/// (some backends store ids as strings). Records without a usable id are
/// skipped.
pub fn next_id(records: &Value) -> Result<u64, BackendError> {
    let records = records.as_array().ok_or_else(|| {
        BackendError::Decode("expected the collection to be a JSON array".to_string())
    })?;

    let max = records
        .iter()
        .filter_map(|record| record.get("id"))
        .filter_map(numeric_id)
        .max()
        .unwrap_or(0);

    Ok(max.saturating_add(1))
}

fn numeric_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

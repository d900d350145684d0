//! Bulk export and import as newline-delimited JSON
//!
//! Each line is one document: `{"id":"flags:dark-mode","value":{...}}`.

use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::store::{Document, JsonDataStore};
use crate::{AppErrors, Key, Pattern, Result, StoreError};

/// One exported document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLine {
    pub id: Key,
    pub value: Document,
}

/// What to do with an imported id that already holds a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportStrategy {
    /// Leave the stored document and report the line
    #[default]
    Keep,
    /// Overwrite the stored document
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    /// Ids written, in input order
    pub success: Vec<Key>,
    /// Rejected lines; field names are `line <n>`
    pub errors: AppErrors,
}

/// Serialize every document matching `patterns`, one line each (no newline)
pub fn export_ndjson(
    store: &JsonDataStore,
    patterns: &[Pattern],
) -> BoxStream<'static, Result<String>> {
    store
        .get_by_id_like(patterns)
        .and_then(|(id, value)| {
            future::ready(serde_json::to_string(&ExportLine { id, value }).map_err(|e| {
                StoreError::Serialization(format!("Failed to serialize document: {}", e))
            }))
        })
        .boxed()
}

/// Read lines from `reader` and write them into `store`.
///
/// Malformed lines and domain failures are collected in the result; back-end
/// failures abort the import.
pub async fn import_ndjson<R>(
    store: &JsonDataStore,
    reader: R,
    strategy: ImportStrategy,
) -> Result<ImportResult>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut result = ImportResult::default();
    let mut line_no = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| StoreError::Deserialization(format!("Failed to read import line: {}", e)))?
    {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let field = format!("line {}", line_no);

        let entry: ExportLine = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(line = line_no, error = %e, "Rejecting malformed import line");
                result.errors += AppErrors::field_error_with_args(
                    field,
                    "error.import.malformed",
                    vec![e.to_string()],
                );
                continue;
            }
        };

        let written = match store.create(entry.id.clone(), entry.value.clone()).await {
            Err(StoreError::AlreadyExists(_)) if strategy == ImportStrategy::Replace => {
                store
                    .update(entry.id.clone(), entry.id.clone(), entry.value)
                    .await
            }
            other => other,
        };

        match written {
            Ok(_) => result.success.push(entry.id),
            Err(e) => match e.app_errors() {
                Some(errors) => result.errors += relabel(errors, &field),
                None => return Err(e),
            },
        }
    }

    info!(
        imported = result.success.len(),
        rejected = !result.errors.is_empty(),
        "Import finished"
    );
    Ok(result)
}

/// Attach every message of `errors` to `field`
fn relabel(errors: AppErrors, field: &str) -> AppErrors {
    let messages = errors
        .errors
        .into_iter()
        .chain(errors.field_errors.into_values().flatten());
    let mut relabeled = AppErrors::new();
    relabeled
        .field_errors
        .entry(field.to_string())
        .or_default()
        .extend(messages);
    relabeled
}

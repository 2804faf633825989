//! Record batches
//!
//! An ingestion client fills fixed-size batches, then either discards a batch
//! or merges it into a final set. Merging is an upsert on the primary-key
//! tuple: a later record replaces an earlier one with the same tuple. Closing
//! the final set inserts what survived in one transaction.

use super::{Record, RecordWriter};
use crate::catalog::{SchemaCatalog, Series};
use crate::error::{Error, Result};
use crate::store::RelationalStore;
use crate::value::format;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What to do with a batch when closing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchAction {
    Discard,
    /// Merge into the final set, inserted when the final set closes
    PersistDelayed,
}

/// What to do with a final set when closing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalAction {
    Discard,
    Insert,
}

/// Up to `capacity` records for one series
#[derive(Debug, Clone)]
pub struct RecordBatch {
    series: Arc<Series>,
    capacity: usize,
    records: Vec<Record>,
}

impl RecordBatch {
    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Add a record after checking it against the series
    pub fn push(&mut self, record: Record) -> Result<()> {
        if self.is_full() {
            return Err(Error::InvalidRequest(format!(
                "batch for {} is full ({} records)",
                self.series.name(),
                self.capacity
            )));
        }
        record.typed_values(&self.series)?;
        record.primary_tuple(&self.series)?;
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

/// Records waiting for insertion, one per primary-key tuple
#[derive(Debug, Clone)]
pub struct FinalSet {
    series: Arc<Series>,
    records: BTreeMap<Vec<String>, Record>,
}

impl FinalSet {
    pub fn new(series: Arc<Series>) -> Self {
        Self {
            series,
            records: BTreeMap::new(),
        }
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in primary-key literal order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }
}

/// Start a batch of at most `n` records
pub fn create_batch(series: Arc<Series>, n: usize) -> Result<RecordBatch> {
    if n == 0 {
        return Err(Error::InvalidRequest(format!(
            "batch for {} must hold at least one record",
            series.name()
        )));
    }
    let mut records = Vec::new();
    records.try_reserve(n)?;
    Ok(RecordBatch {
        series,
        capacity: n,
        records,
    })
}

/// Upsert a record into the final set, returning the record it replaced
pub fn merge_into_final(final_set: &mut FinalSet, record: Record) -> Result<Option<Record>> {
    let key: Vec<String> = record
        .primary_tuple(&final_set.series)?
        .iter()
        .map(format)
        .collect();
    Ok(final_set.records.insert(key, record))
}

/// Close a batch, merging its records into `final_set` when persisting
///
/// Returns the number of records merged.
pub fn close_batch(batch: RecordBatch, action: BatchAction, final_set: &mut FinalSet) -> Result<usize> {
    match action {
        BatchAction::Discard => {
            debug!("Discarded batch of {} records for {}", batch.len(), batch.series.name());
            Ok(0)
        }
        BatchAction::PersistDelayed => {
            if batch.series.name() != final_set.series.name() {
                return Err(Error::InvalidRequest(format!(
                    "batch for {} cannot merge into final set for {}",
                    batch.series.name(),
                    final_set.series.name()
                )));
            }
            let merged = batch.records.len();
            for record in batch.records {
                merge_into_final(final_set, record)?;
            }
            Ok(merged)
        }
    }
}

/// Close a final set, inserting its records when asked
///
/// Returns the row identifiers of inserted records.
pub fn close_final<S: RelationalStore + ?Sized>(
    store: &S,
    writer: &RecordWriter,
    final_set: FinalSet,
    action: FinalAction,
) -> Result<Vec<i64>> {
    match action {
        FinalAction::Discard => Ok(Vec::new()),
        FinalAction::Insert => {
            let records: Vec<Record> = final_set.records.into_values().collect();
            let recnums = writer.insert_all(store, &final_set.series, &records)?;
            info!(
                "Inserted {} records into {}",
                recnums.len(),
                final_set.series.name()
            );
            Ok(recnums)
        }
    }
}

/// Ordered primary-key attribute names of a series
pub fn primary_key_names(catalog: &SchemaCatalog, series: &str) -> Result<Vec<String>> {
    catalog.primary_keys(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{create_series, SeriesDefinition};
    use crate::shadow::{CreationGate, ShadowIndexManager, SyncMode};
    use crate::store::SqliteStore;
    use crate::value::Value;

    fn setup() -> (SqliteStore, SchemaCatalog, Arc<Series>) {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = SchemaCatalog::new();
        let def = SeriesDefinition::from_json(
            r#"{
                "name": "su.ingest",
                "attributes": [
                    { "name": "fsn", "type": "int" },
                    { "name": "value", "type": "double" }
                ],
                "primary_key": ["fsn"]
            }"#,
        )
        .unwrap();
        let series = create_series(&store, &catalog, &def).unwrap();
        (store, catalog, series)
    }

    fn rec(fsn: i32, value: f64) -> Record {
        Record::new()
            .set("fsn", Value::Int(fsn))
            .set("value", Value::Double(value))
    }

    #[test]
    fn test_batch_capacity() {
        let (_store, _catalog, series) = setup();
        assert!(create_batch(series.clone(), 0).is_err());
        let mut batch = create_batch(series, 2).unwrap();
        batch.push(rec(1, 0.5)).unwrap();
        batch.push(rec(2, 0.5)).unwrap();
        assert!(batch.is_full());
        assert!(batch.push(rec(3, 0.5)).is_err());
        assert!(batch.push(Record::new().set("value", Value::Double(1.0))).is_err());
    }

    #[test]
    fn test_merge_is_upsert() {
        let (_store, _catalog, series) = setup();
        let mut final_set = FinalSet::new(series);
        assert!(merge_into_final(&mut final_set, rec(1, 0.5)).unwrap().is_none());
        let replaced = merge_into_final(&mut final_set, rec(1, 2.0)).unwrap();
        assert_eq!(replaced, Some(rec(1, 0.5)));
        assert_eq!(final_set.len(), 1);
        assert_eq!(
            final_set.records().next().unwrap().get("value"),
            Some(&Value::Double(2.0))
        );
    }

    #[test]
    fn test_close_final_inserts_survivors() {
        let (store, catalog, series) = setup();
        let manager = ShadowIndexManager::new(CreationGate::new(true), "_shadow", SyncMode::Trigger);
        manager.create(&store, &series, None).unwrap();
        let writer = RecordWriter::new(manager);

        let mut final_set = FinalSet::new(series.clone());
        let mut kept = create_batch(series.clone(), 3).unwrap();
        kept.push(rec(1, 0.5)).unwrap();
        kept.push(rec(2, 0.5)).unwrap();
        kept.push(rec(1, 1.5)).unwrap();
        assert_eq!(close_batch(kept, BatchAction::PersistDelayed, &mut final_set).unwrap(), 3);

        let mut dropped = create_batch(series, 1).unwrap();
        dropped.push(rec(9, 0.0)).unwrap();
        assert_eq!(close_batch(dropped, BatchAction::Discard, &mut final_set).unwrap(), 0);

        let recnums = close_final(&store, &writer, final_set, FinalAction::Insert).unwrap();
        assert_eq!(recnums.len(), 2);
        assert_eq!(
            store.query_i64("SELECT count(*) FROM \"su.ingest_shadow\"").unwrap(),
            Some(2)
        );
        assert_eq!(
            store
                .query_binary("SELECT value FROM \"su.ingest\" WHERE fsn = 1")
                .unwrap()[0][0]
                .as_f64(),
            Some(1.5)
        );
        assert_eq!(primary_key_names(&catalog, "SU.INGEST").unwrap(), vec!["fsn".to_string()]);
    }
}

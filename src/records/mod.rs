//! Record ingestion surface
//!
//! What a batch ingestion client needs from the core: records keyed by
//! attribute name, a writer that keeps the shadow index in step, and batches
//! that collect records before they are merged and inserted.

mod batch;
mod writer;

pub use batch::{
    close_batch, close_final, create_batch, merge_into_final, primary_key_names, BatchAction,
    FinalAction, FinalSet, RecordBatch,
};
pub use writer::RecordWriter;

use crate::catalog::Series;
use crate::error::{Error, Result};
use crate::store::Cell;
use crate::value::{convert, parse, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One record's keyword values, keyed by lower-cased attribute name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a keyword value
    pub fn set(mut self, name: &str, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: Value) -> Option<Value> {
        self.values.insert(name.trim().to_lowercase(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(&name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Values converted to the series' attribute types, in rank order
    ///
    /// Attributes the record leaves out are skipped; names the series does
    /// not declare are an error.
    pub fn typed_values(&self, series: &Series) -> Result<Vec<(String, Value)>> {
        for name in self.values.keys() {
            if series.attribute(name).is_none() {
                return Err(Error::UnknownAttribute {
                    series: series.name().to_string(),
                    attribute: name.clone(),
                });
            }
        }
        let mut out = Vec::with_capacity(self.values.len());
        for attr in series.attributes() {
            if let Some(value) = self.values.get(&attr.name) {
                out.push((attr.name.clone(), convert(value, attr.ty)?));
            }
        }
        Ok(out)
    }

    /// Primary-key tuple converted to the key attribute types
    pub fn primary_tuple(&self, series: &Series) -> Result<Vec<Value>> {
        series
            .primary_keys()
            .iter()
            .map(|key| {
                let ty = series.attribute_type(key)?;
                match self.values.get(key) {
                    Some(value) => Ok(convert(value, ty)?),
                    None => Err(Error::InvalidRequest(format!(
                        "record for {} has no value for primary-key attribute {}",
                        series.name(),
                        key
                    ))),
                }
            })
            .collect()
    }
}

/// Read a result cell back as a typed value
///
/// Cells are taken as stored: text verbatim, reals narrowed by cast. The
/// literal parser would unquote text and reject a float's widened double.
pub(crate) fn cell_value(cell: &Cell, ty: ValueType) -> Result<Value> {
    let value = match (cell, ty) {
        (Cell::Null, _) => Value::missing(ty),
        (Cell::Text(s), ValueType::String) => Value::String(s.clone()),
        (Cell::Integer(v), ValueType::String) => Value::String(v.to_string()),
        (Cell::Real(v), ValueType::String) => Value::String(v.to_string()),
        (Cell::Real(v), ValueType::Float) => Value::Float(*v as f32),
        (Cell::Integer(v), ValueType::Float) => Value::Float(*v as f32),
        (Cell::Real(v), ValueType::Double) => Value::Double(*v),
        (Cell::Integer(v), ValueType::Double) => Value::Double(*v as f64),
        (Cell::Real(v), ValueType::Time) => Value::Time(*v),
        (Cell::Integer(v), ValueType::Time) => Value::Time(*v as f64),
        (Cell::Integer(v), _) => convert(&Value::LongLong(*v), ty)?,
        (Cell::Real(v), _) => convert(&Value::Double(*v), ty)?,
        (Cell::Text(s), _) => parse(s, ty)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{create_series, Attribute, SchemaCatalog, SeriesDefinition};
    use crate::shadow::{CreationGate, ShadowIndexManager, SyncMode};
    use crate::store::{RelationalStore, SqliteStore};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn series() -> Series {
        Series::new(
            "a.b",
            "",
            vec![
                Attribute::new("t_rec", ValueType::Time),
                Attribute::new("camera", ValueType::Char),
                Attribute::new("quality", ValueType::Int),
            ],
            &["t_rec".to_string(), "camera".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_primary_tuple_converts() {
        let s = series();
        let rec = Record::new()
            .set("T_REC", Value::Double(120.0))
            .set("camera", Value::Int(2));
        assert_eq!(
            rec.primary_tuple(&s).unwrap(),
            vec![Value::Time(120.0), Value::Char(2)]
        );

        let out_of_range = Record::new()
            .set("t_rec", Value::Double(0.0))
            .set("camera", Value::Int(300));
        assert_eq!(
            out_of_range.primary_tuple(&s).unwrap_err().kind(),
            crate::error::ErrorKind::Range
        );

        let partial = Record::new().set("t_rec", Value::Double(0.0));
        assert!(matches!(partial.primary_tuple(&s), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_typed_values_in_rank_order() {
        let s = series();
        let rec = Record::new()
            .set("quality", Value::LongLong(7))
            .set("t_rec", Value::Time(1.0));
        let typed = rec.typed_values(&s).unwrap();
        assert_eq!(typed[0], ("t_rec".to_string(), Value::Time(1.0)));
        assert_eq!(typed[1], ("quality".to_string(), Value::Int(7)));

        let bad = Record::new().set("bogus", Value::Int(1));
        assert!(matches!(bad.typed_values(&s), Err(Error::UnknownAttribute { .. })));
    }

    #[test]
    fn test_cell_value() {
        assert_eq!(cell_value(&Cell::Integer(5), ValueType::Short).unwrap(), Value::Short(5));
        assert_eq!(cell_value(&Cell::Real(2.5), ValueType::Time).unwrap(), Value::Time(2.5));
        assert!(cell_value(&Cell::Null, ValueType::Int).unwrap().is_missing());
        assert_eq!(
            cell_value(&Cell::Text("x".to_string()), ValueType::String).unwrap(),
            Value::String("x".to_string())
        );
    }

    #[test]
    fn test_cell_value_keeps_stored_form() {
        // Quotes belong to the value, not to a literal
        assert_eq!(
            cell_value(&Cell::Text("'x'".to_string()), ValueType::String).unwrap(),
            Value::String("'x'".to_string())
        );
        assert_eq!(
            cell_value(&Cell::Integer(12), ValueType::String).unwrap(),
            Value::String("12".to_string())
        );
        // A float widened to double on the way in narrows back exactly
        let widened = 0.1f32.to_string().parse::<f64>().unwrap();
        assert_eq!(
            cell_value(&Cell::Real(widened), ValueType::Float).unwrap(),
            Value::Float(0.1)
        );
        assert!(cell_value(&Cell::Text("NaN".to_string()), ValueType::Float)
            .unwrap()
            .is_missing());
        assert_eq!(cell_value(&Cell::Integer(3), ValueType::Double).unwrap(), Value::Double(3.0));
    }

    // ==================== Store round trip ====================

    const STORED: [(&str, ValueType); 8] = [
        ("c", ValueType::Char),
        ("s", ValueType::Short),
        ("i", ValueType::Int),
        ("l", ValueType::LongLong),
        ("f", ValueType::Float),
        ("d", ValueType::Double),
        ("t", ValueType::Time),
        ("txt", ValueType::String),
    ];

    fn stored_series(store: &SqliteStore) -> Arc<Series> {
        let attributes: Vec<String> = STORED
            .iter()
            .map(|(name, ty)| format!(r#"{{ "name": "{}", "type": "{}" }}"#, name, ty.name()))
            .collect();
        let def = SeriesDefinition::from_json(&format!(
            r#"{{ "name": "su.rt", "attributes": [{}], "primary_key": ["l"] }}"#,
            attributes.join(", ")
        ))
        .unwrap();
        create_series(store, &SchemaCatalog::new(), &def).unwrap()
    }

    /// Write one record and read every column back through `cell_value`
    fn store_and_load(store: &SqliteStore, series: &Series, values: &[Value]) -> Vec<Value> {
        let writer = RecordWriter::new(ShadowIndexManager::new(
            CreationGate::new(false),
            "_shadow",
            SyncMode::Application,
        ));
        let record = STORED
            .iter()
            .zip(values)
            .fold(Record::new(), |rec, ((name, _), v)| rec.set(name, v.clone()));
        let recnum = writer.insert(store, series, &record).unwrap();

        let names: Vec<&str> = STORED.iter().map(|(name, _)| *name).collect();
        let rows = store
            .query_binary(&format!(
                "SELECT {} FROM \"su.rt\" WHERE recnum = {}",
                names.join(", "),
                recnum
            ))
            .unwrap();
        assert_eq!(rows.len(), 1);
        rows[0]
            .iter()
            .zip(STORED.iter())
            .map(|(cell, (_, ty))| cell_value(cell, *ty).unwrap())
            .collect()
    }

    /// Decimal text with at most 15 significant digits, which every double
    /// parser reads back to the same value
    fn short_decimal() -> impl Strategy<Value = f64> {
        (-999_999_999_999_999i64..=999_999_999_999_999, -30i32..30)
            .prop_map(|(m, e)| format!("{}e{}", m, e).parse::<f64>().unwrap_or(0.0))
    }

    fn stored_row() -> impl Strategy<Value = Vec<Value>> {
        (
            any::<i8>(),
            any::<i16>(),
            any::<i32>(),
            any::<i64>(),
            any::<f32>().prop_filter("finite", |v| v.is_finite()),
            short_decimal(),
            short_decimal(),
            "[^\\x00]*",
        )
            .prop_map(|(c, s, i, l, f, d, t, txt)| {
                vec![
                    Value::Char(c),
                    Value::Short(s),
                    Value::Int(i),
                    Value::LongLong(l),
                    Value::Float(f),
                    Value::Double(d),
                    Value::Time(t),
                    Value::String(txt),
                ]
            })
    }

    #[test]
    fn test_store_keeps_missing_and_awkward_values() {
        let store = SqliteStore::open_in_memory().unwrap();
        let series = stored_series(&store);

        let missing: Vec<Value> = STORED.iter().map(|(_, ty)| Value::missing(*ty)).collect();
        let back = store_and_load(&store, &series, &missing);
        assert_eq!(back, missing);
        assert!(back.iter().all(Value::is_missing));

        let awkward = vec![
            Value::Char(i8::MAX),
            Value::Short(-1),
            Value::Int(i32::MAX),
            Value::LongLong(i64::MAX),
            Value::Float(0.1),
            Value::Double(0.1),
            Value::Time(1.5),
            Value::String("'x'".to_string()),
        ];
        assert_eq!(store_and_load(&store, &series, &awkward), awkward);
    }

    proptest! {
        #[test]
        fn prop_store_round_trip(values in stored_row()) {
            let store = SqliteStore::open_in_memory().unwrap();
            let series = stored_series(&store);
            prop_assert_eq!(store_and_load(&store, &series, &values), values);
        }
    }
}

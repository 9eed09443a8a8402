//! The named, ordered feature list shared by dataset export, the model artifact
//! and request validation at serving time.

use super::{
    EnrichedTransaction, WindowSpec, AMOUNT, AMOUNT_LOG, HOURS_SINCE_LAST_TX,
    IS_RETURNING_ACCOUNT, TX_SEQUENCE_INDEX, TYPE,
};
use crate::error::{FeatureError, Result, ValidationError};
use crate::transactions::TxType;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Row-major model input: one row per transaction, one column per schema name.
pub type FeatureMatrix = Array2<f32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// `type`, `amount`, `amount_log`, the window columns in table order, then
    /// `hours_since_last_tx`, `tx_sequence_index`, `is_returning_account`.
    pub fn from_windows(windows: &[WindowSpec]) -> Self {
        let mut names: Vec<String> = vec![TYPE.into(), AMOUNT.into(), AMOUNT_LOG.into()];
        names.extend(windows.iter().flat_map(WindowSpec::column_names));
        names.extend([
            HOURS_SINCE_LAST_TX.to_string(),
            TX_SEQUENCE_INDEX.to_string(),
            IS_RETURNING_ACCOUNT.to_string(),
        ]);
        Self { names }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Error unless `other` lists exactly the same names in the same order.
    pub fn ensure_matches(&self, other: &FeatureSchema) -> Result<()> {
        if self == other {
            return Ok(());
        }
        Err(FeatureError::SchemaMismatch {
            missing: self
                .names
                .iter()
                .filter(|n| !other.names.contains(n))
                .cloned()
                .collect(),
            expected: self.names.clone(),
            received: other.names.clone(),
        })
    }

    /// Check a `{field: value}` record carries every expected feature.
    pub fn check_record(&self, record: &Map<String, Value>) -> Result<()> {
        let missing: Vec<String> = self
            .names
            .iter()
            .filter(|n| !record.contains_key(n.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(FeatureError::SchemaMismatch {
            missing,
            expected: self.names.clone(),
            received: record.keys().cloned().collect(),
        })
    }

    /// Build the model input for enriched rows.
    pub fn matrix(&self, rows: &[EnrichedTransaction]) -> Result<FeatureMatrix> {
        if let Some(first) = rows.first() {
            let unresolved: Vec<String> = self
                .names
                .iter()
                .filter(|n| first.feature(n).is_none())
                .cloned()
                .collect();
            if !unresolved.is_empty() {
                return Err(FeatureError::SchemaMismatch {
                    missing: unresolved,
                    expected: self.names.clone(),
                    received: FeatureSchema::from_windows(&window_specs(first)).names,
                });
            }
        }
        Ok(Array2::from_shape_fn((rows.len(), self.len()), |(i, j)| {
            rows[i].feature(&self.names[j]).map_or(f32::NAN, |v| v as f32)
        }))
    }

    /// Build the model input for pre-computed `{field: value}` records. Extra
    /// fields are ignored; a missing feature is a schema mismatch. `type` must
    /// be one of `categories`.
    pub fn records_matrix(&self, records: &[Map<String, Value>], categories: &[TxType]) -> Result<FeatureMatrix> {
        let mut data = Vec::with_capacity(records.len() * self.len());
        for (i, record) in records.iter().enumerate() {
            self.check_record(record)?;
            for name in &self.names {
                let value = &record[name.as_str()];
                data.push(record_value(name, value, categories).map_err(|e| e.at(i))?);
            }
        }
        Array2::from_shape_vec((records.len(), self.len()), data)
            .map_err(|e| FeatureError::Model(e.to_string()))
    }

    /// Export form of an enriched row: the schema columns keyed by name, `type`
    /// as its label rather than its code.
    pub fn to_record(&self, row: &EnrichedTransaction) -> Map<String, Value> {
        self.names
            .iter()
            .map(|name| {
                let value = if name == TYPE {
                    Value::String(row.transaction.tx_type.as_str().to_string())
                } else {
                    row.feature(name)
                        .and_then(Number::from_f64)
                        .map_or(Value::Null, Value::Number)
                };
                (name.clone(), value)
            })
            .collect()
    }
}

fn window_specs(row: &EnrichedTransaction) -> Vec<WindowSpec> {
    use super::Aggregate;
    row.windows
        .iter()
        .map(|w| {
            let aggregates: Vec<Aggregate> =
                [Aggregate::Count, Aggregate::Sum, Aggregate::Mean, Aggregate::Max]
                    .into_iter()
                    .filter(|a| w.get(*a).is_some())
                    .collect();
            WindowSpec::new(w.width_hours, aggregates)
        })
        .collect()
}

/// Error unless `tx_type` is in the trained vocabulary.
pub fn check_category(tx_type: TxType, categories: &[TxType]) -> std::result::Result<(), ValidationError> {
    if categories.contains(&tx_type) {
        return Ok(());
    }
    Err(ValidationError::new(
        TYPE,
        tx_type.as_str(),
        "category not seen at training time",
    ))
}

fn record_value(name: &str, value: &Value, categories: &[TxType]) -> std::result::Result<f32, ValidationError> {
    let not_numeric = || ValidationError::new(name, value.to_string(), "expected a number");
    let narrow = |v: f64| {
        let f = v as f32;
        if f.is_finite() {
            Ok(f)
        } else {
            Err(ValidationError::new(name, value.to_string(), "outside f32 range"))
        }
    };
    match value {
        Value::String(s) if name == TYPE => {
            let tx_type = s.parse::<TxType>()?;
            check_category(tx_type, categories)?;
            Ok(f32::from(tx_type.code()))
        }
        Value::Number(n) if name == TYPE => {
            let code = n.as_u64().ok_or_else(not_numeric)?;
            let tx_type = TxType::ALL
                .iter()
                .copied()
                .find(|t| u64::from(t.code()) == code)
                .ok_or_else(|| ValidationError::new(name, n.to_string(), "unknown category code"))?;
            check_category(tx_type, categories)?;
            Ok(f32::from(tx_type.code()))
        }
        Value::Number(n) => n.as_f64().ok_or_else(not_numeric).and_then(narrow),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(not_numeric)
            .and_then(narrow),
        _ => Err(not_numeric()),
    }
}

//! Writes enriched datasets and the feature manifest consumed by training.

use crate::config::FeaturesConfig;
use crate::error::Result;
use crate::features::{EnrichedTransaction, FeatureSchema, WindowSpec, TYPE};
use crate::transactions::TxType;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const FEATURES_FILE: &str = "features.json";

/// Leading non-feature columns of every exported CSV.
pub const ID_COLUMNS: [&str; 4] = ["account_id", "timestamp_hours", "input_index", "is_fraud"];

/// Everything a training job needs to interpret the exported CSVs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureManifest {
    pub identifier: String,
    pub label: String,
    pub feature_names: FeatureSchema,
    pub windows: Vec<WindowSpec>,
    pub type_categories: Vec<TxType>,
}

impl FeatureManifest {
    pub fn new(features: &FeaturesConfig) -> Self {
        Self {
            identifier: ID_COLUMNS[0].to_string(),
            label: ID_COLUMNS[3].to_string(),
            feature_names: FeatureSchema::from_windows(&features.windows),
            windows: features.windows.clone(),
            type_categories: TxType::ALL.to_vec(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Write `rows` (selected by `indices`, in that order) as CSV: the identifier
/// columns, then one column per schema name. Unset values are empty cells.
pub fn write_rows<W: Write>(
    writer: W,
    schema: &FeatureSchema,
    rows: &[EnrichedTransaction],
    indices: &[usize],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(ID_COLUMNS.iter().copied().chain(schema.names().iter().map(String::as_str)))?;

    for &i in indices {
        let row = &rows[i];
        let tx = &row.transaction;
        let mut record: Vec<String> = Vec::with_capacity(ID_COLUMNS.len() + schema.len());
        record.push(tx.account_id.clone());
        record.push(tx.timestamp_hours.to_string());
        record.push(row.input_index.to_string());
        record.push(tx.is_fraud.map_or_else(String::new, |f| u8::from(f).to_string()));
        for name in schema.names() {
            let cell = if name == TYPE {
                tx.tx_type.as_str().to_string()
            } else {
                row.feature(name).map_or_else(String::new, |v| v.to_string())
            };
            record.push(cell);
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_split_csv(
    path: &Path,
    schema: &FeatureSchema,
    rows: &[EnrichedTransaction],
    indices: &[usize],
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_rows(file, schema, rows, indices)?;
    info!(path = %path.display(), rows = indices.len(), "wrote dataset split");
    Ok(())
}

//! Per-account temporal features: transactions → partitions → trailing windows → enriched rows.

mod builder;
mod schema;
mod window;

pub use builder::{BuildOutput, TemporalFeatureBuilder};
pub use schema::{check_category, FeatureMatrix, FeatureSchema};
pub use window::{Aggregate, Point, WindowAccumulator, WindowFeatures, WindowSpec};

use crate::transactions::Transaction;
use serde::{Deserialize, Serialize};

pub const TYPE: &str = "type";
pub const AMOUNT: &str = "amount";
pub const AMOUNT_LOG: &str = "amount_log";
pub const HOURS_SINCE_LAST_TX: &str = "hours_since_last_tx";
pub const TX_SEQUENCE_INDEX: &str = "tx_sequence_index";
pub const IS_RETURNING_ACCOUNT: &str = "is_returning_account";

/// Sentinel for `hours_since_last_tx` on an account's first transaction.
pub const NO_PREVIOUS_TX: f64 = -1.0;

/// A transaction together with the features derived from its account's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    /// Position of the record in the input batch
    pub input_index: usize,
    pub transaction: Transaction,
    /// One entry per configured window, in window-table order
    pub windows: Vec<WindowFeatures>,
    pub hours_since_last_tx: f64,
    pub tx_sequence_index: u32,
    pub is_returning_account: bool,
    pub amount_log: f64,
}

impl EnrichedTransaction {
    pub fn window(&self, width_hours: u32) -> Option<&WindowFeatures> {
        self.windows.iter().find(|w| w.width_hours == width_hours)
    }

    /// Numeric value of a named feature; `type` yields its category code.
    /// `None` if the name is unknown or the aggregate was not computed.
    pub fn feature(&self, name: &str) -> Option<f64> {
        match name {
            TYPE => Some(f64::from(self.transaction.tx_type.code())),
            AMOUNT => Some(self.transaction.amount),
            AMOUNT_LOG => Some(self.amount_log),
            HOURS_SINCE_LAST_TX => Some(self.hours_since_last_tx),
            TX_SEQUENCE_INDEX => Some(f64::from(self.tx_sequence_index)),
            IS_RETURNING_ACCOUNT => Some(if self.is_returning_account { 1.0 } else { 0.0 }),
            other => {
                let (aggregate, width) = Aggregate::parse_column(other)?;
                self.window(width)?.get(aggregate)
            }
        }
    }
}

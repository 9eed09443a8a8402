//! Transaction records: the typed input of the feature builder, the untyped
//! record it is validated from, and the fixed transaction-type vocabulary.

pub mod loader;

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use loader::{load_csv, load_labeled_csv, read_csv, read_labeled_csv};

/// Transaction category. The vocabulary is closed; unseen values fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    CashIn,
    CashOut,
    Debit,
    Payment,
    Transfer,
}

impl TxType {
    pub const ALL: [TxType; 5] = [
        TxType::CashIn,
        TxType::CashOut,
        TxType::Debit,
        TxType::Payment,
        TxType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::CashIn => "CASH_IN",
            TxType::CashOut => "CASH_OUT",
            TxType::Debit => "DEBIT",
            TxType::Payment => "PAYMENT",
            TxType::Transfer => "TRANSFER",
        }
    }

    /// Stable integer code used when the category is fed to a numeric model.
    pub fn code(&self) -> u8 {
        match self {
            TxType::CashIn => 0,
            TxType::CashOut => 1,
            TxType::Debit => 2,
            TxType::Payment => 3,
            TxType::Transfer => 4,
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        TxType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                let allowed: Vec<&str> = TxType::ALL.iter().map(|t| t.as_str()).collect();
                ValidationError::new(
                    "type",
                    s,
                    format!("unknown category, allowed: {}", allowed.join(", ")),
                )
            })
    }
}

/// A validated transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub account_id: String,
    /// Whole hours since the reference epoch (PaySim `step`)
    pub timestamp_hours: u32,
    pub amount: f64,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Ground truth; absent at serving time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fraud: Option<bool>,
}

impl Transaction {
    pub fn new(
        account_id: impl Into<String>,
        timestamp_hours: u32,
        amount: f64,
        tx_type: TxType,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            timestamp_hours,
            amount,
            tx_type,
            is_fraud: None,
        }
    }

    pub fn with_label(mut self, is_fraud: bool) -> Self {
        self.is_fraud = Some(is_fraud);
        self
    }

    /// Check the invariants the builder relies on. Fields are public, so the
    /// builder re-checks every record it is handed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.account_id.trim().is_empty() {
            return Err(ValidationError::new(
                "account_id",
                self.account_id.as_str(),
                "must be non-empty",
            ));
        }
        check_amount(self.amount, &self.amount.to_string())?;
        Ok(())
    }
}

/// A transaction as it arrives from a file or a request, before validation.
/// Every field is kept as text so that the original value can be reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "nameOrig", alias = "account_id", default)]
    pub account_id: Option<String>,
    #[serde(rename = "step", alias = "timestamp_hours", default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(rename = "type", default)]
    pub tx_type: Option<String>,
    #[serde(rename = "isFraud", alias = "is_fraud", default)]
    pub is_fraud: Option<String>,
}

impl RawTransaction {
    /// Build from a `{field: value}` record. Both the file column names
    /// (`nameOrig`, `step`, `isFraud`) and the model field names are accepted.
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| record.get(*k))
                .and_then(value_text)
        };
        Self {
            account_id: pick(&["account_id", "nameOrig"]),
            timestamp: pick(&["timestamp_hours", "step"]),
            amount: pick(&["amount"]),
            tx_type: pick(&["type"]),
            is_fraud: pick(&["is_fraud", "isFraud"]),
        }
    }

    pub fn validate(&self) -> Result<Transaction, ValidationError> {
        let account_id = match self.account_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            Some(id) => return Err(ValidationError::new("account_id", id, "must be non-empty")),
            None => return Err(ValidationError::new("account_id", "", "missing")),
        };
        let timestamp_hours = parse_timestamp(self.timestamp.as_deref())?;
        let amount = parse_amount(self.amount.as_deref())?;
        let tx_type = match self.tx_type.as_deref() {
            Some(t) => t.parse::<TxType>()?,
            None => return Err(ValidationError::new("type", "", "missing")),
        };
        let is_fraud = parse_label(self.is_fraud.as_deref())?;

        Ok(Transaction {
            account_id,
            timestamp_hours,
            amount,
            tx_type,
            is_fraud,
        })
    }
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Accepts integral text (`"12"`, `"12.0"`); rejects negatives, fractions,
/// non-finite values and anything above `u32::MAX`.
pub fn parse_timestamp(raw: Option<&str>) -> Result<u32, ValidationError> {
    let field = "timestamp_hours";
    let text = match raw.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Err(ValidationError::new(field, raw.unwrap_or(""), "missing")),
    };
    if let Ok(v) = text.parse::<i64>() {
        if v < 0 {
            return Err(ValidationError::new(field, text, "must be non-negative"));
        }
        return u32::try_from(v).map_err(|_| ValidationError::new(field, text, "out of range"));
    }
    let v: f64 = text
        .parse()
        .map_err(|_| ValidationError::new(field, text, "not a number"))?;
    if !v.is_finite() {
        return Err(ValidationError::new(field, text, "must be finite"));
    }
    if v.fract() != 0.0 {
        return Err(ValidationError::new(field, text, "must be a whole number of hours"));
    }
    if v < 0.0 {
        return Err(ValidationError::new(field, text, "must be non-negative"));
    }
    if v > u32::MAX as f64 {
        return Err(ValidationError::new(field, text, "out of range"));
    }
    Ok(v as u32)
}

pub fn parse_amount(raw: Option<&str>) -> Result<f64, ValidationError> {
    let text = match raw.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Err(ValidationError::new("amount", raw.unwrap_or(""), "missing")),
    };
    let v: f64 = text
        .parse()
        .map_err(|_| ValidationError::new("amount", text, "not a number"))?;
    check_amount(v, text)?;
    Ok(v)
}

fn check_amount(v: f64, text: &str) -> Result<(), ValidationError> {
    if !v.is_finite() {
        return Err(ValidationError::new("amount", text, "must be finite"));
    }
    if v < 0.0 {
        return Err(ValidationError::new("amount", text, "must be non-negative"));
    }
    Ok(())
}

fn parse_label(raw: Option<&str>) -> Result<Option<bool>, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some("0") | Some("false") => Ok(Some(false)),
        Some("1") | Some("true") => Ok(Some(true)),
        Some(other) => Err(ValidationError::new("is_fraud", other, "must be 0 or 1")),
    }
}

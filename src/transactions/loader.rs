//! Delimited-file source (PaySim layout: `step`, `nameOrig`, `amount`, `type`, `isFraud`).
//! Rows are returned unvalidated; validation policy belongs to the builder.

use super::RawTransaction;
use crate::error::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

const REQUIRED_COLUMNS: [&str; 4] = ["step", "nameOrig", "amount", "type"];
const LABELED_COLUMNS: [&str; 5] = ["step", "nameOrig", "amount", "type", "isFraud"];

pub fn load_csv(path: &Path) -> Result<Vec<RawTransaction>> {
    let records = read_csv(File::open(path)?)?;
    info!(path = %path.display(), rows = records.len(), "loaded transactions");
    Ok(records)
}

/// Training source: the `isFraud` column must be present as well.
pub fn load_labeled_csv(path: &Path) -> Result<Vec<RawTransaction>> {
    let records = read_labeled_csv(File::open(path)?)?;
    info!(path = %path.display(), rows = records.len(), "loaded labeled transactions");
    Ok(records)
}

/// Read every row; columns other than the five used are ignored.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<RawTransaction>> {
    read_with_columns(reader, &REQUIRED_COLUMNS)
}

pub fn read_labeled_csv<R: Read>(reader: R) -> Result<Vec<RawTransaction>> {
    read_with_columns(reader, &LABELED_COLUMNS)
}

fn read_with_columns<R: Read>(reader: R, required: &[&str]) -> Result<Vec<RawTransaction>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = required
        .iter()
        .filter(|c| !headers.iter().any(|h| h == **c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(crate::error::FeatureError::SchemaMismatch {
            missing,
            expected: required.iter().map(|c| c.to_string()).collect(),
            received: headers.iter().map(str::to_string).collect(),
        });
    }

    let mut out = Vec::new();
    for row in rdr.deserialize::<RawTransaction>() {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeatureError;
    use std::io::Write;

    const SAMPLE: &str = "\
step,type,amount,nameOrig,oldbalanceOrg,isFraud
1,PAYMENT,9839.64,C1231006815,170136.0,0
1,TRANSFER,181.0,C1305486145,181.0,1
2,CASH_OUT,,C840083671,181.0,1
";

    #[test]
    fn reads_paysim_columns_and_ignores_others() {
        let rows = read_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].account_id.as_deref(), Some("C1231006815"));
        assert_eq!(rows[0].timestamp.as_deref(), Some("1"));
        assert_eq!(rows[1].is_fraud.as_deref(), Some("1"));
        let tx = rows[1].validate().unwrap();
        assert_eq!(tx.is_fraud, Some(true));
    }

    #[test]
    fn empty_amount_surfaces_at_validation() {
        let rows = read_csv(SAMPLE.as_bytes()).unwrap();
        let err = rows[2].validate().unwrap_err();
        assert_eq!(err.field, "amount");
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let data = "step,amount,type\n1,2.0,PAYMENT\n";
        match read_csv(data.as_bytes()) {
            Err(FeatureError::SchemaMismatch { missing, .. }) => {
                assert_eq!(missing, vec!["nameOrig".to_string()])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn labeled_read_requires_label_column() {
        let data = "step,type,amount,nameOrig\n1,PAYMENT,5.0,A\n2,TRANSFER,9.0,A\n";
        assert_eq!(read_csv(data.as_bytes()).unwrap().len(), 2);
        match read_labeled_csv(data.as_bytes()) {
            Err(FeatureError::SchemaMismatch { missing, expected, .. }) => {
                assert_eq!(missing, vec!["isFraud".to_string()]);
                assert_eq!(expected.len(), 5);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let rows = load_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(load_labeled_csv(file.path()).unwrap(), rows);
    }
}

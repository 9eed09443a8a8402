//! The temporal feature builder.
//!
//! Rows are partitioned by account, each partition is sorted by
//! `(timestamp_hours, input_index)`, and a single forward scan per partition
//! drives one [`WindowAccumulator`] per configured width. Partitions share
//! nothing, so they are scanned independently (on the rayon pool when
//! enabled) and concatenated in account order.

use super::window::{Point, WindowAccumulator};
use super::{EnrichedTransaction, FeatureSchema, WindowFeatures, NO_PREVIOUS_TX};
use crate::config::{FeaturesConfig, InvalidRecordPolicy, OutputOrder, TieVisibility};
use crate::error::{FeatureError, Result, ValidationError};
use crate::transactions::{RawTransaction, Transaction};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Enriched rows plus the records excluded under [`InvalidRecordPolicy::RejectRecord`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOutput {
    pub rows: Vec<EnrichedTransaction>,
    /// Always empty under [`InvalidRecordPolicy::RejectBatch`]
    pub rejected: Vec<ValidationError>,
}

#[derive(Debug, Clone)]
pub struct TemporalFeatureBuilder {
    config: FeaturesConfig,
    schema: FeatureSchema,
}

impl TemporalFeatureBuilder {
    pub fn new(config: FeaturesConfig) -> Result<Self> {
        config.validate()?;
        let schema = FeatureSchema::from_windows(&config.windows);
        Ok(Self { config, schema })
    }

    pub fn config(&self) -> &FeaturesConfig {
        &self.config
    }

    /// Names of the model-input columns this builder produces.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Enrich already-typed transactions.
    pub fn build(&self, transactions: &[Transaction]) -> Result<BuildOutput> {
        self.run(
            transactions
                .iter()
                .map(|tx| tx.validate().map(|()| tx.clone())),
        )
    }

    /// Validate and enrich records as read from a file or request.
    pub fn build_raw(&self, records: &[RawTransaction]) -> Result<BuildOutput> {
        self.run(records.iter().map(RawTransaction::validate))
    }

    fn run<I>(&self, records: I) -> Result<BuildOutput>
    where
        I: Iterator<Item = std::result::Result<Transaction, ValidationError>>,
    {
        let mut partitions: BTreeMap<String, Vec<(usize, Transaction)>> = BTreeMap::new();
        let mut rejected = Vec::new();
        let mut accepted = 0usize;

        for (index, record) in records.enumerate() {
            match record {
                Ok(tx) => {
                    accepted += 1;
                    partitions
                        .entry(tx.account_id.clone())
                        .or_default()
                        .push((index, tx));
                }
                Err(e) => match self.config.invalid_records {
                    InvalidRecordPolicy::RejectBatch => return Err(e.at(index).into()),
                    InvalidRecordPolicy::RejectRecord => rejected.push(e.at(index)),
                },
            }
        }

        let accounts = partitions.len();
        let partitions: Vec<Vec<(usize, Transaction)>> = partitions.into_values().collect();
        let scanned: Vec<Vec<EnrichedTransaction>> = if self.config.parallel && accounts > 1 {
            partitions
                .into_par_iter()
                .map(|p| self.scan_account(p))
                .collect::<Result<_>>()?
        } else {
            partitions
                .into_iter()
                .map(|p| self.scan_account(p))
                .collect::<Result<_>>()?
        };

        let mut rows: Vec<EnrichedTransaction> = Vec::with_capacity(accepted);
        rows.extend(scanned.into_iter().flatten());
        if self.config.output_order == OutputOrder::Input {
            rows.sort_by_key(|r| r.input_index);
        }

        debug!(
            rows = rows.len(),
            accounts,
            rejected = rejected.len(),
            "temporal features built"
        );
        Ok(BuildOutput { rows, rejected })
    }

    /// Scan one account's rows. Output is in `(timestamp_hours, input_index)` order.
    fn scan_account(&self, mut rows: Vec<(usize, Transaction)>) -> Result<Vec<EnrichedTransaction>> {
        rows.sort_by_key(|(index, tx)| (tx.timestamp_hours, *index));

        let points: Vec<Point> = rows
            .iter()
            .map(|(_, tx)| Point {
                timestamp_hours: tx.timestamp_hours,
                amount: tx.amount,
            })
            .collect();
        let mut accumulators: Vec<WindowAccumulator> = self
            .config
            .windows
            .iter()
            .map(|w| WindowAccumulator::new(w.width_hours))
            .collect();

        let n = points.len();
        let account_id = rows.first().map(|(_, tx)| tx.account_id.clone()).unwrap_or_default();
        let mut out = Vec::with_capacity(n);
        let mut rows = rows.into_iter();
        let mut start = 0;

        while start < n {
            let now = points[start].timestamp_hours;
            let end = match self.config.ties {
                TieVisibility::Prefix => start + 1,
                TieVisibility::Group => {
                    let mut end = start + 1;
                    while end < n && points[end].timestamp_hours == now {
                        end += 1;
                    }
                    end
                }
            };

            let windows: Vec<WindowFeatures> = self
                .config
                .windows
                .iter()
                .zip(accumulators.iter_mut())
                .map(|(spec, acc)| {
                    acc.admit(&points, end - 1);
                    acc.evict(&points, now);
                    acc.snapshot(spec, &points)
                        .map_err(|_| overflow(&account_id, now, "window count"))
                })
                .collect::<Result<_>>()?;

            for position in start..end {
                let Some((input_index, transaction)) = rows.next() else {
                    break;
                };
                check_finite(&windows, &transaction)?;
                let hours_since_last_tx = if position == 0 {
                    NO_PREVIOUS_TX
                } else {
                    f64::from(points[position].timestamp_hours - points[position - 1].timestamp_hours)
                };
                let tx_sequence_index = to_u32(
                    position,
                    &transaction.account_id,
                    transaction.timestamp_hours,
                    "sequence index",
                )?;
                let amount_log = transaction.amount.ln_1p();
                out.push(EnrichedTransaction {
                    input_index,
                    windows: windows.clone(),
                    hours_since_last_tx,
                    tx_sequence_index,
                    is_returning_account: tx_sequence_index > 0,
                    amount_log,
                    transaction,
                });
            }
            start = end;
        }

        Ok(out)
    }
}

fn to_u32(value: usize, account_id: &str, timestamp_hours: u32, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| overflow(account_id, timestamp_hours, what))
}

fn overflow(account_id: &str, timestamp_hours: u32, what: &str) -> FeatureError {
    FeatureError::Computation {
        account_id: account_id.to_string(),
        timestamp_hours,
        reason: format!("{what} exceeds u32 range"),
    }
}

fn check_finite(windows: &[WindowFeatures], tx: &Transaction) -> Result<()> {
    for w in windows {
        let values = [w.sum, w.mean, w.max];
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(FeatureError::Computation {
                account_id: tx.account_id.clone(),
                timestamp_hours: tx.timestamp_hours,
                reason: format!("non-finite aggregate in {}h window", w.width_hours),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Aggregate, WindowSpec};
    use crate::transactions::TxType;

    fn tx(account: &str, hour: u32, amount: f64) -> Transaction {
        Transaction::new(account, hour, amount, TxType::Payment)
    }

    fn all_aggregates(widths: &[u32]) -> FeaturesConfig {
        FeaturesConfig {
            windows: widths
                .iter()
                .map(|&w| {
                    WindowSpec::new(
                        w,
                        [Aggregate::Count, Aggregate::Sum, Aggregate::Mean, Aggregate::Max],
                    )
                })
                .collect(),
            ..FeaturesConfig::default()
        }
    }

    fn builder(config: FeaturesConfig) -> TemporalFeatureBuilder {
        TemporalFeatureBuilder::new(config).unwrap()
    }

    fn by_input(mut rows: Vec<EnrichedTransaction>) -> Vec<EnrichedTransaction> {
        rows.sort_by_key(|r| r.input_index);
        rows
    }

    #[test]
    fn window_excludes_exact_lower_bound() {
        let input = vec![tx("A", 0, 10.0), tx("A", 1, 20.0), tx("A", 3, 5.0), tx("A", 7, 100.0)];
        let out = builder(all_aggregates(&[6])).build(&input).unwrap();
        let last = &out.rows[3];
        assert_eq!(last.transaction.timestamp_hours, 7);
        let w = last.window(6).unwrap();
        assert_eq!(w.count, Some(2));
        assert_eq!(w.sum, Some(105.0));
        assert_eq!(w.max, Some(100.0));
        assert_eq!(w.mean, Some(52.5));
        assert_eq!(last.feature("tx_count_6h"), Some(2.0));
        assert_eq!(last.hours_since_last_tx, 4.0);
    }

    #[test]
    fn single_transaction_account() {
        let out = builder(all_aggregates(&[2, 6])).build(&[tx("B", 5, 50.0)]).unwrap();
        assert_eq!(out.rows.len(), 1);
        let row = &out.rows[0];
        for w in &row.windows {
            assert_eq!(w.count, Some(1));
            assert_eq!(w.sum, Some(50.0));
            assert_eq!(w.mean, Some(50.0));
            assert_eq!(w.max, Some(50.0));
        }
        assert_eq!(row.hours_since_last_tx, -1.0);
        assert_eq!(row.tx_sequence_index, 0);
        assert!(!row.is_returning_account);
        assert_eq!(row.feature("is_returning_account"), Some(0.0));
    }

    #[test]
    fn ties_ordered_by_input_position() {
        let input = vec![tx("A", 4, 1.0), tx("A", 4, 2.0)];
        for _ in 0..5 {
            let rows = by_input(builder(all_aggregates(&[2])).build(&input).unwrap().rows);
            assert_eq!(rows[0].tx_sequence_index, 0);
            assert_eq!(rows[1].tx_sequence_index, 1);
            assert_eq!(rows[1].hours_since_last_tx, 0.0);
        }
    }

    #[test]
    fn prefix_ties_see_earlier_ties_only() {
        let input = vec![tx("A", 4, 1.0), tx("A", 4, 2.0)];
        let rows = by_input(builder(all_aggregates(&[2])).build(&input).unwrap().rows);
        assert_eq!(rows[0].window(2).unwrap().count, Some(1));
        assert_eq!(rows[1].window(2).unwrap().count, Some(2));
    }

    #[test]
    fn group_ties_see_whole_group() {
        let config = FeaturesConfig {
            ties: TieVisibility::Group,
            ..all_aggregates(&[2])
        };
        let input = vec![tx("A", 1, 9.0), tx("A", 4, 1.0), tx("A", 4, 2.0), tx("A", 5, 3.0)];
        let rows = by_input(builder(config).build(&input).unwrap().rows);
        for r in &rows[1..3] {
            let w = r.window(2).unwrap();
            assert_eq!(w.count, Some(2));
            assert_eq!(w.max, Some(2.0));
        }
        assert_eq!(rows[1].tx_sequence_index, 1);
        assert_eq!(rows[2].tx_sequence_index, 2);
        assert_eq!(rows[3].window(2).unwrap().sum, Some(6.0));
    }

    #[test]
    fn wide_window_covers_whole_history() {
        let input = vec![tx("A", 0, 1.0), tx("A", 10, 2.0), tx("A", 20, 3.0)];
        let out = builder(all_aggregates(&[1000])).build(&input).unwrap();
        let sums: Vec<f64> = out.rows.iter().map(|r| r.window(1000).unwrap().sum.unwrap()).collect();
        assert_eq!(sums, vec![1.0, 3.0, 6.0]);
    }

    #[test]
    fn zero_amounts_participate() {
        let input = vec![tx("A", 0, 0.0), tx("A", 1, 0.0)];
        let out = builder(all_aggregates(&[6])).build(&input).unwrap();
        let w = out.rows[1].window(6).unwrap();
        assert_eq!(w.count, Some(2));
        assert_eq!(w.sum, Some(0.0));
        assert_eq!(w.max, Some(0.0));
        assert_eq!(out.rows[1].amount_log, 0.0);
    }

    #[test]
    fn empty_batch_is_empty_output() {
        let out = builder(FeaturesConfig::default()).build(&[]).unwrap();
        assert!(out.rows.is_empty());
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn row_count_and_sequence_per_account() {
        let input = vec![
            tx("B", 3, 1.0),
            tx("A", 9, 1.0),
            tx("B", 1, 1.0),
            tx("A", 2, 1.0),
            tx("B", 3, 1.0),
            tx("C", 0, 1.0),
        ];
        let out = builder(FeaturesConfig::default()).build(&input).unwrap();
        assert_eq!(out.rows.len(), input.len());
        let ids: Vec<(&str, u32, usize)> = out
            .rows
            .iter()
            .map(|r| (r.transaction.account_id.as_str(), r.tx_sequence_index, r.input_index))
            .collect();
        assert_eq!(
            ids,
            vec![("A", 0, 3), ("A", 1, 1), ("B", 0, 2), ("B", 1, 0), ("B", 2, 4), ("C", 0, 5)]
        );
    }

    #[test]
    fn input_output_order() {
        let config = FeaturesConfig {
            output_order: OutputOrder::Input,
            ..FeaturesConfig::default()
        };
        let input = vec![tx("Z", 3, 1.0), tx("A", 9, 1.0), tx("Z", 1, 1.0)];
        let out = builder(config).build(&input).unwrap();
        let order: Vec<usize> = out.rows.iter().map(|r| r.input_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(out.rows[0].tx_sequence_index, 1);
    }

    #[test]
    fn amount_log_inverts() {
        let input: Vec<Transaction> = [0.0, 0.5, 181.0, 9839.64, 1e7]
            .iter()
            .enumerate()
            .map(|(i, &a)| tx("A", i as u32, a))
            .collect();
        for r in builder(FeaturesConfig::default()).build(&input).unwrap().rows {
            let back = r.amount_log.exp_m1();
            assert!((back - r.transaction.amount).abs() <= 1e-9 * r.transaction.amount.max(1.0));
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let input: Vec<Transaction> = (0..400u32)
            .map(|i| tx(&format!("C{}", i % 17), (i * 7) % 50, f64::from(i % 13)))
            .collect();
        let sequential = FeaturesConfig {
            parallel: false,
            ..all_aggregates(&[2, 6, 24])
        };
        let parallel = FeaturesConfig {
            parallel: true,
            ..all_aggregates(&[2, 6, 24])
        };
        assert_eq!(
            builder(sequential).build(&input).unwrap(),
            builder(parallel).build(&input).unwrap()
        );
    }

    #[test]
    fn reject_batch_names_record_and_field() {
        let records = vec![
            RawTransaction {
                account_id: Some("A".into()),
                timestamp: Some("1".into()),
                amount: Some("3".into()),
                tx_type: Some("PAYMENT".into()),
                is_fraud: None,
            },
            RawTransaction {
                account_id: Some("A".into()),
                timestamp: Some("-2".into()),
                amount: Some("3".into()),
                tx_type: Some("PAYMENT".into()),
                is_fraud: None,
            },
        ];
        match builder(FeaturesConfig::default()).build_raw(&records) {
            Err(FeatureError::Validation(e)) => {
                assert_eq!(e.record, Some(1));
                assert_eq!(e.field, "timestamp_hours");
                assert_eq!(e.value, "-2");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reject_record_returns_errors_alongside_rows() {
        let config = FeaturesConfig {
            invalid_records: InvalidRecordPolicy::RejectRecord,
            ..FeaturesConfig::default()
        };
        let good = RawTransaction {
            account_id: Some("A".into()),
            timestamp: Some("1".into()),
            amount: Some("3".into()),
            tx_type: Some("PAYMENT".into()),
            is_fraud: Some("0".into()),
        };
        let bad = RawTransaction {
            account_id: Some("".into()),
            ..good.clone()
        };
        let out = builder(config).build_raw(&[bad, good.clone(), good]).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].record, Some(0));
        assert_eq!(out.rejected[0].field, "account_id");
        assert_eq!(out.rows[0].input_index, 1);
        assert_eq!(out.rows[1].tx_sequence_index, 1);
    }

    #[test]
    fn typed_input_is_revalidated() {
        let err = builder(FeaturesConfig::default())
            .build(&[tx("A", 0, 1.0), tx("", 1, 1.0)])
            .unwrap_err();
        assert!(matches!(err, FeatureError::Validation(ref e) if e.record == Some(1)));
    }

    #[test]
    fn overflowing_sum_is_computation_error() {
        let input = vec![tx("A", 0, f64::MAX), tx("A", 1, f64::MAX)];
        let err = builder(all_aggregates(&[6])).build(&input).unwrap_err();
        assert!(matches!(err, FeatureError::Computation { ref account_id, .. } if account_id == "A"));
    }

    #[test]
    fn counts_beyond_u32_are_computation_errors() {
        assert_eq!(to_u32(7, "A", 3, "window count").unwrap(), 7);
        let too_many = u32::MAX as usize + 1;
        match to_u32(too_many, "A", 3, "window count") {
            Err(FeatureError::Computation {
                account_id,
                timestamp_hours,
                reason,
            }) => {
                assert_eq!(account_id, "A");
                assert_eq!(timestamp_hours, 3);
                assert_eq!(reason, "window count exceeds u32 range");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn only_requested_aggregates_present() {
        let out = builder(FeaturesConfig::default()).build(&[tx("A", 0, 4.0)]).unwrap();
        let row = &out.rows[0];
        assert_eq!(row.feature("tx_avg_amount_2h"), Some(4.0));
        assert_eq!(row.feature("tx_sum_amount_2h"), None);
        assert_eq!(row.feature("tx_sum_amount_6h"), Some(4.0));
        assert_eq!(row.feature("tx_max_amount_6h"), None);
    }
}

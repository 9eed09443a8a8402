//! Stratified train / validation / test split and class-balance weighting.
//!
//! Two successive stratified cuts: `test_size` of each class is held out, then
//! `val_share` of the held-out part becomes validation and the rest test. With
//! the defaults that is 70 / 15 / 15.

use crate::config::SplitConfig;
use crate::error::{FeatureError, Result, ValidationError};
use crate::features::EnrichedTransaction;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

/// Row indices of each part, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassBalance {
    pub positives: usize,
    pub negatives: usize,
    /// `negatives / max(1, positives)`, the usual weight for the positive class
    pub scale_pos_weight: f64,
}

/// Ground-truth labels of `rows`. Every row must carry one; an unlabeled row
/// fails with a validation error naming its input position.
pub fn labels(rows: &[EnrichedTransaction]) -> Result<Vec<bool>> {
    rows.iter()
        .map(|r| {
            r.transaction.is_fraud.ok_or_else(|| {
                FeatureError::from(
                    ValidationError::new("is_fraud", "", "label required for training").at(r.input_index),
                )
            })
        })
        .collect()
}

pub fn stratified_split(labels: &[bool], config: &SplitConfig) -> Result<SplitIndices> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut out = SplitIndices::default();

    for class in [false, true] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);

        let n = members.len();
        let held = ((n as f64) * config.test_size).round() as usize;
        let val = ((held as f64) * config.val_share).round() as usize;
        let (held_out, train) = members.split_at(held.min(n));
        let (val_part, test_part) = held_out.split_at(val.min(held_out.len()));

        out.train.extend_from_slice(train);
        out.val.extend_from_slice(val_part);
        out.test.extend_from_slice(test_part);
    }

    out.train.sort_unstable();
    out.val.sort_unstable();
    out.test.sort_unstable();
    Ok(out)
}

pub fn class_balance(labels: &[bool]) -> ClassBalance {
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    ClassBalance {
        positives,
        negatives,
        scale_pos_weight: negatives as f64 / positives.max(1) as f64,
    }
}

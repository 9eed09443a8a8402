//! Fraud features batch job: load transactions, derive per-account temporal
//! features, write stratified train/validation/test datasets plus the feature
//! manifest, and optionally score the test split with a trained model.

use chrono::Utc;
use fraud_features::{
    config::AppConfig,
    export::{self, FeatureManifest, FEATURES_FILE},
    features::TemporalFeatureBuilder,
    logging::{RunSummary, SplitCounts, StructuredLogger},
    serving::ModelContext,
    split, transactions,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("FRAUD_FEATURES_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = AppConfig::load(&config_path)?;

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(config = %config_path.display(), data = %config.data_path.display(), "fraud features starting");

    let records = transactions::load_labeled_csv(&config.data_path)?;
    let builder = TemporalFeatureBuilder::new(config.features.clone())?;
    let built = builder.build_raw(&records)?;
    for rejected in &built.rejected {
        warn!(
            record = ?rejected.record,
            field = %rejected.field,
            value = %rejected.value,
            reason = %rejected.reason,
            "record rejected"
        );
    }
    let rows = built.rows;
    let accounts: BTreeSet<&str> = rows
        .iter()
        .map(|r| r.transaction.account_id.as_str())
        .collect();
    info!(rows = rows.len(), accounts = accounts.len(), rejected = built.rejected.len(), "features built");

    let labels = split::labels(&rows)?;
    let parts = split::stratified_split(&labels, &config.split)?;
    let train_labels: Vec<bool> = parts.train.iter().map(|&i| labels[i]).collect();
    let balance = split::class_balance(&train_labels);
    info!(
        positives = balance.positives,
        negatives = balance.negatives,
        scale_pos_weight = balance.scale_pos_weight,
        "training class balance"
    );

    std::fs::create_dir_all(&config.output_dir)?;
    for (name, indices) in [("train", &parts.train), ("val", &parts.val), ("test", &parts.test)] {
        let path = config.output_dir.join(format!("{name}.csv"));
        export::write_split_csv(&path, builder.schema(), &rows, indices)?;
    }
    FeatureManifest::new(builder.config()).save(&config.output_dir.join(FEATURES_FILE))?;

    let mut model_version = None;
    let mut test_predicted_fraud = None;
    if let Some(dir) = &config.model.artifact_dir {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        let ctx = ModelContext::load(dir, threads)?;
        let test_rows: Vec<_> = parts.test.iter().map(|&i| rows[i].clone()).collect();
        if !test_rows.is_empty() {
            let resp = ctx.predict_enriched(&test_rows, config.model.return_proba)?;
            let flagged = resp.predictions.iter().filter(|&&p| p == 1).count();
            info!(rows = test_rows.len(), flagged, inference_ms = resp.inference_ms, "test split scored");
            test_predicted_fraud = Some(flagged);
        }
        model_version = Some(ctx.version().to_string());
    }

    let summary = RunSummary {
        ts: Utc::now().to_rfc3339(),
        event: "run_complete",
        input_rows: records.len(),
        enriched_rows: rows.len(),
        rejected: built.rejected.len(),
        accounts: accounts.len(),
        fraud_rows: labels.iter().filter(|&&l| l).count(),
        split: SplitCounts {
            train: parts.train.len(),
            val: parts.val.len(),
            test: parts.test.len(),
        },
        scale_pos_weight: balance.scale_pos_weight,
        features: builder.schema().names(),
        model_version: model_version.as_deref(),
        test_predicted_fraud,
    };
    StructuredLogger::emit_json(&summary, &mut std::io::stdout())?;

    info!(output = %config.output_dir.display(), "fraud features complete");
    Ok(())
}

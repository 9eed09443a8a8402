//! Serving benchmark: request records → feature matrix → classifier → response.
//! Uses a constant classifier so that only the boundary overhead is measured.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fraud_features::config::FeaturesConfig;
use fraud_features::features::FeatureMatrix;
use fraud_features::model::{Classifier, ModelArtifact};
use fraud_features::serving::{ModelContext, PredictRequest};
use serde_json::json;

struct Constant;

impl Classifier for Constant {
    fn predict_proba(&self, features: &FeatureMatrix) -> fraud_features::Result<Vec<f32>> {
        Ok(vec![0.25; features.nrows()])
    }

    fn name(&self) -> &str {
        "constant"
    }
}

fn context() -> ModelContext {
    let artifact = ModelArtifact::new("bench", "model.onnx", FeaturesConfig::default());
    ModelContext::from_parts(artifact, Box::new(Constant)).unwrap()
}

fn bench_precomputed_records(c: &mut Criterion) {
    let ctx = context();
    let mut g = c.benchmark_group("predict_records");
    for n in [1, 64, 1024] {
        let records = (0..n)
            .map(|i| {
                let mut rec = serde_json::Map::new();
                for name in ctx.schema().names() {
                    rec.insert(name.clone(), json!(i as f64));
                }
                rec.insert("type".into(), json!("TRANSFER"));
                rec
            })
            .collect();
        let req = PredictRequest {
            records,
            recompute: false,
        };
        g.bench_function(format!("batch_{}", n).as_str(), |b| {
            b.iter(|| ctx.predict(black_box(&req), true).unwrap())
        });
    }
    g.finish();
}

fn bench_recompute(c: &mut Criterion) {
    let ctx = context();
    let records = (0..256)
        .map(|i| {
            json!({"nameOrig": format!("C{}", i % 16), "step": i / 16, "amount": 12.5, "type": "PAYMENT"})
                .as_object()
                .cloned()
                .unwrap()
        })
        .collect();
    let req = PredictRequest {
        records,
        recompute: true,
    };
    c.bench_function("predict_recompute_256", |b| {
        b.iter(|| ctx.predict(black_box(&req), false).unwrap())
    });
}

criterion_group!(benches, bench_precomputed_records, bench_recompute);
criterion_main!(benches);

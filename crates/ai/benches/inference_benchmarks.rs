use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::collections::BTreeMap;
use std::sync::Arc;

use siteops_ai::{
    InferenceDispatcher, InputData, Model, ModelCategory, ModelParameters, ModelRegistry, ModelStatus,
    PredictionRequest,
};
use siteops_observability::InMemoryTelemetrySink;

fn dispatcher_with(model: Model) -> InferenceDispatcher {
    let registry = ModelRegistry::arc();
    registry.register(model.with_status(ModelStatus::Ready)).unwrap();
    InferenceDispatcher::with_builtin_strategies(registry, Arc::new(InMemoryTelemetrySink::new()))
}

fn input(width: usize) -> InputData {
    (0..width).map(|i| (format!("f{i}"), i as f64 * 1.5)).collect()
}

fn bench_predict_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_latency");

    let regression = dispatcher_with(
        Model::new("cost-optimizer", "Cost", ModelCategory::Optimization, ModelParameters::regression())
            .with_accuracy(0.87),
    );
    let request = PredictionRequest::new("cost-optimizer", input(8));
    group.bench_function("regression", |b| {
        b.iter(|| regression.predict(black_box(&request)).unwrap())
    });

    let explained = request.clone().explained();
    group.bench_function("regression_explained", |b| {
        b.iter(|| regression.predict(black_box(&explained)).unwrap())
    });

    let classification = dispatcher_with(
        Model::new(
            "safety-risk",
            "Safety",
            ModelCategory::Detection,
            ModelParameters::Classification {
                classes: vec!["low".into(), "medium".into(), "high".into()],
                weights: (0..8).map(|i| (format!("f{i}"), vec![0.1, 0.2, 0.3])).collect::<BTreeMap<_, _>>(),
                bias: vec![0.0; 3],
            },
        )
        .with_accuracy(0.9),
    );
    let request = PredictionRequest::new("safety-risk", input(8));
    group.bench_function("classification", |b| {
        b.iter(|| classification.predict(black_box(&request)).unwrap())
    });

    group.finish();
}

fn bench_explain_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("explain_by_feature_count");
    let dispatcher = dispatcher_with(
        Model::new("cost-optimizer", "Cost", ModelCategory::Optimization, ModelParameters::regression())
            .with_accuracy(0.87),
    );

    for width in [4usize, 32, 256] {
        group.throughput(Throughput::Elements(width as u64));
        let request = PredictionRequest::new("cost-optimizer", input(width)).explained();
        group.bench_with_input(BenchmarkId::from_parameter(width), &request, |b, request| {
            b.iter(|| dispatcher.predict(black_box(request)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_predict_latency, bench_explain_width);
criterion_main!(benches);

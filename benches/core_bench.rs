//! Benchmarks for stackform core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use stackform::core::expander;
use stackform::core::expr::Expr;
use stackform::core::parser::TemplateContext;
use stackform::core::scope::Scope;
use stackform::core::types::{Value, ValueKind, ValueMap};
use stackform::journal::codec::CacheRecord;
use stackform::journal::hasher;

fn group_value(rows: usize) -> Value {
    let maps = (0..rows)
        .map(|i| {
            let mut m = ValueMap::new();
            m.insert("id".into(), Value::Int(i as i64));
            m.insert("name".into(), Value::Str(format!("vol-{i}")));
            m.insert("osds".into(), Value::IntList(vec![1, 2, 3]));
            m
        })
        .collect();
    Value::Group(maps)
}

fn bench_expr_eval(c: &mut Criterion) {
    let mut scope = Scope::new();
    scope.set("hosts", group_value(64));
    scope.set("names", Value::StrList((0..64).map(|i| format!("n{i}")).collect()));

    let cases = [
        ("ref", ValueKind::StringList, json!({"Ref": "names"})),
        (
            "select",
            ValueKind::String,
            json!({"Select": [10, {"Ref": "names"}]}),
        ),
        (
            "template_attr",
            ValueKind::IntegerList,
            json!({"TemplateAttr": {"Ref": "hosts", "Attr": "id"}}),
        ),
        (
            "list_of_calls",
            ValueKind::StringList,
            json!(["a", {"Select": [1, {"Ref": "names"}]}, "c"]),
        ),
    ];

    let mut group = c.benchmark_group("expr_eval");
    for (name, kind, raw) in cases {
        let expr = Expr::decode(kind, &raw).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &expr, |b, expr| {
            b.iter(|| black_box(expr.get_value(black_box(&scope)).unwrap()));
        });
    }
    group.finish();
}

fn bench_expand(c: &mut Criterion) {
    let scope = Scope::new();
    let mut group = c.benchmark_group("expand");
    for len in [4, 16, 32] {
        let items: Vec<i64> = (0..len).collect();
        let contexts: Vec<TemplateContext> = ["a", "b"]
            .iter()
            .map(|name| TemplateContext {
                name: name.to_string(),
                kind: ValueKind::IntegerList,
                range: true,
                value: Expr::decode(ValueKind::IntegerList, &json!(items)).unwrap(),
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(len), &contexts, |b, contexts| {
            b.iter(|| black_box(expander::bindings("g", contexts, &scope).unwrap()));
        });
    }
    group.finish();
}

fn bench_journal_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_codec");
    for rows in [1, 16, 256] {
        let value = group_value(rows);
        let line = serde_json::to_string(&CacheRecord::new("g", "Template", &value, false).unwrap())
            .unwrap();
        group.bench_with_input(BenchmarkId::new("encode", rows), &value, |b, value| {
            b.iter(|| {
                let rec = CacheRecord::new("g", "Template", black_box(value), false).unwrap();
                black_box(serde_json::to_string(&rec).unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("decode", rows), &line, |b, line| {
            b.iter(|| {
                let rec: CacheRecord = serde_json::from_str(black_box(line)).unwrap();
                black_box(rec.decode().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_journal_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_name");
    for size in [64, 1024] {
        let description = "x".repeat(size);
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &description,
            |b, description| {
                b.iter(|| {
                    black_box(hasher::journal_name(
                        black_box(description),
                        "http://10.0.0.1:8056/v1",
                    ))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_expr_eval,
    bench_expand,
    bench_journal_codec,
    bench_journal_name
);
criterion_main!(benches);

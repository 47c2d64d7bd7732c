//! Policy engine benchmarks
//!
//! Expression evaluation (cached vs uncached) and both decision engines over
//! growing policy sets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::sync::Arc;
use warrant_expr::{BasicKeyResolver, ConstKeyHandler, ExprContext, ExprEngine, Key};
use warrant_policy::{
    expression_engine, BasicPolicyEngine, Claims, DocumentCompiler, EngineConfig, Environment,
    ListPolicySource, PolicyContext, PolicyEngine, RoleGraphPolicyEngine,
};

fn exprs() -> Arc<ExprEngine> {
    let ident = BasicKeyResolver::new()
        .key(Key::new("ident", "organization"), ConstKeyHandler::new(json!("em2m")))
        .key(Key::new("ident", "orgPath"), ConstKeyHandler::new(json!(["root", "auto", "em2m"])));
    Arc::new(expression_engine(&EngineConfig::default(), vec![Arc::new(ident)]))
}

/// `count` policies spread over ten roles, each role inheriting the next
fn create_documents(count: usize) -> (Value, Value) {
    let policies: Vec<Value> = (0..count)
        .map(|i| {
            let effect = if i % 7 == 0 { "Deny" } else { "Allow" };
            json!({
                "id": format!("policy-{}", i),
                "statements": [
                    {
                        "effect": effect,
                        "actions": [format!("svc{}:*", i % 20), format!("svc{}:Read", i)],
                        "resource": "${ident:organization}:svc:*",
                        "condition": { "StringEquals": { "claims:org": "root" } }
                    }
                ]
            })
        })
        .collect();

    let roles: Vec<Value> = (0..10)
        .map(|r| {
            let inherits: Vec<String> =
                if r < 9 { vec![format!("role-{}", r + 1)] } else { vec![] };
            let policies: Vec<String> = (0..count)
                .filter(|i| i % 10 == r)
                .map(|i| format!("policy-{}", i))
                .collect();
            json!({
                "id": format!("role-{}", r),
                "policies": policies,
                "inherits": inherits,
                "priority": r
            })
        })
        .collect();

    (Value::Array(policies), Value::Array(roles))
}

fn source(exprs: &Arc<ExprEngine>, count: usize) -> Arc<ListPolicySource> {
    let (policies, roles) = create_documents(count);
    let compiler = DocumentCompiler::new(exprs.clone());
    Arc::new(ListPolicySource::from_json(&compiler, policies, roles).unwrap())
}

fn context() -> PolicyContext {
    let mut claims = Claims::new().with_sub("1234").with_roles(["role-0"]);
    claims.org = Some("root".to_string());
    PolicyContext::new(claims, Environment::new()).with_resource("em2m:svc:item:42")
}

fn bench_expression_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression_eval");
    let ctx = ExprContext::new().with("user", json!({ "name": "  ada lovelace  " }));
    let text =
        "${ident:organization}:${path:user.name | trim | capitalize}:${ident:orgPath | join:/}";

    let cached = exprs();
    group.bench_function("cached", |b| {
        b.iter(|| black_box(cached.eval(black_box(text), &ctx).unwrap()));
    });

    let uncached = exprs();
    group.bench_function("parse_each_time", |b| {
        b.iter(|| black_box(uncached.parse(black_box(text)).unwrap().call(&ctx).unwrap()));
    });

    group.finish();
}

fn bench_basic_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("basic_check_action");

    for count in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("policies", count), count, |b, &count| {
            let exprs = exprs();
            let engine =
                BasicPolicyEngine::new(source(&exprs, count), exprs, EngineConfig::default())
                    .unwrap();
            let ctx = context();
            b.iter(|| black_box(engine.check_action(black_box("svc0:Write"), &ctx).unwrap()));
        });
    }

    group.finish();
}

fn bench_graph_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_find_allowed_actions");

    for count in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("policies", count), count, |b, &count| {
            let exprs = exprs();
            let engine =
                RoleGraphPolicyEngine::new(source(&exprs, count), exprs, EngineConfig::default())
                    .unwrap();
            let ctx = context();
            b.iter(|| black_box(engine.find_allowed_actions(&ctx).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_expression_eval, bench_basic_engine, bench_graph_engine);
criterion_main!(benches);

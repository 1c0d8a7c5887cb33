//! Workflow Benchmarks
//!
//! Measures the orchestrator hot paths:
//! - Condition parsing and evaluation
//! - Binding resolution against the execution context
//! - End-to-end workflow execution

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use agentry_core::tool::{Tool, ToolResult};
use agentry_core::workflow::{Condition, ExecutionContext, Step, ToolOrchestrator, WorkflowDefinition};
use agentry_core::Result;

struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        Ok(ToolResult::success(input))
    }
}

fn context() -> ExecutionContext {
    ExecutionContext::from_input(json!({
        "user": {"name": "ada", "age": 36, "roles": ["admin", "dev"]},
        "count": 12,
        "items": [1, 2, 3, 4, 5],
    }))
}

fn bench_conditions(c: &mut Criterion) {
    let mut group = c.benchmark_group("conditions");
    let sources = [
        ("comparison", "count > 10"),
        ("membership", "'admin' in user.roles"),
        ("compound", "(count >= 10 and user.age < 40) or not ${user.name} == 'bob'"),
    ];

    for (label, source) in sources {
        group.bench_with_input(BenchmarkId::new("parse", label), source, |b, src| {
            b.iter(|| Condition::parse(black_box(src)).unwrap())
        });

        let condition = Condition::parse(source).unwrap();
        let ctx = context();
        group.bench_with_input(BenchmarkId::new("evaluate", label), &condition, |b, cond| {
            b.iter(|| cond.evaluate(black_box(&ctx)).unwrap())
        });
    }

    group.finish();
}

fn bench_bindings(c: &mut Criterion) {
    let mut group = c.benchmark_group("bindings");
    let ctx = context();

    group.bench_function("exact_reference", |b| {
        let binding = json!("${user.roles}");
        b.iter(|| ctx.resolve(black_box(&binding)))
    });

    group.bench_function("interpolated_object", |b| {
        let binding = json!({
            "greeting": "hello ${user.name}, you have ${count} items",
            "first": "${items.0}",
            "nested": {"age": "${user.age}"}
        });
        b.iter(|| ctx.resolve(black_box(&binding)))
    });

    group.finish();
}

fn bench_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("workflow_execution");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for steps in [1usize, 5, 20] {
        let mut orchestrator = ToolOrchestrator::new();
        orchestrator.register_tool("echo", Arc::new(Echo), "Echo").unwrap();

        let mut workflow = WorkflowDefinition::new("chain");
        for i in 0..steps {
            let step = Step::new(format!("step-{}", i), "echo")
                .input("value", format!("${{value}}+{}", i))
                .output("value", "value")
                .condition("value != null");
            workflow = workflow.step(step);
        }
        workflow = workflow.step(Step::new("finish", "echo").input("v", "${value}").output("result", "v"));
        orchestrator.register_workflow("chain", workflow);

        group.bench_with_input(BenchmarkId::new("steps", steps), &steps, |b, _| {
            b.iter(|| {
                rt.block_on(orchestrator.execute_workflow("chain", json!({"value": "seed"})))
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_conditions, bench_bindings, bench_execution);
criterion_main!(benches);

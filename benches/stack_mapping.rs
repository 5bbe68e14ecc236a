/// Stack mapping and line hook benchmarks
///
/// Measures the per-line cost the hooks add to an instrumented test:
/// mapping a runtime stack to logical frames, and a full begin/end line pair.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use runhook::clock::ManualClock;
use runhook::config::HookConfig;
use runhook::hook_dispatcher::HookDispatcher;
use runhook::result_sink::ResultSink;
use runhook::source_model::{CaptureStyle, Code, CodeLine, LogicalMethod, SourceModel};
use runhook::stack_lines::{map_stack, NativeFrame, NoRewrite, RootNameRelabel, StackSource};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Model with `depth` methods, each calling the next
fn chain_model(depth: usize) -> SourceModel {
    let mut model = SourceModel::new();
    for i in 0..depth {
        let body = (0..20)
            .map(|line| {
                let code = if line == 10 && i + 1 < depth {
                    Code::SubMethodInvoke {
                        method_key: format!("bench.C{}.m()", i + 1),
                    }
                } else {
                    Code::Plain {
                        original: String::new(),
                    }
                };
                CodeLine::at(line + 1, code)
            })
            .collect();
        let method = LogicalMethod::new(
            format!("bench.C{}", i),
            "m",
            "",
            CaptureStyle::StepIn,
            body,
        );
        if i == 0 {
            model.add_root_method(method);
        } else {
            model.add_method(method);
        }
    }
    model
}

/// Runtime stack for the chain, innermost first, with untracked frames mixed in
fn chain_stack(depth: usize) -> Vec<NativeFrame> {
    let mut frames = Vec::with_capacity(depth * 2);
    for i in (0..depth).rev() {
        frames.push(NativeFrame::new(format!("bench.C{}", i), "m", 11));
        frames.push(NativeFrame::new("runtime.Reflect", "invoke", 99));
    }
    frames
}

struct FixedStack(Vec<NativeFrame>);

impl StackSource for FixedStack {
    fn current_stack(&self) -> Vec<NativeFrame> {
        self.0.clone()
    }
}

struct NullSink;

impl ResultSink for NullSink {
    fn write(&mut self, _: &serde_json::Value, _: &Path) -> runhook::Result<()> {
        Ok(())
    }
}

/// Benchmark: mapping stacks of increasing depth
fn bench_map_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_stack");
    group.measurement_time(Duration::from_secs(5));

    for depth in [1, 4, 16, 64].iter() {
        let model = chain_model(*depth);
        let frames = chain_stack(*depth);
        group.throughput(Throughput::Elements(frames.len() as u64));
        group.bench_with_input(BenchmarkId::new("no_rewrite", depth), depth, |b, _| {
            b.iter(|| black_box(map_stack(&model, black_box(&frames), &NoRewrite)));
        });

        let relabel = RootNameRelabel {
            actual_name: "m$impl".to_string(),
            logical_name: "m".to_string(),
        };
        group.bench_with_input(BenchmarkId::new("root_relabel", depth), depth, |b, _| {
            b.iter(|| black_box(map_stack(&model, black_box(&frames), &relabel)));
        });
    }

    group.finish();
}

/// Benchmark: begin_line + end_line on a plain line deep in a step-in chain
fn bench_line_hooks(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_hooks");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    group.bench_function("plain_line_pair", |b| {
        let mut frames = chain_stack(8);
        frames[0].line = 12;
        let mut dispatcher = HookDispatcher::new(
            Arc::new(chain_model(8)),
            FixedStack(frames),
            &HookConfig::default(),
        )
        .with_sink(NullSink)
        .with_clock(ManualClock::new(0));
        dispatcher.begin_root("bench.C0", "m", "m").unwrap();

        b.iter(|| {
            dispatcher.begin_line("bench.C7", "m", "m", "", 12, 12).unwrap();
            dispatcher.end_line("bench.C7", "m", "m", "", 12, 12).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_map_stack, bench_line_hooks);
criterion_main!(benches);

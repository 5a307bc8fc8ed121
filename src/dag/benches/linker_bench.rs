use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hgraph_core::{Event, EventBuilder, EventDescriptor, EventWindow, NodeId};
use hgraph_dag::EventLinker;

// ============================================================================
// Helpers
// ============================================================================

fn chain(creators: u64, per_creator: usize) -> Vec<Event> {
    let start = Utc::now();
    let mut latest: Vec<Option<EventDescriptor>> = vec![None; creators as usize];
    let mut events = Vec::new();

    for i in 0..per_creator {
        for c in 0..creators {
            let mut builder = EventBuilder::new(NodeId(c), (i / 10) as u64 + 1)
                .time_created(start + Duration::milliseconds(i as i64))
                .transaction(vec![0u8; 64]);
            if let Some(sp) = latest[c as usize] {
                builder = builder.self_parent(sp);
            }
            if let Some(op) = latest[((c + 1) % creators) as usize] {
                builder = builder.other_parent(op);
            }
            let event = builder.build();
            latest[c as usize] = Some(event.descriptor());
            events.push(event);
        }
    }

    events
}

// ============================================================================
// Linking Benchmarks
// ============================================================================

fn bench_link_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("link_next");

    for creators in [4u64, 16, 64].iter() {
        let events = chain(*creators, 50);
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(creators), &events, |b, events| {
            b.iter(|| {
                let linker = EventLinker::new();
                for event in events {
                    black_box(linker.link_next(event.clone()));
                }
            });
        });
    }

    group.finish();
}

fn bench_window_advance(c: &mut Criterion) {
    let events = chain(16, 100);

    c.bench_function("prune_half", |b| {
        b.iter(|| {
            let linker = EventLinker::new();
            for event in &events {
                linker.link_next(event.clone());
            }
            black_box(linker.set_event_window(EventWindow::from_latest_round(10, 5)))
        });
    });
}

criterion_group!(benches, bench_link_next, bench_window_advance);
criterion_main!(benches);

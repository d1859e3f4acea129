use criterion::{black_box, criterion_group, criterion_main, Criterion};
use positioning_core::config::TrackerConfig;
use positioning_core::minimize::NelderMeadConfig;
use positioning_core::rooms::Room;
use positioning_core::solver::MultilaterationSolver;
use positioning_core::{AnchorId, DeviceId, Observation, Position, Tracker};

fn ring_anchors(n: usize) -> Vec<Position> {
    (0..n)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / n as f64;
            Position::new(8.0 * angle.cos(), 8.0 * angle.sin(), if i % 2 == 0 { 0.3 } else { 2.4 })
        })
        .collect()
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");
    let truth = Position::new(1.5, -2.0, 1.1);
    let solver = MultilaterationSolver::default();

    for n in [3, 4, 6, 10] {
        let anchors = ring_anchors(n);
        let distances: Vec<f64> = anchors.iter().map(|a| (a - truth).norm()).collect();
        group.bench_function(format!("{n}_anchors_cold"), |b| {
            b.iter(|| black_box(solver.solve(&anchors, &distances, None)));
        });
        group.bench_function(format!("{n}_anchors_seeded"), |b| {
            b.iter(|| black_box(solver.solve(&anchors, &distances, Some(&truth))));
        });
    }

    group.finish();
}

fn bench_tracker(c: &mut Criterion) {
    let anchors = ring_anchors(6);
    let truth = Position::new(1.0, 1.0, 1.0);
    let devices: Vec<(DeviceId, String)> = (0..50)
        .map(|i| (DeviceId::new(format!("dev{i}")), format!("Device {i}")))
        .collect();
    let batch: Vec<Observation> = (0..50)
        .flat_map(|d| {
            anchors.iter().enumerate().map(move |(a, p)| {
                Observation::new(format!("dev{d}"), format!("a{a}"), (p - truth).norm(), a as f64 * 0.1)
            })
        })
        .collect();

    c.bench_function("tracker_batch_50_devices", |b| {
        b.iter(|| {
            let mut tracker = Tracker::new(
                TrackerConfig::default(),
                NelderMeadConfig::default(),
                devices.clone(),
                anchors
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (AnchorId::new(format!("a{i}")), *p)),
                vec![Room::new("all", vec![(-10.0, -10.0), (10.0, -10.0), (10.0, 10.0), (-10.0, 10.0)])],
            );
            black_box(tracker.observe_batch(&batch));
        });
    });
}

criterion_group!(benches, bench_solver, bench_tracker);
criterion_main!(benches);

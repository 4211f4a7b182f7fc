use criterion::{black_box, criterion_group, criterion_main, Criterion};
use guidance_core::tracking::{TrackManager, TrackerConfig};
use sensor_hal::types::{PointCloud, RadarPoint};

fn make_scan(n: usize, t: f64, spread: f32) -> PointCloud {
    let points = (0..n)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / n as f32;
            RadarPoint {
                x: spread * angle.cos(),
                y: 10.0 * angle.sin(),
                z: 100.0 + spread * angle.sin(),
                velocity: -5.0,
                snr: 30.0,
                track_id: 0,
            }
        })
        .collect();
    PointCloud {
        timestamp: t,
        points,
    }
}

fn bench_process_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker");

    for n in [10, 50, 100] {
        group.bench_function(format!("{n}_targets"), |b| {
            b.iter(|| {
                let mut tracker = TrackManager::new(TrackerConfig::default());
                // Establish tracks, then measure a steady-state scan.
                tracker.process_scan(&make_scan(n, 0.0, 200.0));
                tracker.process_scan(&make_scan(n, 1.0 / 60.0, 200.0));
                black_box(tracker.get_tracks());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process_scan);
criterion_main!(benches);

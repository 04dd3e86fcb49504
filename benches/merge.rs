//! Benchmarks for merge and record mapping

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use uuid::Uuid;

use walksync::sync::{MergeResolver, RecordMapper};
use walksync::types::*;

fn daily_logs(n: usize, offset: u32) -> Vec<DailyLog> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().date_naive();
    (0..n)
        .map(|i| DailyLog {
            steps: 1000 + offset + i as u32,
            goal_met: i % 3 == 0,
            tracked_walk_ids: (0..3).map(|w| Uuid::from_u128((i * 3 + w) as u128)).collect(),
            ..DailyLog::new(day_key(start + Duration::days(i as i64)))
        })
        .collect()
}

fn bench_merge_daily_logs(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_daily_logs");

    for size in [100, 1000] {
        let local = daily_logs(size, 0);
        let remote = daily_logs(size, 500);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                local
                    .iter()
                    .zip(remote.iter())
                    .filter(|(l, r)| MergeResolver::merge_daily_log(Some(*l), r).changed)
                    .count()
            })
        });
    }

    group.finish();
}

fn bench_merge_game_state(c: &mut Criterion) {
    let mut local = GameState::default();
    local.profile.has_completed_onboarding = true;
    local.profile.display_name = "Robin".to_string();
    local.streak.longest_streak = 12;
    local.shields.available_shields = 2;

    let mut remote = local.clone();
    remote.streak.longest_streak = 30;
    remote.shields.available_shields = 0;
    remote.profile.badges = (0..50)
        .map(|i| Badge {
            id: format!("badge_{}", i),
            earned_at: Utc::now(),
        })
        .collect();

    c.bench_function("merge_game_state", |b| {
        b.iter(|| MergeResolver::merge_game_state(black_box(&local), black_box(&remote)))
    });
}

fn bench_record_mapping(c: &mut Criterion) {
    let logs = daily_logs(1000, 0);
    let (records, _) = RecordMapper::to_remote_all(&logs);

    let mut group = c.benchmark_group("record_mapping");
    group.throughput(Throughput::Elements(logs.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| RecordMapper::to_remote_all(black_box(&logs)))
    });
    group.bench_function("decode", |b| {
        b.iter(|| RecordMapper::from_remote_all::<DailyLog>(black_box(&records)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_merge_daily_logs,
    bench_merge_game_state,
    bench_record_mapping
);
criterion_main!(benches);

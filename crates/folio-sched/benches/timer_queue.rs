use criterion::{Criterion, black_box, criterion_group, criterion_main};
use folio_sched::{RetryPolicy, RetryRun, RetryTimer, TimerQueue};

fn bench_schedule_expire(c: &mut Criterion) {
    c.bench_function("schedule_expire_1k", |b| {
        b.iter(|| {
            let mut q: TimerQueue<u64, u64> = TimerQueue::new();
            for i in 0..1000u64 {
                q.schedule(i % 16, (i * 7919) % 10_000, i);
            }
            black_box(q.expire(5_000).len());
            black_box(q.expire(10_000).len())
        })
    });
}

fn bench_cancel_by_token(c: &mut Criterion) {
    c.bench_function("cancel_token_1k", |b| {
        b.iter(|| {
            let mut q: TimerQueue<u64, ()> = TimerQueue::new();
            for i in 0..1000u64 {
                q.schedule(i % 16, i, ());
            }
            for t in 0..16u64 {
                black_box(q.cancel(&t));
            }
        })
    });
}

fn bench_retry_run(c: &mut Criterion) {
    let policy = RetryPolicy::new(3, 500, 1000);
    c.bench_function("retry_run_exhaust", |b| {
        b.iter(|| {
            let mut q: TimerQueue<u64, RetryTimer> = TimerQueue::new();
            let (mut run, _) = RetryRun::start(policy, 1, |t| t, &mut q, 0);
            let mut now = 0;
            while !run.is_finished() {
                now += 500;
                for f in q.expire(now) {
                    black_box(run.on_timer(f.payload, &mut q, now));
                }
            }
        })
    });
}

criterion_group!(
    benches,
    bench_schedule_expire,
    bench_cancel_by_token,
    bench_retry_run
);
criterion_main!(benches);

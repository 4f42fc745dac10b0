//! Bounded worker pool for driving per-repository sync jobs.
//!
//! Admission model: all jobs are preloaded into a FIFO channel and a fixed
//! number of named worker threads pull from it, so at most `workers` handlers
//! run at once and waiting jobs are admitted in arrival order as slots free
//! up. The pool holds no job-specific state; it mediates admission only.

use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Run `handler` over `jobs` with at most `workers` concurrent invocations.
///
/// `observe` is called on the calling thread once per completed job, in
/// completion order, before the job's result is appended to the returned Vec.
/// Every job produces exactly one result; a handler that needs to represent
/// failure does so in its return type.
pub fn run<T, R, F, O>(jobs: Vec<T>, workers: usize, handler: F, mut observe: O) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
    O: FnMut(&R),
{
    let workers = workers.max(1);
    let total = jobs.len();

    let (job_tx, job_rx): (Sender<T>, Receiver<T>) = unbounded();
    let (result_tx, result_rx): (Sender<R>, Receiver<R>) = unbounded();

    for job in jobs {
        // Receiver is alive below, send cannot fail
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let handler = &handler;
    let mut results = Vec::with_capacity(total);

    thread::scope(|scope| {
        for i in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            thread::Builder::new()
                .name(format!("ghsync-worker-{}", i))
                .spawn_scoped(scope, move || {
                    while let Ok(job) = job_rx.recv() {
                        let result = handler(job);
                        if result_tx.send(result).is_err() {
                            log::warn!("result channel closed, worker exiting");
                            break;
                        }
                    }
                })
                .expect("failed to spawn worker thread");
        }
        drop(result_tx);

        for result in result_rx.iter() {
            observe(&result);
            results.push(result);
        }
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn every_job_yields_exactly_one_result() {
        let jobs: Vec<u32> = (0..50).collect();
        let results = run(jobs, 4, |n| n * 2, |_| {});
        assert_eq!(results.len(), 50);
        let mut sorted = results.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_job_list_returns_empty() {
        let results = run(Vec::<u32>::new(), 4, |n| n, |_| {});
        assert!(results.is_empty());
    }

    #[test]
    fn zero_workers_is_clamped_to_one() {
        let results = run(vec![1, 2, 3], 0, |n| n, |_| {});
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let active = AtomicUsize::new(0);
        let high_water = AtomicUsize::new(0);
        let limit = 3;

        let jobs: Vec<u32> = (0..24).collect();
        let results = run(
            jobs,
            limit,
            |n| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
                n
            },
            |_| {},
        );

        assert_eq!(results.len(), 24);
        let peak = high_water.load(Ordering::SeqCst);
        assert!(peak <= limit, "high-water-mark {} exceeded limit {}", peak, limit);
        assert!(peak >= 2, "expected some overlap, saw peak {}", peak);
    }

    #[test]
    fn jobs_are_admitted_in_arrival_order() {
        // Single worker: start order must equal submission order.
        let started = Mutex::new(Vec::new());
        let jobs: Vec<u32> = (0..10).collect();
        run(
            jobs,
            1,
            |n| {
                started.lock().unwrap().push(n);
                n
            },
            |_| {},
        );
        assert_eq!(*started.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn observe_sees_results_as_they_complete() {
        let seen = AtomicUsize::new(0);
        let results = run(
            (0..8).collect::<Vec<u32>>(),
            2,
            |n| n,
            |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(seen.load(Ordering::SeqCst), results.len());
    }

    #[test]
    fn one_slow_job_does_not_serialize_the_batch() {
        // 5 jobs, 2 workers, one job much slower: the fast jobs should all
        // finish while the slow one is still running on its own slot.
        let jobs: Vec<u64> = vec![200, 5, 5, 5, 5];
        let start = std::time::Instant::now();
        let results = run(
            jobs,
            2,
            |ms| {
                std::thread::sleep(Duration::from_millis(ms));
                ms
            },
            |_| {},
        );
        let elapsed = start.elapsed();
        assert_eq!(results.len(), 5);
        assert!(
            elapsed < Duration::from_millis(400),
            "batch took {:?}, expected bounded by the slow job, not the serial sum",
            elapsed
        );
    }
}

//! Bounded worker pool over a pre-enumerated work list.
//!
//! A fixed number of workers share one claim cursor. Each worker repeatedly
//! claims the next unclaimed index with an atomic fetch-and-increment,
//! processes that item, and stops once the cursor runs past the end:
//!
//! ```text
//! items:   [0] [1] [2] [3] [4] [5] [6]
//!                       ^ cursor
//! worker 0 → 0, 3, 5
//! worker 1 → 1, 4
//! worker 2 → 2, 6
//! ```
//!
//! Every index is handed out exactly once, no item is processed twice, and
//! at most `concurrency` items are in flight at any moment. Workers run on a
//! dedicated rayon pool sized to the worker count, so the global rayon pool
//! is left alone.
//!
//! The worker closure returns a value rather than an error: per-item
//! failures are data, and a failing item never stops the other workers.
//! The returned vector is in completion order grouped by worker, not in
//! work-list order.

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("failed to start worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Shared cursor handing out each index in `0..len` exactly once.
#[derive(Debug)]
pub struct ClaimCursor {
    next: AtomicUsize,
    len: usize,
}

impl ClaimCursor {
    pub fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
        }
    }

    /// Claim the next index, or `None` once the list is exhausted.
    pub fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.len).then_some(index)
    }
}

/// Number of workers actually started: `concurrency` clamped to
/// `[1, items]`. Zero items still reports one worker.
pub fn effective_workers(concurrency: usize, items: usize) -> usize {
    concurrency.max(1).min(items.max(1))
}

/// Run `worker` over every item with at most `concurrency` in flight.
///
/// Returns once every item has been processed. The only error is failing
/// to start the threads.
pub fn run<T, R, F>(items: &[T], concurrency: usize, worker: F) -> Result<Vec<R>, PoolError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let workers = effective_workers(concurrency, items.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("webprep-worker-{i}"))
        .build()?;

    let cursor = ClaimCursor::new(items.len());
    let batches: Vec<Vec<R>> = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .map(|id| drain(id, items, &cursor, &worker))
            .collect()
    });
    Ok(batches.into_iter().flatten().collect())
}

fn drain<T, R, F>(id: usize, items: &[T], cursor: &ClaimCursor, worker: &F) -> Vec<R>
where
    F: Fn(&T) -> R,
{
    let mut results = Vec::new();
    while let Some(index) = cursor.claim() {
        log::trace!("worker {id} claimed item {index}");
        results.push(worker(&items[index]));
    }
    log::trace!("worker {id} finished after {} items", results.len());
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn every_item_processed_exactly_once() {
        let items: Vec<usize> = (0..500).collect();
        let claims: Vec<AtomicUsize> = (0..items.len()).map(|_| AtomicUsize::new(0)).collect();

        let results = run(&items, 8, |&i| {
            claims[i].fetch_add(1, Ordering::SeqCst);
            i * 2
        })
        .unwrap();

        assert_eq!(results.len(), items.len());
        assert!(claims.iter().all(|c| c.load(Ordering::SeqCst) == 1));
        let mut sorted = results;
        sorted.sort();
        assert_eq!(sorted, (0..500).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn failures_do_not_stop_other_items() {
        let items: Vec<u32> = (0..40).collect();
        let results = run(&items, 4, |&i| {
            if i % 3 == 0 {
                Err(format!("item {i} failed"))
            } else {
                Ok(i)
            }
        })
        .unwrap();

        assert_eq!(results.len(), 40);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 14);
    }

    #[test]
    fn in_flight_never_exceeds_concurrency() {
        let items: Vec<u32> = (0..24).collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        run(&items, 3, |_| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn concurrency_larger_than_items() {
        let items = vec!["a", "b"];
        let seen = Mutex::new(Vec::new());
        run(&items, 64, |s| seen.lock().unwrap().push(s.to_string())).unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn empty_work_list() {
        let items: Vec<u8> = Vec::new();
        let results = run(&items, 8, |_| 1).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn effective_workers_clamps() {
        assert_eq!(effective_workers(8, 3), 3);
        assert_eq!(effective_workers(8, 100), 8);
        assert_eq!(effective_workers(0, 5), 1);
        assert_eq!(effective_workers(4, 0), 1);
    }

    #[test]
    fn cursor_hands_out_each_index_once_across_threads() {
        let cursor = ClaimCursor::new(1000);
        let claimed = Mutex::new(Vec::new());
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let mut local = Vec::new();
                    while let Some(i) = cursor.claim() {
                        local.push(i);
                    }
                    claimed.lock().unwrap().extend(local);
                });
            }
        });
        let mut claimed = claimed.into_inner().unwrap();
        claimed.sort();
        assert_eq!(claimed, (0..1000).collect::<Vec<_>>());
        assert_eq!(cursor.claim(), None);
    }
}

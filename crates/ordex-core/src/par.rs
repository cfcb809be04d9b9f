// SPDX-License-Identifier: Apache-2.0

//! Scoped worker-pool helpers shared by the executors.
//!
//! All data-parallel phases run on `std::thread::scope` so borrows of
//! round-local state flow into workers without `Arc` plumbing. Worker panics
//! are re-raised on the driving thread.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs `f(worker_id)` on `workers` scoped threads and collects the results
/// in worker-id order.
///
/// With a single worker the closure runs inline on the caller.
pub(crate) fn map_workers<R, F>(workers: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Sync,
{
    if workers <= 1 {
        return vec![f(0)];
    }
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let f = &f;
                s.spawn(move || f(w))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(out) => out,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}

/// Runs `f(worker_id, index)` over `0..len`, workers claiming `chunk`-sized
/// index ranges from a shared cursor.
pub(crate) fn for_each_index<F>(len: usize, workers: usize, chunk: usize, f: F)
where
    F: Fn(usize, usize) + Sync,
{
    let cursor = AtomicUsize::new(0);
    map_workers(workers, |w| loop {
        let start = cursor.fetch_add(chunk, Ordering::Relaxed);
        if start >= len {
            break;
        }
        let end = (start + chunk).min(len);
        for i in start..end {
            f(w, i);
        }
    });
}

// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bounded async queue: a pausable FIFO with a concurrency limit,
//! driving the [`ExternalTarget`](crate::target::external::ExternalTarget).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

struct PendingTask {
    runner_id: Option<String>,
    run: Box<dyn FnOnce() -> BoxedTask + Send>,
}

struct QueueState {
    paused: bool,
    active: usize,
    pending: VecDeque<PendingTask>,
}

/// A single-threaded-cooperative pausable FIFO queue with a concurrency
/// limit `L`; no external locking is required of callers.
///
/// Grounded in the pause/resume state-machine pattern of
/// `time::PausableSleep` (generalized here from timer admission to task
/// admission) and in the bounded-concurrency dependencies already
/// carried in `Cargo.toml`.
///
/// Cheap to clone: `state` is `Arc`-backed, so every clone shares the same
/// underlying queue (used by [`crate::target::external::ExternalTarget`]
/// to hand a queue handle to a detached background connection task).
#[derive(Clone)]
pub struct AsyncQueue {
    limit: usize,
    state: Arc<AsyncMutex<QueueState>>,
}

impl AsyncQueue {
    /// `0`/negative limits clamp to `1`.
    pub fn new(limit: i64) -> Self {
        Self {
            limit: limit.max(1) as usize,
            state: Arc::new(AsyncMutex::new(QueueState {
                paused: true,
                active: 0,
                pending: VecDeque::new(),
            })),
        }
    }

    /// Clears pause and drains up to `L - active` tasks.
    pub async fn start(&self) {
        {
            let mut state = self.state.lock().await;
            state.paused = false;
        }
        self.drain().await;
    }

    /// Sets pause; running tasks are unaffected.
    pub async fn stop(&self) {
        self.state.lock().await.paused = true;
    }

    /// Appends a task and, if not paused, attempts a drain. Resolves with
    /// the task's own outcome once it actually runs to completion.
    pub async fn enqueue<F, T>(&self, runner_id: Option<String>, task: F) -> Result<T, QueueClosed>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let run: Box<dyn FnOnce() -> BoxedTask + Send> = Box::new(move || {
            Box::pin(async move {
                let result = task.await;
                let _ = tx.send(result);
            }) as BoxedTask
        });

        {
            let mut state = self.state.lock().await;
            state.pending.push_back(PendingTask { runner_id, run });
        }
        self.drain().await;

        rx.await.map_err(|_| QueueClosed)
    }

    /// Rejects every pending task's completion (by dropping it, which
    /// resolves their `enqueue` callers with [`QueueClosed`]) and empties
    /// the queue. Returns the prior length. Running tasks continue.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let count = state.pending.len();
        state.pending.clear();
        count
    }

    /// Filters pending tasks tagged with `runner_id` out of the queue.
    /// Does *not* reject their completions -- they are orphaned by
    /// design, and it is the caller's responsibility to own that
    /// semantic.
    pub async fn remove_by_runner(&self, runner_id: &str) -> usize {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state
            .pending
            .retain(|task| task.runner_id.as_deref() != Some(runner_id));
        before - state.pending.len()
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// The concurrency limit `L` this queue was constructed with.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drain loop invariant: after any task completes, `active`
    /// decrements and drain is re-invoked exactly once.
    fn drain(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            loop {
                let next = {
                    let mut state = self.state.lock().await;
                    if state.paused || state.active >= self.limit {
                        return;
                    }
                    let Some(task) = state.pending.pop_front() else {
                        return;
                    };
                    state.active += 1;
                    task
                };

                let fut = (next.run)();
                let queue = self.clone();
                tokio::spawn(async move {
                    fut.await;
                    {
                        let mut state = queue.state.lock().await;
                        state.active -= 1;
                    }
                    queue.drain().await;
                });
                // Loop again immediately: more slots may still be free.
            }
        })
    }
}

/// Returned by [`AsyncQueue::enqueue`] when the queue dropped the task's
/// sender without running it (e.g. the process is shutting down).
#[derive(Debug, thiserror::Error)]
#[error("queue closed before this task's result was delivered")]
pub struct QueueClosed;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn enqueued_tasks_do_not_run_until_started() {
        let queue = Arc::new(AsyncQueue::new(2));
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let handle = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move {
                queue
                    .enqueue(None, async move {
                        ran_clone.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0, "paused queue must not run tasks");
        handle.abort();
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_limit() {
        let queue = Arc::new(AsyncQueue::new(2));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        queue.start().await;

        let mut handles = vec![];
        for _ in 0..6 {
            let queue = Arc::clone(&queue);
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(None, async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn remove_by_runner_drops_only_tagged_tasks() {
        let queue = Arc::new(AsyncQueue::new(1));
        // Leave the queue paused so nothing drains while we inspect it.
        let mut handles = vec![];
        for runner in ["runner-a", "runner-a", "runner-b"] {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let _ = queue.enqueue(Some(runner.to_string()), async { () }).await;
            }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.pending_count().await, 3);

        let removed = queue.remove_by_runner("runner-a").await;
        assert_eq!(removed, 2);
        assert_eq!(queue.pending_count().await, 1);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn zero_limit_clamps_to_one() {
        let queue = AsyncQueue::new(0);
        assert_eq!(queue.limit, 1);
    }
}

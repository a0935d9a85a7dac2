//! Bounded worker pool (SPEC_FULL.md §5 expansion): a `tokio::sync::Semaphore`
//! of size `W` combined with a `tokio::task::JoinSet`, the idiomatic
//! rendering of spec.md §9's "worker pool of threads" note.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(worker_count: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(worker_count.max(1) as usize)),
            tasks: JoinSet::new(),
        }
    }

    /// Submit a unit of work. Blocks (yielding to the runtime, not the
    /// thread) until a worker slot is free, then spawns it and returns
    /// immediately — submissions never block the tick (spec.md §5).
    pub async fn submit<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore is never closed");
        self.tasks.spawn(async move {
            let _permit = permit;
            fut.await;
        });
    }

    /// Reap any workers that have already finished, without blocking on
    /// the ones still running.
    pub fn reap_finished(&mut self) {
        while self.tasks.try_join_next().is_some() {}
    }

    /// Wait for every outstanding worker to finish (used at shutdown and
    /// in tests).
    pub async fn join_all(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}

//! Batch dispatcher
//!
//! Splits a resource list into at most `fanout` chunks and runs one pipeline
//! invocation per chunk. Resources within a chunk are processed in order;
//! chunks run concurrently.

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error};

use super::pipeline::{NotificationPipeline, Outcome};
use crate::resource::ResourceRow;
use crate::types::Result;

/// How the caller waits on a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Return once every chunk has been attempted
    Await,
    /// Spawn the chunks on the deferred worker pool and return immediately
    Detach,
}

/// Chunk size for `n` resources: `ceil(n / fanout)`
pub fn chunk_size(n: usize, fanout: usize) -> usize {
    n.div_ceil(fanout.max(1))
}

/// Split rows into at most `fanout` chunks of [`chunk_size`] rows
pub fn split_chunks(rows: Vec<ResourceRow>, fanout: usize) -> Vec<Vec<ResourceRow>> {
    let size = chunk_size(rows.len(), fanout);
    if size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        chunks.push(rows.by_ref().take(size).collect());
    }
    chunks
}

/// Decrements the in-flight counter when a detached chunk ends and wakes
/// idle waiters once it reaches zero
struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct BatchDispatcher {
    pipeline: Arc<NotificationPipeline>,
    fanout: usize,
    /// Bounds concurrently running detached chunks
    workers: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl BatchDispatcher {
    pub fn new(pipeline: Arc<NotificationPipeline>, fanout: usize, deferred_workers: usize) -> Self {
        Self {
            pipeline,
            fanout: fanout.max(1),
            workers: Arc::new(Semaphore::new(deferred_workers.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Dispatch rows in the given mode. Detached dispatches always return an
    /// empty outcome list.
    pub async fn dispatch(&self, rows: Vec<ResourceRow>, mode: DispatchMode) -> Result<Vec<Outcome>> {
        let chunks = split_chunks(rows, self.fanout);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        debug!(chunks = chunks.len(), mode = ?mode, "Dispatching");

        match mode {
            DispatchMode::Await => {
                let results = join_all(
                    chunks
                        .into_iter()
                        .map(|chunk| self.pipeline.process_chunk(chunk)),
                )
                .await;

                let mut outcomes = Vec::new();
                let mut first_error = None;
                for result in results {
                    match result {
                        Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }

                match first_error {
                    Some(e) => Err(e),
                    None => Ok(outcomes),
                }
            }
            DispatchMode::Detach => {
                for chunk in chunks {
                    self.spawn_detached(chunk);
                }
                Ok(Vec::new())
            }
        }
    }

    fn spawn_detached(&self, chunk: Vec<ResourceRow>) {
        let pipeline = Arc::clone(&self.pipeline);
        let workers = Arc::clone(&self.workers);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight {
            count: Arc::clone(&self.in_flight),
            idle: Arc::clone(&self.idle),
        };

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = workers.acquire_owned().await else {
                error!("Deferred worker pool closed");
                return;
            };
            if let Err(e) = pipeline.process_chunk(chunk).await {
                error!(error = %e, "Deferred chunk failed to record an outcome");
            }
        });
    }

    /// Number of detached chunks not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every detached chunk has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // register before checking so a completion in between is not lost
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<ResourceRow> {
        (0..n)
            .map(|i| ResourceRow {
                id: format!("r{}", i),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(0, 5), 0);
        assert_eq!(chunk_size(4, 5), 1);
        assert_eq!(chunk_size(7, 5), 2);
        assert_eq!(chunk_size(10, 5), 2);
        assert_eq!(chunk_size(11, 5), 3);
    }

    #[test]
    fn test_split_never_exceeds_fanout() {
        for n in 0..40 {
            let chunks = split_chunks(rows(n), 5);
            assert!(chunks.len() <= 5);
            assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), n);
        }

        let chunks = split_chunks(rows(7), 5);
        let sizes: Vec<_> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 2, 1]);
        assert_eq!(chunks[0][1].id, "r1");
    }
}

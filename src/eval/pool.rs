//! Bounded fan-out shared by the generation and judging stages.
//!
//! Every job becomes a spawned task that waits for a semaphore permit before
//! running, so at most `width` jobs touch the network at once. Tasks report
//! back over a channel; the caller's collector is the only code that sees
//! the events, so stage working copies need no locking.

use crate::error::{Result, SkillEvalError};
use crate::llm::{GatewayRequest, ModelGateway};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

/// Lifecycle notification for one job.
#[derive(Debug)]
pub(crate) enum TaskEvent<K, T> {
    /// The job acquired its permit and is running.
    Started(K),
    Finished(K, T),
}

/// Run every job with at most `width` in flight, feeding events to `on_event`
/// in the order they happen. Returns once every job has finished or died.
pub(crate) async fn run_bounded<K, T, Fut>(
    jobs: Vec<(K, Fut)>,
    width: usize,
    mut on_event: impl FnMut(TaskEvent<K, T>),
) where
    K: Clone + Send + 'static,
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(width.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut join_set = JoinSet::new();

    for (key, job) in jobs {
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let _ = tx.send(TaskEvent::Started(key.clone()));
            let output = job.await;
            let _ = tx.send(TaskEvent::Finished(key, output));
        });
    }
    drop(tx);

    // Closes once every task has finished or unwound.
    while let Some(event) = rx.recv().await {
        on_event(event);
    }

    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "fan-out task did not complete");
        }
    }
}

/// One gateway call bounded by `timeout`.
pub(crate) async fn call_with_timeout(
    gateway: &dyn ModelGateway,
    request: GatewayRequest,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, gateway.call(request)).await {
        Ok(result) => result,
        Err(_) => Err(SkillEvalError::Timeout(timeout)),
    }
}

/// Milliseconds since `start`, saturating.
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_width_bounds_in_flight_jobs() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..12)
            .map(|i| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                let job = async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i * 2
                };
                (i, job)
            })
            .collect();

        let mut finished = Vec::new();
        let mut started = 0;
        run_bounded(jobs, 3, |event| match event {
            TaskEvent::Started(_) => started += 1,
            TaskEvent::Finished(key, value) => finished.push((key, value)),
        })
        .await;

        assert_eq!(started, 12);
        assert_eq!(finished.len(), 12);
        assert!(finished.iter().all(|(k, v)| *v == k * 2));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    async fn boom() -> usize {
        panic!("job blew up")
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stall_collector() {
        let jobs: Vec<(usize, std::pin::Pin<Box<dyn Future<Output = usize> + Send>>)> = vec![
            (0, Box::pin(async { 1usize })),
            (1, Box::pin(boom())),
            (2, Box::pin(async { 3usize })),
        ];

        let mut finished = Vec::new();
        run_bounded(jobs, 2, |event| {
            if let TaskEvent::Finished(key, _) = event {
                finished.push(key);
            }
        })
        .await;

        finished.sort_unstable();
        assert_eq!(finished, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let jobs: Vec<(usize, std::future::Ready<()>)> = Vec::new();
        let mut events = 0;
        run_bounded(jobs, 4, |_| events += 1).await;
        assert_eq!(events, 0);
    }
}

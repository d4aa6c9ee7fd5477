//! Bounded-parallelism task runner with cooperative cancellation.
//!
//! Tasks start in submission order, at most `limit` at a time, each one as soon
//! as a slot frees. The cancellation token is checked before every start: once
//! it is set, the task about to start and everything after it are reported as
//! [`TaskOutcome::NotStarted`]. Tasks already running are never interrupted, so
//! an object already in transit is either fully written or reported failed.

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use std::future::Future;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of one submitted task.
#[derive(Debug)]
pub enum TaskOutcome<T, E> {
    Completed(T),
    Failed(E),
    /// Cancellation was observed before the task could start
    NotStarted,
}

impl<T, E> TaskOutcome<T, E> {
    pub fn is_not_started(&self) -> bool {
        matches!(self, TaskOutcome::NotStarted)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyPool {
    limit: usize,
}

impl ConcurrencyPool {
    /// Pool running at most `limit` tasks at once; a zero limit is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `tasks` and return one outcome per task, in submission order.
    ///
    /// Each task is a closure producing the future to run; it is only invoked
    /// when the task is actually started. A panicking task is reported as
    /// failed via `E: From<JoinError>`.
    pub async fn run<I, F, Fut, T, E>(
        &self,
        tasks: I,
        cancel: &CancellationToken,
    ) -> Vec<TaskOutcome<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<JoinError> + Send + 'static,
    {
        let mut tasks = tasks.into_iter().enumerate();
        let mut outcomes: Vec<TaskOutcome<T, E>> = Vec::new();
        let mut in_flight = FuturesUnordered::new();
        let mut stopped = false;

        loop {
            while !stopped && in_flight.len() < self.limit {
                let Some((idx, task)) = tasks.next() else {
                    break;
                };
                outcomes.push(TaskOutcome::NotStarted);

                if cancel.is_cancelled() {
                    debug!("Cancellation observed, not starting task {} or later", idx);
                    stopped = true;
                    break;
                }

                let handle = tokio::spawn(task());
                in_flight.push(async move { (idx, handle.await) });
            }

            let Some((idx, joined)) = in_flight.next().await else {
                break;
            };

            outcomes[idx] = match joined {
                Ok(Ok(value)) => TaskOutcome::Completed(value),
                Ok(Err(e)) => TaskOutcome::Failed(e),
                Err(join_error) => TaskOutcome::Failed(E::from(join_error)),
            };
        }

        outcomes.extend(tasks.map(|_| TaskOutcome::NotStarted));
        outcomes
    }
}

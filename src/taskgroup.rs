use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::warn;

/// A task that did not produce a value.
#[derive(Debug)]
pub struct TaskFailure {
    pub index: usize,
    pub label: String,
    pub reason: String,
    pub timed_out: bool,
}

/// Results of a fan-out. Values are tagged with their input index and listed
/// in completion order.
#[derive(Debug)]
pub struct GroupOutcome<T> {
    pub completed: Vec<(usize, T)>,
    pub failures: Vec<TaskFailure>,
}

impl<T> GroupOutcome<T> {
    /// Completed values in input order.
    pub fn into_ordered(mut self) -> Vec<T> {
        self.completed.sort_by_key(|(i, _)| *i);
        self.completed.into_iter().map(|(_, v)| v).collect()
    }

    /// Completed values in completion order.
    pub fn into_values(self) -> Vec<T> {
        self.completed.into_iter().map(|(_, v)| v).collect()
    }
}

/// Bounded fan-out over slow I/O: at most `concurrency` tasks in flight, each
/// optionally capped by `timeout`. Waits for every task to finish or fail.
#[derive(Debug, Clone)]
pub struct TaskGroup {
    name: &'static str,
    concurrency: usize,
    timeout: Option<Duration>,
}

impl TaskGroup {
    pub fn new(name: &'static str, concurrency: usize) -> Self {
        Self {
            name,
            concurrency: concurrency.max(1),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        label: impl Fn(&I) -> String,
        task: F,
    ) -> GroupOutcome<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let timeout = self.timeout;
        let results: Vec<(usize, String, Result<T, (String, bool)>)> =
            stream::iter(items.into_iter().enumerate().map(|(index, item)| {
                let label = label(&item);
                let fut = task(item);
                async move {
                    let result = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, fut).await {
                            Ok(r) => r.map_err(|e| (format!("{:#}", e), false)),
                            Err(_) => Err((format!("timed out after {:?}", limit), true)),
                        },
                        None => fut.await.map_err(|e| (format!("{:#}", e), false)),
                    };
                    (index, label, result)
                }
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = GroupOutcome {
            completed: Vec::with_capacity(results.len()),
            failures: Vec::new(),
        };
        for (index, label, result) in results {
            match result {
                Ok(value) => outcome.completed.push((index, value)),
                Err((reason, timed_out)) => {
                    let failure = TaskFailure {
                        index,
                        label,
                        reason,
                        timed_out,
                    };
                    warn!(
                        group = self.name,
                        index = failure.index,
                        task = %failure.label,
                        timed_out = failure.timed_out,
                        "task failed: {}",
                        failure.reason
                    );
                    outcome.failures.push(failure);
                }
            }
        }
        outcome
    }
}

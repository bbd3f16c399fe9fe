use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// A unit of dispatch work: a labeled, already-bound future.
pub(crate) struct Job {
    pub label: String,
    pub fut: Pin<Box<dyn Future<Output = ()> + Send>>,
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    capacity: usize,
    job_timeout: Duration,
    semaphore: Arc<Semaphore>,
    wake: Notify,
    idle: Notify,
    in_flight: AtomicUsize,
}

/// Bounded dispatch pool: a FIFO queue with drop-oldest backpressure
/// feeding a semaphore-bounded set of worker tasks.
///
/// Submitting never blocks the caller. When the queue is full the
/// oldest pending job is dropped and logged. Each job runs under a
/// per-handler timeout. On shutdown, in-flight jobs get a grace period
/// to complete before being force-cancelled.
pub(crate) struct DispatchPool {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    grace: Duration,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchPool {
    /// Must be called from within a Tokio runtime: spawns the pump task.
    pub fn new(
        max_concurrent: usize,
        queue_capacity: usize,
        job_timeout: Duration,
        grace: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            capacity: queue_capacity.max(1),
            job_timeout,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            wake: Notify::new(),
            idle: Notify::new(),
            in_flight: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump(Arc::clone(&shared), cancel.clone(), grace));
        Self {
            shared,
            cancel,
            grace,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn submit<F>(&self, label: String, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            tracing::warn!(job = %label, "dispatch pool shut down, dropping job");
            return;
        }
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.len() >= self.shared.capacity {
                if let Some(dropped) = queue.pop_front() {
                    tracing::warn!(
                        job = %dropped.label,
                        capacity = self.shared.capacity,
                        "dispatch queue full, dropping oldest pending job"
                    );
                }
            }
            queue.push_back(Job {
                label,
                fut: Box::pin(fut),
            });
        }
        self.shared.wake.notify_one();
    }

    /// Waits until the queue is empty and no job is in flight.
    pub async fn idle(&self) {
        loop {
            // Register interest before checking, so a transition to
            // idle between the check and the await still wakes us.
            let notified = self.shared.idle.notified();
            {
                let queue = self.shared.queue.lock().unwrap();
                if queue.is_empty() && self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Stops accepting work and waits for the pump to drain in-flight
    /// jobs within the grace period.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.shared.wake.notify_waiters();
        let handle = self.pump.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.grace + self.shared.job_timeout, handle)
                .await
                .is_err()
            {
                tracing::error!("dispatch pump did not stop in time");
            }
        }
    }
}

async fn pump(shared: Arc<Shared>, cancel: CancellationToken, grace: Duration) {
    let mut tasks: JoinSet<()> = JoinSet::new();

    'main: loop {
        // Wait for queued work, reaping finished tasks meanwhile.
        while shared.queue.lock().unwrap().is_empty() {
            tokio::select! {
                _ = shared.wake.notified() => {}
                _ = cancel.cancelled() => break 'main,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Bound concurrency before taking the job off the queue, so a
        // popped job is always accounted as in flight.
        let permit = tokio::select! {
            permit = Arc::clone(&shared.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break 'main,
            },
            _ = cancel.cancelled() => break 'main,
        };

        let job = {
            let mut queue = shared.queue.lock().unwrap();
            let job = queue.pop_front();
            if job.is_some() {
                shared.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            job
        };
        let Some(Job { label, fut }) = job else {
            drop(permit);
            continue;
        };

        let shared = Arc::clone(&shared);
        tasks.spawn(async move {
            if tokio::time::timeout(shared.job_timeout, fut).await.is_err() {
                tracing::warn!(job = %label, "dispatch handler timed out");
            }
            drop(permit);
            let now_idle = {
                let queue = shared.queue.lock().unwrap();
                let remaining = shared.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
                remaining == 0 && queue.is_empty()
            };
            if now_idle {
                shared.idle.notify_waiters();
            }
        });
    }

    let abandoned_queue = shared.queue.lock().unwrap().len();
    if abandoned_queue > 0 {
        tracing::warn!(
            abandoned = abandoned_queue,
            "shutdown: abandoning queued dispatches"
        );
    }

    // Grace period for in-flight jobs, then force-cancel the rest.
    let drained = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        let remaining = tasks.len();
        tasks.abort_all();
        tracing::warn!(
            remaining,
            "shutdown: grace period elapsed, force-cancelled in-flight dispatches"
        );
    }
}

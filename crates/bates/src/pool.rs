//! Bounded, process-per-task worker pool.
//!
//! [`WorkerPool`] is an admission gate rather than a set of long-lived
//! workers. Submissions go onto an unbounded FIFO queue; a single admission
//! loop takes them off in order, waits for one of `capacity` semaphore
//! permits, then runs the task's blocking fork/IPC round-trip
//! ([`run_isolated`](crate::run_isolated)) on a blocking thread. The permit is
//! released once the child has been reaped.
//!
//! Every submission returns a [`TaskFuture`] straight away. Tasks run whether
//! or not anyone polls their future, and all clones of a future observe the
//! same result.
//!
//! Shutdown is cooperative through a [`CancellationToken`]: [`close`]
//! refuses new submissions while everything already queued still runs.
//!
//! [`close`]: WorkerPool::close

use crate::{Error, MakeAnnotator, PageCount, Result, TaskEnvelope, worker};
use core::time::Duration;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Handle to one task's result. Cheap to clone; every clone resolves to the
/// same value.
pub type TaskFuture = Shared<BoxFuture<'static, Result<PageCount>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of tasks in flight. Clamped to at least 1.
    pub capacity: usize,
    /// How long a worker may take to answer before it is killed. `None` or
    /// a zero duration waits indefinitely.
    pub receive_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 2,
            receive_timeout: None,
        }
    }
}

impl PoolConfig {
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            receive_timeout: None,
        }
    }
}

struct Job {
    task: TaskEnvelope,
    respond: oneshot::Sender<Result<PageCount>>,
}

struct PoolInner<M> {
    factory: M,
    receive_timeout: Option<Duration>,
    occupancy: Occupancy,
}

/// Counts admitted tasks and remembers the high-water mark.
#[derive(Default)]
struct Occupancy {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) -> ActiveGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        ActiveGuard(self)
    }
}

struct ActiveGuard<'a>(&'a Occupancy);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A fixed-capacity gate over isolated worker processes.
pub struct WorkerPool<M> {
    queue: mpsc::UnboundedSender<Job>,
    permits: Arc<Semaphore>,
    capacity: usize,
    inner: Arc<PoolInner<M>>,
    shutdown_token: CancellationToken,
}

impl<M: MakeAnnotator> WorkerPool<M> {
    /// Creates the pool and starts its admission loop.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(factory: M, config: PoolConfig) -> Self {
        let capacity = config.capacity.max(1);
        let permits = Arc::new(Semaphore::new(capacity));
        let inner = Arc::new(PoolInner {
            factory,
            receive_timeout: config.receive_timeout.filter(|t| !t.is_zero()),
            occupancy: Occupancy::default(),
        });
        let (queue, jobs) = mpsc::unbounded_channel();

        tokio::spawn(admit(jobs, Arc::clone(&permits), Arc::clone(&inner)));

        #[cfg(feature = "tracing")]
        tracing::debug!(capacity, timeout = ?config.receive_timeout, "Worker pool started");

        Self {
            queue,
            permits,
            capacity,
            inner,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Queues `task` and returns a future for its page count.
    ///
    /// Failures of the task itself, including a failed fork, resolve through
    /// the returned future.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolClosed`] once [`close`](Self::close) has been
    /// called.
    pub fn submit(&self, task: TaskEnvelope) -> Result<TaskFuture> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::PoolClosed);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(source = %task.source.display(), "Queued task");

        let (respond, result) = oneshot::channel();
        self.queue
            .send(Job { task, respond })
            .map_err(|_| Error::PoolClosed)?;

        Ok(result.map(resolve).boxed().shared())
    }

    /// Stops admitting new submissions. Tasks already queued still run.
    pub fn close(&self) {
        #[cfg(feature = "tracing")]
        tracing::info!(in_flight = self.in_flight(), "Refusing new tasks");
        self.shutdown_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.inner.occupancy.active.load(Ordering::Acquire)
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Highest number of tasks that have held a slot at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.occupancy.peak.load(Ordering::Acquire)
    }
}

// A responder dropped without sending means the task lost its channel back to
// the caller, not that a process failed to start.
fn resolve(received: Result<Result<PageCount>, oneshot::error::RecvError>) -> Result<PageCount> {
    received.unwrap_or_else(|_| {
        Err(Error::ChannelTransport {
            context: "worker task ended without reporting a result".to_string(),
        })
    })
}

async fn admit<M: MakeAnnotator>(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    permits: Arc<Semaphore>,
    inner: Arc<PoolInner<M>>,
) {
    while let Some(Job { task, respond }) = jobs.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let inner = Arc::clone(&inner);

        tokio::spawn(async move {
            let result = {
                let _active = inner.occupancy.enter();
                let worker_inner = Arc::clone(&inner);
                tokio::task::spawn_blocking(move || {
                    worker::run_isolated(&task, &worker_inner.factory, worker_inner.receive_timeout)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(Error::ProcessSpawn {
                        context: format!("worker thread failed: {e}"),
                    })
                })
            };
            drop(permit);

            if let Err(_e) = &result {
                #[cfg(feature = "tracing")]
                tracing::debug!("Task failed: {_e}");
            }

            let _ = respond.send(result);
        });
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Admission loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AnnotationError, BatesNumber,
        testing::{Failing, Fixed, Sleeping},
    };
    use futures::future::join_all;
    use std::thread;

    fn task(source: &str) -> TaskEnvelope {
        TaskEnvelope::new(source, "/nonexistent/out.tif", BatesNumber::with_prefix("P_"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_capacity() {
        let pool = WorkerPool::new(
            || Sleeping(Duration::from_millis(100)),
            PoolConfig::with_capacity(2),
        );
        let futures: Vec<_> = (0..8)
            .map(|i| pool.submit(task(&format!("/in/{i}.tif"))).unwrap())
            .collect();

        let results = join_all(futures).await;
        assert!(results.iter().all(|r| *r == Ok(1)), "{results:?}");
        assert_eq!(pool.peak_in_flight(), 2);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submissions_from_many_threads_share_one_limit() {
        let pool = Arc::new(WorkerPool::new(
            || Sleeping(Duration::from_millis(200)),
            PoolConfig::with_capacity(3),
        ));

        let submitters: Vec<_> = (0..3)
            .map(|t| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    (0..3)
                        .map(|i| pool.submit(task(&format!("/in/{t}_{i}.tif"))).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let futures: Vec<_> = submitters
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        let results = join_all(futures).await;
        assert_eq!(results.len(), 9);
        assert!(results.iter().all(|r| *r == Ok(1)), "{results:?}");
        assert_eq!(pool.peak_in_flight(), 3);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn hung_worker_does_not_block_siblings() {
        let pool = WorkerPool::new(
            || Sleeping(Duration::from_millis(10)),
            PoolConfig {
                capacity: 2,
                receive_timeout: Some(Duration::from_secs(5)),
            },
        );
        let hung = pool.submit(task("/in/hang.tif")).unwrap();
        let siblings: Vec<_> = (0..3)
            .map(|i| pool.submit(task(&format!("/in/{i}.tif"))).unwrap())
            .collect();

        assert!(join_all(siblings).await.iter().all(|r| *r == Ok(1)));
        assert!(hung.peek().is_none(), "hung task resolved before its siblings");
        assert_eq!(hung.await, Err(Error::Timeout { millis: 5000 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clones_observe_the_same_result() {
        let pool = WorkerPool::new(|| Fixed(4), PoolConfig::default());
        let future = pool.submit(task("/in/a.tif")).unwrap();
        let clone = future.clone();
        assert_eq!(future.await, Ok(4));
        assert_eq!(clone.await, Ok(4));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_stay_in_their_future() {
        let pool = WorkerPool::new(|| Failing, PoolConfig::default());
        let err = pool.submit(task("/in/a.tif")).unwrap().await.unwrap_err();
        assert_eq!(
            err,
            Error::Annotation(AnnotationError::Unreadable {
                path: "/in/a.tif".to_string(),
                reason: "scripted failure".to_string(),
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_timeout_never_expires() {
        let pool = WorkerPool::new(
            || Sleeping(Duration::from_millis(20)),
            PoolConfig {
                capacity: 1,
                receive_timeout: Some(Duration::ZERO),
            },
        );
        assert_eq!(pool.submit(task("/in/a.tif")).unwrap().await, Ok(1));
    }

    #[tokio::test]
    async fn dropped_responder_is_a_transport_error() {
        let (respond, result) = oneshot::channel::<Result<PageCount>>();
        drop(respond);
        assert!(matches!(
            resolve(result.await),
            Err(Error::ChannelTransport { context }) if context.contains("without reporting")
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closed_pool_rejects_but_finishes_queued_work() {
        let pool = WorkerPool::new(|| Fixed(2), PoolConfig::with_capacity(1));
        let queued = pool.submit(task("/in/a.tif")).unwrap();
        pool.close();

        assert!(pool.is_closed());
        assert_eq!(pool.submit(task("/in/b.tif")).unwrap_err(), Error::PoolClosed);
        assert_eq!(queued.await, Ok(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_capacity_is_clamped() {
        let pool = WorkerPool::new(|| Fixed(1), PoolConfig::with_capacity(0));
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.submit(task("/in/a.tif")).unwrap().await, Ok(1));
    }
}

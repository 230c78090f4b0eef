use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run blocking backend calls off the interactive thread.
pub trait RenderExecutor: Send + Sync {
    fn submit(&self, job: Job);
}

/// Render workers backed by a dedicated rayon pool.
pub struct ThreadPoolExecutor {
    pool: ThreadPool,
}

impl ThreadPoolExecutor {
    /// `threads == 0` lets rayon pick one worker per core.
    pub fn new(threads: usize) -> anyhow::Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("pdfdesk-render-{index}"))
            .build()?;
        Ok(Self { pool })
    }
}

impl RenderExecutor for ThreadPoolExecutor {
    fn submit(&self, job: Job) {
        self.pool.spawn(job);
    }
}

/// Runs every job on the submitting thread before `submit` returns.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl RenderExecutor for InlineExecutor {
    fn submit(&self, job: Job) {
        job();
    }
}

/// Queues jobs until the owner runs them, so completion order is under the caller's control.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Job>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs the oldest queued job. Returns false when the queue is empty.
    pub fn run_next(&self) -> bool {
        let job = self.queue.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs the newest queued job first.
    pub fn run_last(&self) -> bool {
        let job = self.queue.lock().pop_back();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl RenderExecutor for ManualExecutor {
    fn submit(&self, job: Job) {
        self.queue.lock().push_back(job);
    }
}

/// Time source for debouncing.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn manual_executor_runs_in_requested_order() {
        let executor = ManualExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            executor.submit(Box::new(move || order.lock().push(label)));
        }
        assert_eq!(executor.pending(), 3);
        assert!(executor.run_last());
        assert_eq!(executor.run_all(), 2);
        assert!(!executor.run_next());
        assert_eq!(*order.lock(), vec!["third", "first", "second"]);
    }

    #[test]
    fn thread_pool_executor_runs_jobs() {
        let executor = ThreadPoolExecutor::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            let tx = tx.clone();
            executor.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }));
        }
        for _ in 0..4 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn manual_clock_advances_only_on_request() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }
}

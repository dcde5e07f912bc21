use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    stop: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

/// Fixed-size pool draining a FIFO job queue guarded by one mutex and one
/// condition variable. Submission never blocks; the queue is unbounded.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Twice the online CPU count, floor of 8.
    pub fn default_size() -> usize {
        let cpus = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        (2 * cpus).max(8)
    }

    pub fn new(size: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                stop: false,
            }),
            available: Condvar::new(),
        });
        let workers = (0..size)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("worker-{i}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self { shared, workers }
    }

    pub fn submit(&self, job: Job) {
        let mut queue = self.shared.queue.lock().expect("job queue poisoned");
        if queue.stop {
            debug!("job submitted after shutdown, dropping");
            return;
        }
        queue.jobs.push_back(job);
        drop(queue);
        self.shared.available.notify_one();
    }
}

impl Drop for ThreadPool {
    /// Sets the stop flag, wakes every worker and joins them. Jobs still
    /// queued at that point are freed without running.
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().expect("job queue poisoned");
            queue.stop = true;
        }
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().expect("job queue poisoned");
            loop {
                if queue.stop {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .expect("job queue poisoned");
            }
        };
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn sizing_has_a_floor_of_eight() {
        assert!(ThreadPool::default_size() >= 8);
    }

    #[test]
    fn runs_every_submitted_job() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 100 {
            assert!(Instant::now() < deadline, "jobs did not drain");
            thread::sleep(Duration::from_millis(5));
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn shutdown_joins_workers_without_running_stale_jobs() {
        let pool = ThreadPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        // Occupy the single worker so later jobs stay queued.
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        {
            let gate = Arc::clone(&gate);
            pool.submit(Box::new(move || {
                let (lock, cv) = &*gate;
                let mut open = lock.lock().unwrap();
                while !*open {
                    open = cv.wait(open).unwrap();
                }
            }));
        }
        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            pool.submit(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Release the worker and drop the pool; the stop flag beats the
        // queued jobs, which are freed unrun.
        {
            let (lock, cv) = &*gate;
            *lock.lock().unwrap() = true;
            cv.notify_all();
        }
        drop(pool);
        assert!(ran.load(Ordering::SeqCst) <= 5);
    }
}

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::error::Result;

/// Fire-and-forget worker pool backed by a dedicated runtime.
///
/// Submitted tasks are blocking closures (they do disk I/O) and are never
/// joined; callers observe their effects through shared state. `shutdown`
/// stops the pool immediately and abandons whatever is still queued.
pub struct TaskPool {
    name: String,
    runtime: Mutex<Option<Runtime>>,
}

impl TaskPool {
    pub fn new(name: &str, threads: usize) -> Result<TaskPool> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name(format!("{name}-worker"))
            .build()?;
        Ok(TaskPool {
            name: name.to_string(),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Submits `task` for execution. Tasks submitted after shutdown are
    /// dropped; their owned state is released on the caller's thread.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        match self.runtime.lock().as_ref() {
            Some(runtime) => {
                runtime.spawn_blocking(task);
            }
            None => debug!("task submitted to pool {} after shutdown, dropping", self.name),
        }
    }

    /// Stops the pool without draining it. Queued tasks are dropped; tasks
    /// already running are left to finish in the background.
    pub fn shutdown(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            debug!("shutting down pool {}", self.name);
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_submit_runs_task() {
        let pool = TaskPool::new("test", 2).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.submit(move || {
            tx.send(7usize).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_submit_after_shutdown_is_dropped() {
        let pool = TaskPool::new("test", 1).unwrap();
        pool.shutdown();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        pool.submit(move || {
            ran_clone.store(true, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(50));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_task_releases_owned_state() {
        let pool = TaskPool::new("test", 1).unwrap();
        pool.shutdown();

        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let token = SetOnDrop(dropped.clone());
        pool.submit(move || {
            let _token = token;
        });
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_double_shutdown_is_noop() {
        let pool = TaskPool::new("test", 1).unwrap();
        pool.shutdown();
        pool.shutdown();
    }
}

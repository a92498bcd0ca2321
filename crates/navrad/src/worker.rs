//! Fixed-cadence background worker. The thread sleeps on a shutdown channel
//! with a timeout equal to the tick interval, so stopping it never waits for
//! the next tick and no shared flags are needed.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

pub(crate) struct Worker {
    handle: Option<JoinHandle<()>>,
    shutdown: mpsc::Sender<()>,
}

impl Worker {
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Worker
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown, rx) = mpsc::channel::<()>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(worker = %thread_name, "worker running");
                loop {
                    match rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => tick(),
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(worker = %thread_name, "worker stopped");
            })
            .expect("failed to spawn worker thread");
        Worker {
            handle: Some(handle),
            shutdown,
        }
    }

    /// Signals the thread and joins it. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn ticks_then_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut worker = Worker::spawn("test-worker", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(100));
        worker.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn drop_joins() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        {
            let _worker =
                Worker::spawn("drop-worker", Duration::from_millis(5), move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            thread::sleep(Duration::from_millis(25));
        }
        let after_drop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }
}

//! Background mixing thread.
//!
//! Owns the join handle and a shutdown flag. The loop body is supplied by
//! the engine; the thread checks the flag at the top of every iteration and
//! sleeps briefly whenever the body reports it had nothing to do. Dropping
//! the handle signals shutdown and joins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::Result;
use crate::error::Error;

/// Sleep between iterations that found nothing to mix.
const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// At least one context was mixed.
    Worked,
    /// Nothing to do (paused, no async context, or lock unavailable).
    Idle,
    /// The engine is gone.
    Exit,
}

/// Handle to the running mixer thread.
pub(crate) struct MixerThread {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MixerThread {
    /// Spawns the thread running `step` until shutdown.
    pub fn spawn<F>(mut step: F) -> Result<Self>
    where
        F: FnMut() -> Step + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("mezcla-mixer".into())
            .spawn(move || {
                tracing::info!("mixer thread started");
                while !flag.load(Ordering::Acquire) {
                    match step() {
                        Step::Worked => thread::yield_now(),
                        Step::Idle => thread::sleep(IDLE_SLEEP),
                        Step::Exit => break,
                    }
                }
                tracing::info!("mixer thread stopped");
            })
            .map_err(|e| Error::Device(format!("failed to spawn mixer thread: {e}")))?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Returns true until the thread has exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals shutdown and waits for the thread to exit.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("mixer thread panicked");
        }
    }
}

impl Drop for MixerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut mixer = MixerThread::spawn(move || {
            seen.fetch_add(1, Ordering::Relaxed);
            Step::Idle
        })
        .unwrap();
        while count.load(Ordering::Relaxed) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        mixer.shutdown();
        assert!(!mixer.is_running());
        let after = count.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::Relaxed), after);
    }

    #[test]
    fn exit_step_ends_loop() {
        let mut mixer = MixerThread::spawn(|| Step::Exit).unwrap();
        mixer.shutdown();
        assert!(!mixer.is_running());
    }
}

//! Backend worker thread.
//!
//! The backend is owned by one dedicated thread. Async code reaches it
//! through a [`BackendHandle`], which marshals a closure onto that thread
//! and waits for the result with a bounded timeout.

use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendInfo};
use crate::error::{BackendError, BackendResult};

type Job = Box<dyn FnOnce(&mut dyn Backend) + Send>;

/// Messages accepted by the worker thread.
enum WorkerMessage {
    /// Run a closure against the backend.
    Call(Job),
    /// Shut the backend down and exit.
    Stop,
}

/// Owns the backend thread.
pub struct BackendWorker {
    handle: BackendHandle,
    thread: Option<JoinHandle<()>>,
}

impl BackendWorker {
    /// Moves `backend` onto a new worker thread.
    pub fn spawn(backend: Box<dyn Backend>, call_timeout: Duration) -> BackendResult<Self> {
        let info = backend.info();
        let (tx, rx) = mpsc::channel(32);

        let thread = std::thread::Builder::new()
            .name("stuu-backend".to_string())
            .spawn(move || run_worker(backend, rx))
            .map_err(BackendError::Spawn)?;

        info!(
            authoritative = info.authoritative,
            description = %info.description,
            "Backend worker started"
        );

        Ok(Self {
            handle: BackendHandle {
                tx,
                info,
                call_timeout,
            },
            thread: Some(thread),
        })
    }

    /// Returns a handle for calling into the backend.
    pub fn handle(&self) -> BackendHandle {
        self.handle.clone()
    }

    /// Stops the backend and waits up to `grace` for the thread to exit.
    pub async fn shutdown(mut self, grace: Duration) -> BackendResult<()> {
        if self.handle.tx.send(WorkerMessage::Stop).await.is_err() {
            debug!("Backend worker already stopped");
        }

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let join = tokio::task::spawn_blocking(move || thread.join());
        match tokio::time::timeout(grace, join).await {
            Ok(Ok(Ok(()))) => {
                info!("Backend worker stopped");
                Ok(())
            }
            Ok(_) => {
                warn!("Backend worker panicked");
                Err(BackendError::WorkerStopped)
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Backend worker did not stop in time");
                Err(BackendError::Timeout(grace))
            }
        }
    }
}

fn run_worker(mut backend: Box<dyn Backend>, mut rx: mpsc::Receiver<WorkerMessage>) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            WorkerMessage::Call(job) => job(backend.as_mut()),
            WorkerMessage::Stop => break,
        }
    }
    backend.shutdown();
    debug!("Backend worker loop exited");
}

/// Cloneable handle for calling into the backend thread.
#[derive(Clone)]
pub struct BackendHandle {
    tx: mpsc::Sender<WorkerMessage>,
    info: BackendInfo,
    call_timeout: Duration,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("info", &self.info)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl BackendHandle {
    /// Backend description captured at startup.
    pub fn info(&self) -> &BackendInfo {
        &self.info
    }

    /// True when the backend's transport supersedes the software clock.
    pub fn is_authoritative(&self) -> bool {
        self.info.authoritative
    }

    /// Runs `f` on the backend thread and returns its result.
    ///
    /// # Errors
    ///
    /// [`BackendError::Timeout`] when no answer arrives within the call
    /// timeout, [`BackendError::WorkerStopped`] when the thread is gone.
    /// Calls are not retried.
    pub async fn call<T, F>(&self, f: F) -> BackendResult<T>
    where
        F: FnOnce(&mut dyn Backend) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |backend: &mut dyn Backend| {
            // The caller may have timed out and dropped the receiver.
            let _ = reply_tx.send(f(backend));
        });

        let exchange = async {
            self.tx
                .send(WorkerMessage::Call(job))
                .await
                .map_err(|_| BackendError::WorkerStopped)?;
            reply_rx.await.map_err(|_| BackendError::WorkerStopped)
        };

        match tokio::time::timeout(self.call_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.call_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubBackend;
    use crate::config::BackendConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SlowBackend {
        shut_down: Arc<AtomicBool>,
    }

    impl Backend for SlowBackend {
        fn info(&self) -> BackendInfo {
            BackendInfo {
                authoritative: true,
                description: "slow".into(),
            }
        }

        fn shutdown(&mut self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }

        fn transport_play(&mut self) {
            std::thread::sleep(Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn call_runs_on_worker_thread() {
        let backend = StubBackend::new(BackendConfig::default());
        let worker = BackendWorker::spawn(Box::new(backend), Duration::from_secs(1)).unwrap();
        let handle = worker.handle();

        assert!(!handle.is_authoritative());
        let name = handle
            .call(|_| std::thread::current().name().map(str::to_string))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("stuu-backend"));

        let error = handle.call(|backend| backend.scan_plugins()).await.unwrap().unwrap_err();
        assert_eq!(error.to_string(), "vst:scan requires an audio engine backend");

        worker.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let shut_down = Arc::new(AtomicBool::new(false));
        let backend = SlowBackend {
            shut_down: shut_down.clone(),
        };
        let worker = BackendWorker::spawn(Box::new(backend), Duration::from_millis(20)).unwrap();
        let handle = worker.handle();

        let result = handle.call(|backend| backend.transport_play()).await;
        assert!(matches!(result, Err(BackendError::Timeout(_))));

        worker.shutdown(Duration::from_secs(2)).await.unwrap();
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn calls_fail_after_shutdown() {
        let worker =
            BackendWorker::spawn(Box::new(StubBackend::default()), Duration::from_secs(1)).unwrap();
        let handle = worker.handle();
        worker.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = handle.call(|_| ()).await;
        assert!(matches!(result, Err(BackendError::WorkerStopped)));
    }
}

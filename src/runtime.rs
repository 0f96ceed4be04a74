//! Runtime abstraction layer for async operations
//!
//! Work is split between two execution contexts. Worker futures run on an
//! [`AsyncSpawner`] (a tokio runtime or plain OS threads) and never touch
//! provider or cache state. Continuations that do mutate that state are queued
//! for the single "main thread", which the host drains once per frame with
//! [`AsyncSystem::dispatch_main_thread_tasks`].

use crate::prelude::{Arc, BoxFuture, Duration, Future, FutureExt};
use crate::{OverlayError, Result};
use crossbeam_channel::{Receiver, Sender};
use futures::channel::oneshot;
use std::sync::atomic::{AtomicBool, Ordering};

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task, where the spawner supports it
    fn cancel(&self);
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::runtime::Handle;
        use ::tokio::task::JoinHandle;

        /// Tokio-based async spawner
        #[derive(Clone)]
        pub struct TokioSpawner {
            handle: Handle,
        }

        impl TokioSpawner {
            pub fn new(handle: Handle) -> Self {
                Self { handle }
            }

            /// Spawner for the runtime the caller is running in, if any
            pub fn current() -> Option<Self> {
                Handle::try_current().ok().map(Self::new)
            }
        }

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
                Box::new(TokioHandle(self.handle.spawn(future)))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }

            fn cancel(&self) {
                self.0.abort();
            }
        }
    }

    /// Runs every task to completion on its own OS thread.
    ///
    /// Useful for hosts without an async runtime and in tests. Futures that
    /// need a tokio reactor (such as `reqwest` requests) must use the tokio
    /// spawner instead.
    #[derive(Debug, Clone, Default)]
    pub struct ThreadSpawner;

    impl AsyncSpawner for ThreadSpawner {
        fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
            let finished = Arc::new(AtomicBool::new(false));
            let finished_clone = finished.clone();

            let spawned = std::thread::Builder::new()
                .name("vector-overlay-worker".to_string())
                .spawn(move || {
                    futures::executor::block_on(future);
                    finished_clone.store(true, Ordering::Release);
                });

            if let Err(e) = spawned {
                // The future is dropped with the closure, so anything waiting
                // on its result observes a cancellation.
                log::error!("failed to start worker thread: {e}");
                finished.store(true, Ordering::Release);
            }

            Box::new(ThreadHandle { finished })
        }
    }

    struct ThreadHandle {
        finished: Arc<AtomicBool>,
    }

    impl AsyncHandle for ThreadHandle {
        fn is_finished(&self) -> bool {
            self.finished.load(Ordering::Acquire)
        }

        fn cancel(&self) {
            // Threads can't be interrupted; the task runs to completion.
        }
    }
}

pub use spawners::ThreadSpawner;
#[cfg(feature = "tokio-runtime")]
pub use spawners::tokio_impl::TokioSpawner;

type MainThreadTask = Box<dyn FnOnce() + Send + 'static>;

struct AsyncSystemInner {
    spawner: Arc<dyn AsyncSpawner>,
    main_tx: Sender<MainThreadTask>,
    main_rx: Receiver<MainThreadTask>,
}

/// Worker spawner plus the main-thread task queue.
///
/// Cloning is cheap; every clone shares the same queue.
#[derive(Clone)]
pub struct AsyncSystem {
    inner: Arc<AsyncSystemInner>,
}

impl std::fmt::Debug for AsyncSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSystem")
            .field("pending_main_thread_tasks", &self.inner.main_rx.len())
            .finish()
    }
}

impl AsyncSystem {
    pub fn new(spawner: Arc<dyn AsyncSpawner>) -> Self {
        let (main_tx, main_rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(AsyncSystemInner {
                spawner,
                main_tx,
                main_rx,
            }),
        }
    }

    /// Async system whose workers are plain OS threads
    pub fn with_threads() -> Self {
        Self::new(Arc::new(ThreadSpawner))
    }

    #[cfg(feature = "tokio-runtime")]
    pub fn with_tokio(handle: ::tokio::runtime::Handle) -> Self {
        Self::new(Arc::new(TokioSpawner::new(handle)))
    }

    /// Uses the ambient tokio runtime when there is one, OS threads otherwise
    pub fn from_environment() -> Self {
        #[cfg(feature = "tokio-runtime")]
        {
            if let Some(spawner) = TokioSpawner::current() {
                return Self::new(Arc::new(spawner));
            }
        }
        log::debug!("no tokio runtime found, falling back to thread workers");
        Self::with_threads()
    }

    /// Spawn a worker future
    pub fn spawn<F>(&self, future: F) -> Box<dyn AsyncHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.spawner.spawn_boxed(future.boxed())
    }

    /// Spawn a worker future and receive its output.
    ///
    /// The work starts right away whether or not the returned future is
    /// polled.
    pub fn spawn_with_result<F, T>(&self, future: F) -> BoxFuture<'static, Result<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.spawn(async move {
            let output = future.await;
            let _ = tx.send(output);
        });
        rx.map(|received| received.map_err(|_| OverlayError::TaskCanceled))
            .boxed()
    }

    /// Run a blocking closure on a worker
    pub fn run_in_worker<F, T>(&self, f: F) -> BoxFuture<'static, Result<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_with_result(async move { f() })
    }

    /// Queue a closure for the main thread.
    ///
    /// It runs during the next call to [`Self::dispatch_main_thread_tasks`]
    /// (or one of its variants), never inline.
    pub fn run_in_main<F, T>(&self, f: F) -> BoxFuture<'static, Result<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: MainThreadTask = Box::new(move || {
            let _ = tx.send(f());
        });
        if self.inner.main_tx.send(task).is_err() {
            log::warn!("main thread queue is closed, dropping task");
        }
        rx.map(|received| received.map_err(|_| OverlayError::TaskCanceled))
            .boxed()
    }

    /// Run every queued main-thread task, including tasks queued while
    /// dispatching. Returns how many ran.
    pub fn dispatch_main_thread_tasks(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.inner.main_rx.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one main-thread task and run it
    pub fn dispatch_one_main_thread_task(&self, timeout: Duration) -> bool {
        match self.inner.main_rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }

    pub fn pending_main_thread_tasks(&self) -> usize {
        self.inner.main_rx.len()
    }

    /// Act as the main thread until `future` completes or `timeout` passes.
    ///
    /// Meant for tools and tests; a host with a frame loop calls
    /// [`Self::dispatch_main_thread_tasks`] instead.
    pub fn wait_in_main_thread<F>(&self, mut future: F, timeout: Duration) -> Option<F::Output>
    where
        F: Future + Unpin,
    {
        let deadline = instant::Instant::now() + timeout;
        loop {
            if let Some(output) = (&mut future).now_or_never() {
                return Some(output);
            }
            if instant::Instant::now() >= deadline {
                return None;
            }
            self.dispatch_one_main_thread_task(Duration::from_millis(5));
        }
    }
}

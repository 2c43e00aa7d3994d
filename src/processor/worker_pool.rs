use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Produces the OS threads backing a worker pool.
pub type ThreadFactory =
    Arc<dyn Fn(&str, Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> + Send + Sync>;

/// Default factory: named threads via `thread::Builder`.
pub fn named_thread_factory() -> ThreadFactory {
    Arc::new(|name, task| thread::Builder::new().name(name.to_string()).spawn(task))
}

/// Decorator around a thread factory counting live workers, so shutdown
/// can await their termination. The count covers inline execution on the
/// launcher thread as well as spawned threads.
pub(crate) struct WorkerPool {
    name: String,
    factory: ThreadFactory,
    live: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub(crate) fn new(name: impl Into<String>, factory: ThreadFactory) -> Self {
        Self {
            name: name.into(),
            factory,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of workers currently counted as live.
    pub(crate) fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Dispatches `task` on a new thread. The task counts as live from
    /// this call until it returns, so shutdown cannot observe a gap
    /// between dispatch and thread start.
    pub(crate) fn spawn(
        &self,
        label: &str,
        task: impl FnOnce() + Send + 'static,
    ) -> io::Result<()> {
        let name = format!("{}-{}", self.name, label);
        let guard = CountGuard::activate(self.live.clone());
        (self.factory)(
            &name,
            Box::new(move || {
                let _guard = guard;
                task();
            }),
        )
        .map(|_| ())
    }

    /// Runs `task` on the calling thread, still counted as a live worker.
    pub(crate) fn run_inline(&self, task: impl FnOnce()) {
        let _guard = CountGuard::activate(self.live.clone());
        task();
    }
}

/// Holds one unit of the live count for as long as it exists; dropping
/// the guard releases the count even when the task panicked.
struct CountGuard {
    live: Arc<AtomicUsize>,
}

impl CountGuard {
    fn activate(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { live }
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// Task dispatcher.
//
// `Task::run` executes a diff or patch on the caller's thread. `Dispatcher`
// moves owned tasks onto a worker pool (rayon with the `parallel` feature,
// one OS thread per task otherwise) and hands back a `TaskHandle` that
// completes exactly once: blocking `wait`, `Future` polling, or a one-shot
// `on_complete` continuation. A panicking task completes with
// `Error::Worker`.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use log::{debug, error};

use crate::delta::decoder::PatchOptions;
use crate::delta::encoder::DiffOptions;
use crate::engine;
use crate::error::{Error, Result};
use crate::io;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// One unit of work. Every variant owns its inputs.
#[derive(Debug, Clone)]
pub enum Task {
    Diff {
        old: Vec<u8>,
        new: Vec<u8>,
        options: DiffOptions,
    },
    Patch {
        old: Vec<u8>,
        diff: Vec<u8>,
        options: PatchOptions,
    },
    DiffFile {
        old: PathBuf,
        new: PathBuf,
        out: PathBuf,
        options: DiffOptions,
    },
    PatchFile {
        old: PathBuf,
        diff: PathBuf,
        out: PathBuf,
        options: PatchOptions,
    },
}

/// What a finished task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Patch bytes (`Diff`) or reconstructed data (`Patch`).
    Bytes(Vec<u8>),
    /// The written output file (`DiffFile`, `PatchFile`).
    Path(PathBuf),
}

impl Output {
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Path(_) => None,
        }
    }

    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Self::Path(p) => Some(p),
            Self::Bytes(_) => None,
        }
    }
}

impl Task {
    pub fn diff(old: impl Into<Vec<u8>>, new: impl Into<Vec<u8>>) -> Self {
        Self::Diff {
            old: old.into(),
            new: new.into(),
            options: DiffOptions::default(),
        }
    }

    pub fn patch(old: impl Into<Vec<u8>>, diff: impl Into<Vec<u8>>) -> Self {
        Self::Patch {
            old: old.into(),
            diff: diff.into(),
            options: PatchOptions::default(),
        }
    }

    pub fn diff_file(
        old: impl Into<PathBuf>,
        new: impl Into<PathBuf>,
        out: impl Into<PathBuf>,
    ) -> Self {
        Self::DiffFile {
            old: old.into(),
            new: new.into(),
            out: out.into(),
            options: DiffOptions::default(),
        }
    }

    pub fn patch_file(
        old: impl Into<PathBuf>,
        diff: impl Into<PathBuf>,
        out: impl Into<PathBuf>,
    ) -> Self {
        Self::PatchFile {
            old: old.into(),
            diff: diff.into(),
            out: out.into(),
            options: PatchOptions::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Diff { .. } => "diff",
            Self::Patch { .. } => "patch",
            Self::DiffFile { .. } => "diff-file",
            Self::PatchFile { .. } => "patch-file",
        }
    }

    /// Execute on the current thread.
    pub fn run(self) -> Result<Output> {
        match self {
            Self::Diff { old, new, options } => {
                engine::diff_with_options(&old, &new, &options).map(Output::Bytes)
            }
            Self::Patch { old, diff, options } => {
                engine::patch_with_options(&old, &diff, &options).map(Output::Bytes)
            }
            Self::DiffFile {
                old,
                new,
                out,
                options,
            } => {
                io::diff_file_with_stats(&old, &new, &out, &options)?;
                Ok(Output::Path(out))
            }
            Self::PatchFile {
                old,
                diff,
                out,
                options,
            } => {
                io::patch_file_with_stats(&old, &diff, &out, &options)?;
                Ok(Output::Path(out))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

type Continuation = Box<dyn FnOnce(Result<Output>) + Send>;

#[derive(Default)]
struct State {
    finished: bool,
    result: Option<Result<Output>>,
    waker: Option<Waker>,
    continuation: Option<Continuation>,
}

#[derive(Default)]
struct Completion {
    state: Mutex<State>,
    ready: Condvar,
}

impl Completion {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, result: Result<Output>) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        if let Some(continuation) = state.continuation.take() {
            drop(state);
            run_continuation(continuation, result);
            return;
        }
        state.result = Some(result);
        let waker = state.waker.take();
        drop(state);
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

fn run_continuation(continuation: Continuation, result: Result<Output>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || continuation(result))) {
        error!("completion handler panicked: {}", panic_message(&*payload));
    }
}

/// Worker-side end of a handle. Dropping it unfinished completes the task
/// with an error, so a job lost by the pool still reports.
struct Completer(Arc<Completion>);

impl Completer {
    fn finish(self, result: Result<Output>) {
        self.0.complete(result);
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        self.0
            .complete(Err(Error::Worker("task dropped before it ran".into())));
    }
}

/// Caller-side end of a submitted task.
pub struct TaskHandle {
    shared: Arc<Completion>,
}

impl TaskHandle {
    fn pair() -> (Self, Completer) {
        let shared = Arc::new(Completion::default());
        (
            Self {
                shared: shared.clone(),
            },
            Completer(shared),
        )
    }

    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.shared.lock().finished
    }

    /// Block until the task finishes.
    pub fn wait(self) -> Result<Output> {
        let mut state = self.shared.lock();
        while !state.finished {
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
            .result
            .take()
            .unwrap_or_else(|| Err(Error::Worker("result already taken".into())))
    }

    /// Run `f` with the result once the task finishes: inline if it already
    /// has, otherwise on the worker that completes it.
    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Result<Output>) + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.finished {
            let result = state
                .result
                .take()
                .unwrap_or_else(|| Err(Error::Worker("result already taken".into())));
            drop(state);
            run_continuation(Box::new(f), result);
        } else {
            state.continuation = Some(Box::new(f));
        }
    }
}

impl Future for TaskHandle {
    type Output = Result<Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock();
        if state.finished {
            return Poll::Ready(
                state
                    .result
                    .take()
                    .unwrap_or_else(|| Err(Error::Worker("result already taken".into()))),
            );
        }
        match &state.waker {
            Some(w) if w.will_wake(cx.waker()) => {}
            _ => state.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs tasks off the caller's thread.
pub struct Dispatcher {
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl Dispatcher {
    /// Create a dispatcher. `threads == 0` picks one worker per CPU.
    /// Without the `parallel` feature every task gets its own thread and
    /// `threads` is ignored.
    pub fn new(threads: usize) -> Result<Self> {
        #[cfg(feature = "parallel")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("hdelta-worker-{i}"))
                .build()
                .map_err(|e| Error::Worker(format!("cannot start worker pool: {e}")))?;
            debug!("dispatcher started with {} workers", pool.current_num_threads());
            Ok(Self { pool })
        }
        #[cfg(not(feature = "parallel"))]
        {
            let _ = threads;
            Ok(Self {})
        }
    }

    /// Execute `task` on the caller's thread.
    pub fn run(&self, task: Task) -> Result<Output> {
        task.run()
    }

    /// Queue `task` and return its handle.
    pub fn submit(&self, task: Task) -> TaskHandle {
        let (handle, completer) = TaskHandle::pair();
        let kind = task.kind();
        let job = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| task.run()))
                .unwrap_or_else(|payload| {
                    Err(Error::Worker(format!(
                        "{kind} task panicked: {}",
                        panic_message(&*payload)
                    )))
                });
            debug!("{kind} task finished (ok: {})", result.is_ok());
            completer.finish(result);
        };

        #[cfg(feature = "parallel")]
        self.pool.spawn(job);

        #[cfg(not(feature = "parallel"))]
        if let Err(e) = std::thread::Builder::new()
            .name(format!("hdelta-{kind}"))
            .spawn(job)
        {
            // The job closure, and its completer, were dropped with the error.
            error!("cannot spawn worker thread: {e}");
        }

        handle
    }

    /// Queue `task` and call `handler` with its result exactly once.
    pub fn submit_with<F>(&self, task: Task, handler: F)
    where
        F: FnOnce(Result<Output>) + Send + 'static,
    {
        self.submit(task).on_complete(handler);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("Dispatcher");
        #[cfg(feature = "parallel")]
        d.field("threads", &self.pool.current_num_threads());
        d.finish()
    }
}

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// How a background refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
  /// The refresh ran to completion and the cache holds the backend's answer.
  Completed,
  /// The backend failed. The error was logged and the cache left as it was.
  Failed,
  /// The task was dropped before finishing, e.g. because its runtime shut down.
  Abandoned,
}

/// Represents a waiter blocked on a refresh.
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

struct Inner {
  status: Option<RefreshStatus>,
  waiters: VecDeque<Waiter>,
}

struct Signal {
  inner: Mutex<Inner>,
}

impl Signal {
  fn complete(&self, status: RefreshStatus) {
    let mut inner = self.inner.lock();
    if inner.status.is_some() {
      return;
    }
    inner.status = Some(status);
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }
}

/// Creates a linked completer/handle pair for one background refresh.
pub(crate) fn channel() -> (RefreshCompleter, RefreshHandle) {
  let signal = Arc::new(Signal {
    inner: Mutex::new(Inner {
      status: None,
      waiters: VecDeque::new(),
    }),
  });
  (
    RefreshCompleter {
      signal: Some(signal.clone()),
    },
    RefreshHandle { signal },
  )
}

/// Held by the background task. Dropping it unfinished reports
/// [`RefreshStatus::Abandoned`].
pub(crate) struct RefreshCompleter {
  signal: Option<Arc<Signal>>,
}

impl RefreshCompleter {
  pub(crate) fn complete(mut self, status: RefreshStatus) {
    if let Some(signal) = self.signal.take() {
      signal.complete(status);
    }
  }
}

impl Drop for RefreshCompleter {
  fn drop(&mut self) {
    if let Some(signal) = self.signal.take() {
      signal.complete(RefreshStatus::Abandoned);
    }
  }
}

/// Observes a detached background refresh.
///
/// Awaiting the handle, or calling [`wait`](Self::wait) from a synchronous
/// thread, resolves once the refresh has finished. Dropping the handle has no
/// effect on the refresh itself.
pub struct RefreshHandle {
  signal: Arc<Signal>,
}

impl RefreshHandle {
  /// Returns the status if the refresh has already finished.
  pub fn status(&self) -> Option<RefreshStatus> {
    self.signal.inner.lock().status
  }

  pub fn is_finished(&self) -> bool {
    self.status().is_some()
  }

  /// Blocks the current thread until the refresh finishes.
  ///
  /// Must not be called from inside the async runtime that runs the refresh.
  pub fn wait(self) -> RefreshStatus {
    loop {
      {
        let mut inner = self.signal.inner.lock();
        if let Some(status) = inner.status {
          return status;
        }
        inner.waiters.push_back(Waiter::Sync(thread::current()));
      }
      thread::park();
    }
  }
}

impl Future for RefreshHandle {
  type Output = RefreshStatus;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.signal.inner.lock();
    match inner.status {
      Some(status) => Poll::Ready(status),
      None => {
        inner.waiters.push_back(Waiter::Async(cx.waker().clone()));
        Poll::Pending
      }
    }
  }
}

impl fmt::Debug for RefreshHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RefreshHandle")
      .field("status", &self.status())
      .finish()
  }
}

//! Bounded typed channels with close-carried errors.
//!
//! This is the one signalling primitive in conch: back-pressure,
//! cancellation, and end-of-stream are all expressed by `close(cause)`.
//!
//! ```text
//!   Sender ──▶ [VecDeque<T> ring] ──▶ Receiver
//!              ├── sender parks when full (backpressure)
//!              ├── receiver parks when empty
//!              ├── close from sender → receiver drains, then None
//!              └── close from receiver → send() returns false
//! ```
//!
//! Either endpoint may close; the close is non-blocking, idempotent, and
//! wakes every parked party. The first non-`None` error wins the `cause`
//! cell and stays retrievable from both endpoints afterwards.
//!
//! State lives under a `std::sync::Mutex` (critical sections are queue
//! pushes and waker registration, microseconds) with wakers stored under
//! the lock so wakeups cannot be lost. `send`/`recv` are cancel-safe
//! futures: a send dropped while parked never delivered its message, a
//! recv dropped while parked took nothing from the queue. That makes them
//! safe branches for `tokio::select!`, which together with
//! `try_send`/`try_recv` covers selection with and without a default.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Poll, Waker};

use conch_types::CmdError;
use tokio::sync::Notify;

/// Default channel capacity for pipeline connectors.
pub const CHAN_CAP: usize = 64;

struct State<T> {
    queue: VecDeque<T>,
    cap: usize,
    cause: Option<CmdError>,
    send_wakers: Vec<Waker>,
    recv_wakers: Vec<Waker>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    closed: AtomicBool,
}

impl<T> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn close(&self, cause: Option<CmdError>) {
        let mut st = self.lock();
        self.closed.store(true, Ordering::Release);
        if st.cause.is_none() {
            st.cause = cause;
        }
        for w in st.send_wakers.drain(..) {
            w.wake();
        }
        for w in st.recv_wakers.drain(..) {
            w.wake();
        }
    }

    fn cause(&self) -> Option<CmdError> {
        self.lock().cause.clone()
    }
}

/// Sending endpoint. Cheap to clone; all clones share the channel.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// Receiving endpoint. Cheap to clone; all clones share the channel.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender { shared: self.shared.clone() }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver { shared: self.shared.clone() }
    }
}

/// Outcome of a non-blocking send.
#[derive(Debug)]
pub enum TrySend<T> {
    Sent,
    /// The queue is full; the message is handed back.
    Full(T),
    /// The channel is closed; the message is handed back.
    Closed(T),
}

/// Outcome of a non-blocking receive.
#[derive(Debug)]
pub enum TryRecv<T> {
    Msg(T),
    Empty,
    Closed,
}

/// Create a bounded channel. A capacity of zero is accepted and behaves
/// as a one-slot handoff.
pub fn chan<T>(cap: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(cap.clamp(1, 256)),
            cap: cap.max(1),
            cause: None,
            send_wakers: Vec::new(),
            recv_wakers: Vec::new(),
        }),
        closed: AtomicBool::new(false),
    });
    (
        Sender { shared: shared.clone() },
        Receiver { shared },
    )
}

impl<T> Sender<T> {
    /// Send a message, parking while the queue is full. Resolves `false`
    /// once the channel is closed; the message is then dropped, which is
    /// the cue to close your own input and unwind.
    pub async fn send(&self, msg: T) -> bool {
        let mut slot = Some(msg);
        poll_fn(|cx| {
            if self.shared.closed.load(Ordering::Acquire) {
                return Poll::Ready(false);
            }
            let mut st = self.shared.lock();
            if self.shared.closed.load(Ordering::Acquire) {
                return Poll::Ready(false);
            }
            if st.queue.len() < st.cap {
                st.queue.push_back(slot.take().expect("send polled after completion"));
                for w in st.recv_wakers.drain(..) {
                    w.wake();
                }
                Poll::Ready(true)
            } else {
                st.send_wakers.push(cx.waker().clone());
                Poll::Pending
            }
        })
        .await
    }

    /// Non-blocking send for selection with a default branch.
    pub fn try_send(&self, msg: T) -> TrySend<T> {
        if self.shared.closed.load(Ordering::Acquire) {
            return TrySend::Closed(msg);
        }
        let mut st = self.shared.lock();
        if self.shared.closed.load(Ordering::Acquire) {
            return TrySend::Closed(msg);
        }
        if st.queue.len() < st.cap {
            st.queue.push_back(msg);
            for w in st.recv_wakers.drain(..) {
                w.wake();
            }
            TrySend::Sent
        } else {
            TrySend::Full(msg)
        }
    }

    /// Close the channel, recording the cause. Idempotent, non-blocking.
    pub fn close(&self, cause: Option<CmdError>) {
        self.shared.close(cause);
    }

    /// The error recorded by the first erroring close, if any.
    pub fn cause(&self) -> Option<CmdError> {
        self.shared.cause()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<T> Receiver<T> {
    /// Receive the next message in FIFO order. Resolves `None` once the
    /// channel is closed and the queue is drained; `cause()` then reports
    /// why the stream ended.
    pub async fn recv(&self) -> Option<T> {
        poll_fn(|cx| {
            let mut st = self.shared.lock();
            if let Some(m) = st.queue.pop_front() {
                for w in st.send_wakers.drain(..) {
                    w.wake();
                }
                return Poll::Ready(Some(m));
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return Poll::Ready(None);
            }
            st.recv_wakers.push(cx.waker().clone());
            Poll::Pending
        })
        .await
    }

    /// Non-blocking receive for selection with a default branch.
    pub fn try_recv(&self) -> TryRecv<T> {
        let mut st = self.shared.lock();
        if let Some(m) = st.queue.pop_front() {
            for w in st.send_wakers.drain(..) {
                w.wake();
            }
            return TryRecv::Msg(m);
        }
        if self.shared.closed.load(Ordering::Acquire) {
            TryRecv::Closed
        } else {
            TryRecv::Empty
        }
    }

    /// Close from the consumer side: every later `send` fails, which is
    /// how upstreams are told to stop.
    pub fn close(&self, cause: Option<CmdError>) {
        self.shared.close(cause);
    }

    pub fn cause(&self) -> Option<CmdError> {
        self.shared.cause()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<T> std::fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").field("closed", &self.is_closed()).finish()
    }
}

impl<T> std::fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").field("closed", &self.is_closed()).finish()
    }
}

/// Single-shot interrupt broadcast: raised once, observed monotonically by
/// any number of waiters.
#[derive(Clone, Default)]
pub struct Intr {
    inner: Arc<IntrInner>,
}

#[derive(Default)]
struct IntrInner {
    fired: AtomicBool,
    notify: Notify,
}

impl Intr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt, waking every current and future waiter.
    pub fn raise(&self) {
        self.inner.fired.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Park until the interrupt is raised. Returns immediately if it
    /// already was.
    pub async fn wait(&self) {
        loop {
            if self.is_raised() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for Intr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intr").field("raised", &self.is_raised()).finish()
    }
}

use std::{
    fmt::{Display, Formatter},
    future::Future,
    pin::Pin,
    sync::Arc,
};

use tokio::{
    sync::{oneshot, watch},
    time::Instant,
};

/// Why a context finished.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CancelReason {
    Parent,
    Deadline,
    Cancel,
}

impl Display for CancelReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parent => write!(f, "Parent"),
            Self::Deadline => write!(f, "Deadline"),
            Self::Cancel => write!(f, "Cancel"),
        }
    }
}

struct RawContext {
    // Dropped when the last clone of the context goes away, which is what
    // unblocks the handler side.
    _done: oneshot::Sender<()>,
    cancelled: watch::Receiver<()>,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

impl RawContext {
    #[must_use]
    fn new(parent: Option<Context>, deadline: Option<Instant>) -> (Self, Handler) {
        let (done, recv) = oneshot::channel();
        let (cancel, cancelled) = watch::channel(());

        (
            Self {
                _done: done,
                cancelled,
                deadline,
                parent,
            },
            Handler { recv, cancel },
        )
    }

    fn done(&self) -> Pin<Box<dyn Future<Output = CancelReason> + Send + '_>> {
        let mut cancelled = self.cancelled.clone();
        Box::pin(async move {
            match (&self.parent, self.deadline) {
                (Some(parent), Some(deadline)) => {
                    tokio::select! {
                        _ = parent.done() => CancelReason::Parent,
                        _ = tokio::time::sleep_until(deadline) => CancelReason::Deadline,
                        _ = cancelled.changed() => CancelReason::Cancel,
                    }
                }
                (Some(parent), None) => {
                    tokio::select! {
                        _ = parent.done() => CancelReason::Parent,
                        _ = cancelled.changed() => CancelReason::Cancel,
                    }
                }
                (None, Some(deadline)) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => CancelReason::Deadline,
                        _ = cancelled.changed() => CancelReason::Cancel,
                    }
                }
                (None, None) => {
                    let _ = cancelled.changed().await;
                    CancelReason::Cancel
                }
            }
        })
    }
}

/// The owner side of a context: cancels it and waits for every clone of the
/// paired [`Context`] to be dropped.
pub struct Handler {
    recv: oneshot::Receiver<()>,
    cancel: watch::Sender<()>,
}

impl Handler {
    /// Waits for the context to be dropped without cancelling it.
    pub async fn done(&mut self) {
        let _ = (&mut self.recv).await;
    }

    /// Cancels the context and waits for every clone to be dropped.
    pub async fn cancel(self) {
        drop(self.cancel);

        let _ = self.recv.await;
    }
}

/// A cancellation scope handed to tasks. Cheap to clone; the paired
/// [`Handler`] observes when all clones are gone.
#[derive(Clone)]
pub struct Context(Arc<RawContext>);

impl Context {
    pub fn new() -> (Self, Handler) {
        let (ctx, handler) = RawContext::new(None, None);
        (Self(Arc::new(ctx)), handler)
    }

    pub fn with_deadline(deadline: Instant) -> (Self, Handler) {
        let (ctx, handler) = RawContext::new(None, Some(deadline));
        (Self(Arc::new(ctx)), handler)
    }

    pub fn with_timeout(timeout: std::time::Duration) -> (Self, Handler) {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_parent(parent: Context, deadline: Option<Instant>) -> (Self, Handler) {
        let (ctx, handler) = RawContext::new(Some(parent), deadline);
        (Self(Arc::new(ctx)), handler)
    }

    /// Resolves once the context is cancelled, its deadline passes or a
    /// parent context finishes.
    pub async fn done(&self) -> CancelReason {
        self.0.done().await
    }
}

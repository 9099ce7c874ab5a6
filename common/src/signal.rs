use std::task::Poll;

use tokio::signal::unix::{signal, Signal, SignalKind};

/// Listens on a set of unix signals and yields whichever fires first.
#[derive(Default)]
pub struct SignalHandler {
    signals: Vec<(SignalKind, Signal)>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, kind: SignalKind) -> Self {
        let listener = signal(kind).expect("failed to create signal listener");
        self.signals.push((kind, listener));
        self
    }

    /// Waits for the next registered signal. Pends forever when no signals
    /// are registered.
    pub async fn recv(&mut self) -> SignalKind {
        std::future::poll_fn(|cx| {
            for (kind, listener) in &mut self.signals {
                if listener.poll_recv(cx).is_ready() {
                    return Poll::Ready(*kind);
                }
            }
            Poll::Pending
        })
        .await
    }
}

//! Timer-gated value updates, used to debounce the user-search query box.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Emits only the value still current when the delay elapses.
///
/// Each [`Debouncer::update`] supersedes the previous pending value and
/// restarts the timer; a superseded timer never fires, so a stale query can
/// never trigger a fetch after a newer one was typed.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    output: mpsc::UnboundedSender<T>,
    pending: Option<CancellationToken>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Creates a debouncer and the receiver its settled values arrive on.
    #[must_use]
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (output, receiver) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                output,
                pending: None,
            },
            receiver,
        )
    }

    /// Replaces the pending value and restarts the delay.
    pub fn update(&mut self, value: T) {
        self.cancel();

        let token = CancellationToken::new();
        self.pending = Some(token.clone());

        let output = self.output.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = output.send(value);
                }
            }
        });
    }

    /// Drops the pending value without emitting it.
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

//! Play tokens, highlight timers and speech request cancellation.
//!
//! Every asynchronous continuation started for a story carries the token that
//! was current when it was issued. The owner compares it against the current
//! token before touching any state, so superseded work is inert even if it
//! slips past cancellation.

use {
    crate::error::{Result, StoryError},
    std::{future::Future, time::Duration},
    tokio::{
        sync::{mpsc::UnboundedSender, oneshot},
        task::AbortHandle,
    },
};

/// Identifies one playback session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayToken(u64);

impl PlayToken {
    /// Raw value, for logging.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Mints strictly increasing play tokens.
#[derive(Debug, Default)]
pub struct TokenSource {
    current: PlayToken,
}

impl TokenSource {
    /// Supersedes the current session and returns the new token.
    pub fn mint(&mut self) -> PlayToken {
        self.current = PlayToken(self.current.0.wrapping_add(1));
        self.current
    }

    /// Latest token handed out.
    pub const fn current(&self) -> PlayToken {
        self.current
    }

    /// Whether `token` belongs to the latest session.
    pub fn is_current(&self, token: PlayToken) -> bool {
        self.current == token
    }
}

/// Delayed events that can all be cancelled at once.
#[derive(Debug, Default)]
pub struct TimerSet {
    handles: Vec<AbortHandle>,
}

impl TimerSet {
    /// Sends `event` on `tx` after `delay` unless the set is cleared first.
    pub fn schedule<E>(&mut self, delay: Duration, tx: &UnboundedSender<E>, event: E)
    where
        E: Send + 'static,
    {
        let tx = tx.clone();
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = tx.send(event);
        });
        self.handles.push(task.abort_handle());
    }

    /// Aborts every pending timer. Takes effect before this call returns:
    /// an aborted task never reaches its send.
    pub fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    /// Timers not yet fired or aborted.
    pub fn pending(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Whether no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Owner side of a cancellable request.
#[derive(Debug)]
pub struct CancelHandle(Option<oneshot::Sender<()>>);

impl CancelHandle {
    /// Cancels the guarded request.
    pub fn cancel(mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Request side of a cancellable request.
#[derive(Debug)]
pub struct CancelSignal(oneshot::Receiver<()>);

/// A linked handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = oneshot::channel();
    (CancelHandle(Some(tx)), CancelSignal(rx))
}

impl CancelSignal {
    /// Runs `fut` until it completes or the request is cancelled. Dropping the
    /// handle counts as cancellation.
    pub async fn guard<T, F>(self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.0 => Err(StoryError::Cancelled),
            result = fut => result,
        }
    }
}

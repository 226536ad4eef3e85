//! Cancellable deferred actions for protocol deadlines.
//!
//! Deferred actions run on the shared runtime worker pool, never on the
//! arming task.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Default window a peer has to send its next protocol message.
pub const DEFAULT_PROTOCOL_TIMEOUT: Duration = Duration::from_millis(8000);

/// Handle to an armed deferred action.
///
/// Cancelling is idempotent: cancelling a handle that already fired or
/// was already cancelled is a no-op. Dropping the handle cancels it,
/// so an armed timeout never outlives its connection.
#[derive(Debug)]
pub struct TimeoutHandle {
    task: JoinHandle<()>,
}

impl TimeoutHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for TimeoutHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Arm a deferred action that runs after `delay` unless cancelled first.
pub fn arm<F>(delay: Duration, action: F) -> TimeoutHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        action.await;
    });
    TimeoutHandle { task }
}

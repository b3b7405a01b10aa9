use crate::connection::ConnectionEvent;
use futures_util::Stream as FutStream;
use tokio::sync::mpsc;

pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub(crate) fn capacity_or_default(capacity: usize) -> usize {
    if capacity == 0 {
        DEFAULT_CHANNEL_CAPACITY
    } else {
        capacity
    }
}

/// Stream of events from the connection task.
///
/// Dropping the stream aborts the task and with it the socket.
pub struct EventStream {
    receiver: mpsc::Receiver<ConnectionEvent>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

impl EventStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<ConnectionEvent>,
        handle: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            receiver,
            _handle: handle,
        }
    }

    /// Receive the next event. `None` once the connection task has exited.
    pub async fn next(&mut self) -> Option<ConnectionEvent> {
        self.receiver.recv().await
    }
}

impl FutStream for EventStream {
    type Item = ConnectionEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

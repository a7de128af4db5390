//! Duplex message ports
//!
//! A [`MessagePort`] pair is a point-to-point, message-oriented pipe built
//! from two bounded mpsc channels. Each end can send and receive
//! independently; closing (or dropping) one end is observed by the peer as
//! end-of-stream on its receive side. Values are moved across the boundary,
//! so payloads keep value semantics: there is no shared memory between the
//! two ends.

use thiserror::Error;
use tokio::sync::mpsc;

/// Sending on a port whose peer end has been closed.
#[derive(Debug, Error)]
#[error("peer end of the port is closed")]
pub struct PortClosed;

/// One end of a duplex message pipe.
pub struct MessagePort<T> {
    tx: mpsc::Sender<T>,
    rx: mpsc::Receiver<T>,
}

impl<T> std::fmt::Debug for MessagePort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePort").finish_non_exhaustive()
    }
}

/// Create a connected pair of ports, each side buffering up to `capacity`
/// in-flight messages.
pub fn port_pair<T: Send>(capacity: usize) -> (MessagePort<T>, MessagePort<T>) {
    let (tx_a, rx_a) = mpsc::channel(capacity);
    let (tx_b, rx_b) = mpsc::channel(capacity);
    (
        MessagePort { tx: tx_a, rx: rx_b },
        MessagePort { tx: tx_b, rx: rx_a },
    )
}

impl<T> MessagePort<T> {
    /// Send a message to the peer end.
    pub async fn send(&self, message: T) -> Result<(), PortClosed> {
        self.tx.send(message).await.map_err(|_| PortClosed)
    }

    /// Receive the next message. Returns `None` once the peer end is closed
    /// and all buffered messages have been drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Split this end into independently owned send and receive halves.
    pub fn split(self) -> (PortSender<T>, PortReceiver<T>) {
        (PortSender { tx: self.tx }, PortReceiver { rx: self.rx })
    }
}

/// The sending half of a port end. Cheap to clone.
pub struct PortSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> std::fmt::Debug for PortSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSender").finish_non_exhaustive()
    }
}

impl<T> PortSender<T> {
    pub async fn send(&self, message: T) -> Result<(), PortClosed> {
        self.tx.send(message).await.map_err(|_| PortClosed)
    }

    /// Whether the peer end has closed its receive side.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The receiving half of a port end.
pub struct PortReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> std::fmt::Debug for PortReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortReceiver").finish_non_exhaustive()
    }
}

impl<T> PortReceiver<T> {
    /// Receive the next message. `None` means the peer end is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop accepting new messages from the peer. Buffered messages can
    /// still be drained with `recv`.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

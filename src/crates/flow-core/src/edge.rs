//! The edge protocol: a bounded, ordered, single-producer single-consumer
//! channel carrying `Message`s between nodes.
//!
//! Grounded on the bounded-queue shape of the admin websocket layer's
//! backpressure handling (`flowd::api::ws::backpressure`), but edges must
//! block rather than drop on overflow (spec §4.2), so the transport here is
//! a plain bounded `tokio::sync::mpsc` channel rather than a drop-oldest
//! ring buffer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// The semantic type of an edge. Some nodes change this as they translate
/// (`window` turns Stream into Batch; `flatten`/`combine` turn Batch back
/// into Stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Stream,
    Batch,
}

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("edge closed")]
    Closed,
}

/// The sending half of an edge. Closing it (dropping, or calling `close`)
/// signals end-of-stream to the receiver.
pub struct EdgeSender {
    kind: EdgeKind,
    tx: tokio::sync::mpsc::Sender<Message>,
}

impl EdgeSender {
    /// Blocks (suspends the calling task) when the bounded buffer is full —
    /// this is the backpressure point named in §4.2/§5.
    pub async fn send(&self, msg: Message) -> Result<(), EdgeError> {
        self.tx.send(msg).await.map_err(|_| EdgeError::Closed)
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Clone for EdgeSender {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            tx: self.tx.clone(),
        }
    }
}

/// The receiving half. `recv()` returns `None` once the edge is closed and
/// every in-flight message has been drained (the terminal event a node
/// reacts to by emitting its own remaining state and closing its
/// downstream edges).
pub struct EdgeReceiver {
    kind: EdgeKind,
    rx: tokio::sync::mpsc::Receiver<Message>,
}

impl EdgeReceiver {
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }
}

/// Create a new bounded edge of the given kind and buffer capacity.
pub fn edge(kind: EdgeKind, capacity: usize) -> (EdgeSender, EdgeReceiver) {
    let (tx, rx) = tokio::sync::mpsc::channel(capacity.max(1));
    (EdgeSender { kind, tx }, EdgeReceiver { kind, rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Barrier;

    #[tokio::test]
    async fn send_recv_preserves_order() {
        let (tx, mut rx) = edge(EdgeKind::Stream, 8);
        for t in 0..5 {
            tx.send(Message::Barrier(Barrier { time: t })).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(msg) = rx.recv().await {
            seen.push(msg.time());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn closed_sender_errors() {
        let (tx, rx) = edge(EdgeKind::Stream, 1);
        drop(rx);
        let err = tx.send(Message::Barrier(Barrier { time: 0 })).await;
        assert!(matches!(err, Err(EdgeError::Closed)));
    }

    #[tokio::test]
    async fn full_buffer_blocks_sender() {
        let (tx, mut rx) = edge(EdgeKind::Stream, 1);
        tx.send(Message::Barrier(Barrier { time: 0 })).await.unwrap();

        let tx2 = tx.clone();
        let send_task = tokio::spawn(async move {
            tx2.send(Message::Barrier(Barrier { time: 1 })).await.unwrap();
        });

        // Give the blocked sender a chance to actually block before draining.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!send_task.is_finished());

        rx.recv().await;
        send_task.await.unwrap();
    }
}

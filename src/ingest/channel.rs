//! Rendezvous handoff between the record source and the workers.
//!
//! The channel holds at most one record in flight and `send` only returns
//! once a worker has taken that record, so a send blocks until a receiver is
//! ready. Any number of workers may receive from clones of the same
//! [`WorkReceiver`]. The single [`WorkSender`] is not `Clone`; dropping it (or
//! calling [`WorkSender::close`]) closes the channel, after which every
//! receive returns [`Received::Exhausted`] without blocking. When the last
//! receiver goes away the channel closes from the other side and a blocked
//! `send` fails with [`ChannelClosed`].

use crate::models::Record;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Every receiver is gone; the record was not delivered.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("work channel has no receivers")]
pub struct ChannelClosed;

struct Handoff {
    record: Record,
    taken: oneshot::Sender<()>,
}

pub enum Received {
    Record(Record),
    Exhausted,
}

pub struct WorkSender {
    inner: async_channel::Sender<Handoff>,
}

#[derive(Clone)]
pub struct WorkReceiver {
    inner: Arc<ReceiverHalf>,
}

struct ReceiverHalf {
    rx: async_channel::Receiver<Handoff>,
}

impl Drop for ReceiverHalf {
    fn drop(&mut self) {
        // A record parked in the slot would keep its sender waiting forever.
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

pub fn work_channel() -> (WorkSender, WorkReceiver) {
    let (tx, rx) = async_channel::bounded(1);
    (
        WorkSender { inner: tx },
        WorkReceiver {
            inner: Arc::new(ReceiverHalf { rx }),
        },
    )
}

impl WorkSender {
    /// Hand a record to whichever worker asks for one next.
    pub async fn send(&self, record: Record) -> Result<(), ChannelClosed> {
        let (taken, taken_rx) = oneshot::channel();
        self.inner
            .send(Handoff { record, taken })
            .await
            .map_err(|_| ChannelClosed)?;
        taken_rx.await.map_err(|_| ChannelClosed)
    }

    /// Blocking variant of [`send`](Self::send) for the source thread.
    ///
    /// Must not be called from inside an async task.
    pub fn send_blocking(&self, record: Record) -> Result<(), ChannelClosed> {
        let (taken, taken_rx) = oneshot::channel();
        self.inner
            .send_blocking(Handoff { record, taken })
            .map_err(|_| ChannelClosed)?;
        taken_rx.blocking_recv().map_err(|_| ChannelClosed)
    }

    /// Signal end of stream. Consuming `self` makes a second close impossible.
    pub fn close(self) {
        self.inner.close();
    }
}

impl WorkReceiver {
    /// Wait for the next record, or `Exhausted` once the sender is gone and
    /// nothing is pending.
    pub async fn recv(&self) -> Received {
        match self.inner.rx.recv().await {
            Ok(handoff) => {
                // The sender may have given up already; the record is still ours.
                let _ = handoff.taken.send(());
                Received::Record(handoff.record)
            }
            Err(_) => Received::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn record(id: &str) -> Record {
        Record::from_fields([id, "TRUE", "1", "2", "3"]).expect("record")
    }

    #[tokio::test]
    async fn test_send_waits_for_a_receiver() {
        let (tx, rx) = work_channel();

        let send = tokio::spawn(async move {
            tx.send(record("a")).await.expect("delivered");
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!send.is_finished(), "send completed without a receiver");

        match rx.recv().await {
            Received::Record(r) => assert_eq!(r.id, "a"),
            Received::Exhausted => panic!("channel closed early"),
        }
        timeout(Duration::from_secs(1), send)
            .await
            .expect("send released after receive")
            .expect("sender task");
    }

    #[tokio::test]
    async fn test_close_drains_then_exhausts_every_receiver() {
        let (tx, rx) = work_channel();
        let other = rx.clone();

        let producer = tokio::spawn(async move {
            for id in ["1", "2", "3"] {
                tx.send(record(id)).await.expect("delivered");
            }
            tx.close();
        });

        let mut seen = Vec::new();
        loop {
            match rx.recv().await {
                Received::Record(r) => seen.push(r.id),
                Received::Exhausted => break,
            }
        }
        producer.await.expect("producer task");

        assert_eq!(seen, vec!["1", "2", "3"]);
        for _ in 0..3 {
            assert!(matches!(other.recv().await, Received::Exhausted));
            assert!(matches!(rx.recv().await, Received::Exhausted));
        }
    }

    #[tokio::test]
    async fn test_send_fails_once_receivers_are_dropped() {
        let (tx, rx) = work_channel();
        drop(rx);
        assert_eq!(tx.send(record("x")).await, Err(ChannelClosed));
    }

    #[tokio::test]
    async fn test_dropping_receivers_releases_a_parked_send() {
        let (tx, rx) = work_channel();
        let other = rx.clone();

        let send = tokio::spawn(async move { tx.send(record("parked")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send.is_finished());

        drop(rx);
        drop(other);
        let result = timeout(Duration::from_secs(1), send)
            .await
            .expect("send released")
            .expect("sender task");
        assert_eq!(result, Err(ChannelClosed));
    }

    #[test]
    fn test_send_blocking_from_a_plain_thread() {
        let (tx, rx) = work_channel();
        let producer = std::thread::spawn(move || {
            tx.send_blocking(record("t")).expect("delivered");
        });

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            match rx.recv().await {
                Received::Record(r) => assert_eq!(r.id, "t"),
                Received::Exhausted => panic!("channel closed early"),
            }
        });
        producer.join().expect("producer thread");

        runtime.block_on(async {
            assert!(matches!(rx.recv().await, Received::Exhausted));
        });
    }
}

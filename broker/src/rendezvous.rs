// rendezvous.rs - Single-slot handoff where the publisher waits for a taker

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rendezvous closed")]
pub struct Closed;

/// Producer side. Each `publish` completes only once a taker has the value.
#[derive(Debug)]
pub struct Publisher<T> {
    takers: mpsc::Receiver<oneshot::Sender<T>>,
}

/// Consumer side. Cloneable, every value still goes to exactly one taker.
#[derive(Debug)]
pub struct Taker<T> {
    takers: mpsc::Sender<oneshot::Sender<T>>,
}

impl<T> Clone for Taker<T> {
    fn clone(&self) -> Self {
        Self {
            takers: self.takers.clone(),
        }
    }
}

pub fn channel<T>() -> (Publisher<T>, Taker<T>) {
    // one waiting taker at a time; the value itself is never buffered
    let (tx, rx) = mpsc::channel(1);
    (Publisher { takers: rx }, Taker { takers: tx })
}

impl<T> Publisher<T> {
    /// Blocks until a taker shows up and hands `value` to it.
    ///
    /// Takers that gave up while queued are skipped. Fails once every taker is dropped.
    pub async fn publish(&mut self, mut value: T) -> Result<(), Closed> {
        loop {
            let slot = self.takers.recv().await.ok_or(Closed)?;
            match slot.send(value) {
                Ok(()) => return Ok(()),
                Err(returned) => value = returned,
            }
        }
    }
}

impl<T> Taker<T> {
    /// Blocks until the publisher hands over its next value.
    ///
    /// Dropping the future before it resolves leaves the value with the publisher.
    pub async fn take(&self) -> Result<T, Closed> {
        let (tx, rx) = oneshot::channel();
        self.takers.send(tx).await.map_err(|_| Closed)?;
        rx.await.map_err(|_| Closed)
    }
}

// Synchronous single-slot frame handoff.
//
// `offer` does not return until the receiving side has finished
// processing the item: the value travels over a rendezvous channel and
// the sender then blocks on a completion ack. This is the pipeline's
// sole backpressure mechanism; it bounds memory to one frame in flight
// and guarantees strict ordering with exactly-once delivery.

use crossbeam::channel::{bounded, Receiver, RecvError, Sender};

pub struct HandoffSender<T> {
    items: Sender<T>,
    acks: Receiver<()>,
}

pub struct HandoffReceiver<T> {
    items: Receiver<T>,
    acks: Sender<()>,
}

/// The other half of the handoff has gone away.
#[derive(Debug, PartialEq, Eq)]
pub struct HandoffClosed;

pub fn sync_handoff<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (item_tx, item_rx) = bounded(0);
    let (ack_tx, ack_rx) = bounded(0);
    (
        HandoffSender {
            items: item_tx,
            acks: ack_rx,
        },
        HandoffReceiver {
            items: item_rx,
            acks: ack_tx,
        },
    )
}

impl<T> HandoffSender<T> {
    /// Hand the item over and block until the receiver calls
    /// `complete()` for it.
    pub fn offer(&self, item: T) -> Result<(), HandoffClosed> {
        self.items.send(item).map_err(|_| HandoffClosed)?;
        self.acks.recv().map_err(|_| HandoffClosed)
    }
}

impl<T> HandoffReceiver<T> {
    /// The raw item channel, for use in `select!` loops. Every received
    /// item must be followed by exactly one `complete()`.
    pub fn inbox(&self) -> &Receiver<T> {
        &self.items
    }

    /// Unblock the sender after processing the current item.
    pub fn complete(&self) {
        let _ = self.acks.send(());
    }

    /// Receive one item, run the handler over it, then release the
    /// sender. The sender stays blocked for the whole handler.
    pub fn process<R>(&self, handler: impl FnOnce(T) -> R) -> Result<R, HandoffClosed> {
        let item = self.items.recv().map_err(|_: RecvError| HandoffClosed)?;
        let out = handler(item);
        self.complete();
        Ok(out)
    }
}

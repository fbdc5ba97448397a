use tokio::sync::mpsc;

use crate::types::SyncCursor;

/// Notifications published by a wallet to its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Initialization or resume finished; the wallet accepts operations.
    Ready(SyncCursor),
    /// A block was committed.
    SyncProgress(SyncCursor),
    /// Identifying elements of newly derived keys, for extending an external
    /// block filter.
    KeysDerived(Vec<Vec<u8>>),
    /// A failure surfaced outside a direct call, e.g. in the sync pipeline.
    Error(String),
}

/// Unbounded so that no `KeysDerived` notification is ever lost. Queued
/// events are held until read: a caller that does not consume them must
/// drop the receiver, after which publishing is a no-op.
pub type EventReceiver = mpsc::UnboundedReceiver<WalletEvent>;

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<WalletEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Fire and forget; a dropped receiver just means nobody is listening.
    pub fn publish(&self, event: WalletEvent) {
        let _ = self.tx.send(event);
    }
}

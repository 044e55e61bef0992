//! Address state published by resolvers.

use tokio::sync::watch;

use crate::resolver::{Address, AddressSink};

/// [`AddressSink`] backed by a `watch` channel.
///
/// Every publish replaces the current set, even when it is unchanged or
/// empty, and marks it as new for all receivers.
#[derive(Debug)]
pub struct StateSink {
    tx: watch::Sender<Vec<Address>>,
}

impl StateSink {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Last published address set (empty before the first publish).
    pub fn current(&self) -> Vec<Address> {
        self.tx.borrow().clone()
    }

    /// A receiver that reports publishes made after this call.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Address>> {
        self.tx.subscribe()
    }
}

impl Default for StateSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSink for StateSink {
    fn update_state(&self, addresses: Vec<Address>) {
        tracing::debug!(count = addresses.len(), "Address set updated");
        self.tx.send_replace(addresses);
    }
}

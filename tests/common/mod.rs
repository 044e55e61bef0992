//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use resilient_connect::error::LookupError;
use resilient_connect::resolver::{Address, AddressSink, LookupBackend};

/// Lookup backend with a fixed answer, a call counter and an optional gate.
///
/// When gated, every lookup signals `entered` and then waits for a permit
/// from `release`.
pub struct ScriptedLookup {
    answer: Mutex<Result<Vec<String>, LookupError>>,
    calls: AtomicUsize,
    gated: bool,
    pub entered: Notify,
    pub release: Semaphore,
}

impl ScriptedLookup {
    pub fn answering(ips: &[&str]) -> Arc<Self> {
        Arc::new(Self::new(Ok(ips.iter().map(|s| s.to_string()).collect()), false))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self::new(Err(LookupError::Backend(message.to_string())), false))
    }

    pub fn gated(ips: &[&str]) -> Arc<Self> {
        Arc::new(Self::new(Ok(ips.iter().map(|s| s.to_string()).collect()), true))
    }

    fn new(answer: Result<Vec<String>, LookupError>, gated: bool) -> Self {
        Self {
            answer: Mutex::new(answer),
            calls: AtomicUsize::new(0),
            gated,
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    pub fn set_answer(&self, ips: &[&str]) {
        *self.answer.lock().unwrap() = Ok(ips.iter().map(|s| s.to_string()).collect());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupBackend for ScriptedLookup {
    async fn lookup_host(&self, _host: &str) -> Result<Vec<String>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.entered.notify_one();
            self.release
                .acquire()
                .await
                .map_err(|e| LookupError::Backend(e.to_string()))?
                .forget();
        }
        self.answer.lock().unwrap().clone()
    }
}

/// Sink that records every published address set.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<Vec<Address>>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<Vec<Address>> {
        self.updates.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    /// Wait until at least `n` updates were recorded.
    pub async fn wait_for(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {} updates, saw {:?}", n, self.updates()));
    }
}

impl AddressSink for RecordingSink {
    fn update_state(&self, addresses: Vec<Address>) {
        self.updates.lock().unwrap().push(addresses);
        self.notify.notify_waiters();
    }
}

pub fn addrs(list: &[&str]) -> Vec<Address> {
    list.iter().map(|s| Address::verbatim(*s)).collect()
}

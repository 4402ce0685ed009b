use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::Value;

use super::LocalStore;
use crate::documents::DocumentKind;

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutosaveReport {
    pub scheduled: u64,
    pub commits: u64,
    pub failures: u64,
}

/// Debounced writer for in-progress edits of one document type.
///
/// Every [`Autosaver::schedule`] restarts the timer; a record is written only
/// once no newer edit arrived within the delay. Dropping or finishing the
/// autosaver commits whatever is still pending.
pub struct Autosaver {
    kind: DocumentKind,
    sender: Option<mpsc::Sender<Value>>,
    worker: Option<JoinHandle<AutosaveReport>>,
}

impl Autosaver {
    pub fn spawn(store: LocalStore, kind: DocumentKind, delay: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::spawn(move || run_worker(&store, kind, delay, &receiver));
        Self {
            kind,
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn schedule(&self, record: Value) -> anyhow::Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| anyhow!("autosave for {} already closed", self.kind))?
            .send(record)
            .map_err(|_| anyhow!("autosave worker for {} stopped", self.kind))
    }

    pub fn finish(mut self) -> anyhow::Result<AutosaveReport> {
        self.close()
    }

    fn close(&mut self) -> anyhow::Result<AutosaveReport> {
        drop(self.sender.take());
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| anyhow!("autosave worker for {} panicked", self.kind)),
            None => Ok(AutosaveReport::default()),
        }
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::error!(error = %err, "autosave shutdown failed");
        }
    }
}

fn run_worker(
    store: &LocalStore,
    kind: DocumentKind,
    delay: Duration,
    receiver: &mpsc::Receiver<Value>,
) -> AutosaveReport {
    let mut report = AutosaveReport::default();
    while let Ok(first) = receiver.recv() {
        report.scheduled += 1;
        let mut pending = first;
        loop {
            match receiver.recv_timeout(delay) {
                Ok(next) => {
                    report.scheduled += 1;
                    pending = next;
                }
                Err(RecvTimeoutError::Timeout) => {
                    commit(store, kind, pending, &mut report);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    commit(store, kind, pending, &mut report);
                    return report;
                }
            }
        }
    }
    report
}

fn commit(store: &LocalStore, kind: DocumentKind, record: Value, report: &mut AutosaveReport) {
    match store.upsert_raw(kind, record) {
        Ok(_) => report.commits += 1,
        Err(err) => {
            report.failures += 1;
            tracing::warn!(%kind, error = %err, "autosave failed");
        }
    }
}

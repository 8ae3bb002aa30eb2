use super::store::{SessionStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub type ReadResult = Result<Option<Value>, StoreError>;
pub type PendingRead = oneshot::Receiver<ReadResult>;

enum PersistOp {
    Read {
        key: String,
        reply: oneshot::Sender<ReadResult>,
    },
    Write { key: String, value: Value },
    Remove { key: String },
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget writer in front of a [`SessionStore`].
///
/// Operations are applied in submission order by a single background task. Failures are
/// logged and dropped; the in-memory state stays authoritative. Reads travel through the
/// same queue, so a read observes every write and removal submitted before it.
#[derive(Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl Persister {
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn SessionStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    PersistOp::Read { key, reply } => {
                        let _ = reply.send(store.get(&key).await);
                    }
                    PersistOp::Write { key, value } => {
                        if let Err(e) = store.set(&key, value).await {
                            warn!("Failed to persist {}: {}", key, e);
                        }
                    }
                    PersistOp::Remove { key } => {
                        if let Err(e) = store.remove(&key).await {
                            warn!("Failed to remove {}: {}", key, e);
                        }
                    }
                    PersistOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persister stopped");
        });

        Self { tx }
    }

    /// Queues a read behind everything already submitted. Await the receiver outside
    /// of any lock; it errors if the persister has stopped.
    pub fn read(&self, key: String) -> PendingRead {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(PersistOp::Read { key, reply }).is_err() {
            warn!("Persister is closed, dropping read");
        }
        rx
    }

    pub fn write(&self, key: String, value: Value) {
        if self.tx.send(PersistOp::Write { key, value }).is_err() {
            warn!("Persister is closed, dropping write");
        }
    }

    pub fn remove(&self, key: String) {
        if self.tx.send(PersistOp::Remove { key }).is_err() {
            warn!("Persister is closed, dropping remove");
        }
    }

    /// Resolves once every operation submitted before it has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

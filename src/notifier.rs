use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::change::ChangeRecord;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Fans repository changes for one watched table out to every open
/// [`Listener`].
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<Inner>,
}

struct Inner {
    event_tx: broadcast::Sender<Arc<ChangeRecord>>,
    listeners: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
    table: String,
    shutdown: CancellationToken,
}

impl ChangeNotifier {
    /// `table` is the storage table whose changes are forwarded.
    pub fn new(table: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Inner {
                event_tx,
                listeners: Mutex::new(HashSet::new()),
                next_id: AtomicU64::new(1),
                table: table.into(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn table(&self) -> &str {
        &self.inner.table
    }

    /// Spawns the bridge task: change feed → watched-table filter → listeners.
    ///
    /// The feed receiver is created by the caller, so no change written after
    /// this call returns is missed.
    pub fn spawn_bridge(&self, mut feed: broadcast::Receiver<ChangeRecord>) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            tracing::info!(table = %notifier.table(), "Change feed bridge started");
            loop {
                match feed.recv().await {
                    Ok(record) => {
                        if record.table == notifier.table() {
                            let delivered = notifier.publish(record);
                            tracing::debug!(delivered, "Change event published");
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Change feed bridge lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::info!("Change feed closed, bridge stopped");
        })
    }

    /// Fans `record` out to every listener. Returns how many received it.
    pub fn publish(&self, record: ChangeRecord) -> usize {
        self.inner.event_tx.send(Arc::new(record)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Listener {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.inner.event_tx.subscribe();
        self.inner.listeners.lock().insert(id);
        tracing::info!(listener = id, "Change listener registered");
        Listener {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Ends every listener stream so long-lived connections can close.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

/// Registration of one long-lived connection.
pub struct Listener {
    id: u64,
    rx: broadcast::Receiver<Arc<ChangeRecord>>,
    inner: Arc<Inner>,
}

impl Listener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the notifier shuts down. Events missed
    /// because the listener fell behind are skipped.
    pub async fn recv(&mut self) -> Option<Arc<ChangeRecord>> {
        loop {
            let received = tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => return None,
                received = self.rx.recv() => received,
            };
            match received {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(listener = self.id, skipped = n, "Change listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.inner.listeners.lock().remove(&self.id) {
            tracing::info!(listener = self.id, "Change listener released");
        }
    }
}

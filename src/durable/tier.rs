//! Durable Tier Adapter
//!
//! Write-behind queue between the cache and a [`DurableStore`]. The cache only
//! ever enqueues; a [`DurableWriter`] applies the queue off the caller's path.
//! Store failures are logged and dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::EntrySnapshot;
use crate::durable::DurableStore;

// == Durable Op ==
/// One queued durable mutation. Keys are cache keys (not namespaced).
#[derive(Debug)]
pub enum DurableOp {
    Put { key: String, record: Vec<u8> },
    Delete { key: String },
    Clear,
    /// Resolves once every earlier op has been applied.
    Barrier(oneshot::Sender<()>),
}

/// Creates a connected tier/writer pair over `store`.
///
/// Records are stored under `"{namespace}:{cache key}"`.
pub fn channel(
    store: Arc<dyn DurableStore>,
    namespace: impl Into<String>,
) -> (DurableTier, DurableWriter) {
    let (tx, rx) = mpsc::unbounded_channel();
    let namespace = namespace.into();
    let tier = DurableTier {
        store: store.clone(),
        namespace: namespace.clone(),
        tx,
    };
    let writer = DurableWriter {
        store,
        namespace,
        rx,
    };
    (tier, writer)
}

// == Rehydrated ==
/// Outcome of reading the durable tier at startup.
#[derive(Debug, Default)]
pub struct Rehydrated {
    /// Live snapshots, ready to load
    pub live: Vec<EntrySnapshot>,
    /// Records dropped because their TTL had elapsed
    pub expired: usize,
    /// Records dropped because they could not be read or parsed
    pub corrupt: usize,
}

// == Durable Tier ==
/// Cache-side handle of the durable tier.
pub struct DurableTier {
    store: Arc<dyn DurableStore>,
    namespace: String,
    tx: UnboundedSender<DurableOp>,
}

impl std::fmt::Debug for DurableTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTier")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl DurableTier {
    // == Enqueue ==
    /// Queues a snapshot write. Never blocks.
    pub fn put(&self, snapshot: &EntrySnapshot) {
        match serde_json::to_vec(snapshot) {
            Ok(record) => self.send(DurableOp::Put {
                key: snapshot.key.clone(),
                record,
            }),
            Err(e) => warn!(key = %snapshot.key, error = %e, "Durable snapshot encode failed"),
        }
    }

    /// Queues a record removal. Never blocks.
    pub fn delete(&self, key: &str) {
        self.send(DurableOp::Delete {
            key: key.to_string(),
        });
    }

    /// Queues removal of every record in the namespace. Never blocks.
    pub fn clear(&self) {
        self.send(DurableOp::Clear);
    }

    /// Returns a receiver that resolves once everything queued so far is applied.
    pub fn barrier(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.send(DurableOp::Barrier(tx));
        rx
    }

    fn send(&self, op: DurableOp) {
        if self.tx.send(op).is_err() {
            debug!("Durable writer gone, dropping op");
        }
    }

    // == Rehydrate ==
    /// Reads every record of the namespace, keeping live snapshots.
    ///
    /// Expired and unparsable records are deleted from the store one by one;
    /// a bad record never stops the others from loading.
    pub fn rehydrate(&self, now: DateTime<Utc>) -> Rehydrated {
        let mut out = Rehydrated::default();

        let keys = match self.store.list_keys(&self.prefix()) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Durable tier unavailable, starting cold");
                return out;
            }
        };

        for store_key in keys {
            let record = match self.store.get(&store_key) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %store_key, error = %e, "Durable record unreadable, skipping");
                    out.corrupt += 1;
                    continue;
                }
            };

            let snapshot = match serde_json::from_slice::<EntrySnapshot>(&record) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(key = %store_key, error = %e, "Durable record corrupt, dropping");
                    out.corrupt += 1;
                    self.discard(&store_key);
                    continue;
                }
            };

            if snapshot.is_live(now) {
                out.live.push(snapshot);
            } else {
                out.expired += 1;
                self.discard(&store_key);
            }
        }

        info!(
            "Durable rehydration: {} live, {} expired, {} corrupt",
            out.live.len(),
            out.expired,
            out.corrupt
        );
        out
    }

    fn discard(&self, store_key: &str) {
        if let Err(e) = self.store.delete(store_key) {
            warn!(key = %store_key, error = %e, "Durable delete failed");
        }
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }
}

// == Durable Writer ==
/// Applies queued durable ops to the store.
pub struct DurableWriter {
    store: Arc<dyn DurableStore>,
    namespace: String,
    rx: UnboundedReceiver<DurableOp>,
}

impl DurableWriter {
    /// Applies everything currently queued on the calling thread.
    ///
    /// Returns the number of ops applied.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(op) = self.rx.try_recv() {
            apply(self.store.as_ref(), &self.namespace, op);
            applied += 1;
        }
        applied
    }

    /// Spawns a task that applies ops on the blocking pool until every
    /// tier handle is dropped.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Durable writer started for namespace '{}'", self.namespace);

            while let Some(op) = self.rx.recv().await {
                let store = self.store.clone();
                let namespace = self.namespace.clone();
                let result = tokio::task::spawn_blocking(move || {
                    apply(store.as_ref(), &namespace, op);
                })
                .await;
                if let Err(e) = result {
                    warn!(error = %e, "Durable op task failed");
                }
            }

            info!("Durable writer stopped");
        })
    }
}

fn apply(store: &dyn DurableStore, namespace: &str, op: DurableOp) {
    let outcome = match op {
        DurableOp::Put { key, record } => {
            let store_key = format!("{namespace}:{key}");
            store.put(&store_key, &record).map_err(|e| (store_key, e))
        }
        DurableOp::Delete { key } => {
            let store_key = format!("{namespace}:{key}");
            store.delete(&store_key).map_err(|e| (store_key, e))
        }
        DurableOp::Clear => clear_namespace(store, namespace),
        DurableOp::Barrier(done) => {
            let _ = done.send(());
            Ok(())
        }
    };

    if let Err((key, e)) = outcome {
        warn!(key = %key, error = %e, "Durable write failed");
    }
}

fn clear_namespace(
    store: &dyn DurableStore,
    namespace: &str,
) -> Result<(), (String, crate::error::CacheError)> {
    let prefix = format!("{namespace}:");
    let keys = store.list_keys(&prefix).map_err(|e| (prefix.clone(), e))?;
    for key in keys {
        store.delete(&key).map_err(|e| (key.clone(), e))?;
    }
    Ok(())
}

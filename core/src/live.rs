use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::db::{Database, Table};
use crate::executor::WorkerPool;

/// What a [`Live`] currently holds: nothing before the first evaluation,
/// then the outcome of the latest one.
type Slot<T> = Option<Result<T, Arc<anyhow::Error>>>;

/// An observable query result.
///
/// Holds nothing until the first evaluation completes, then the latest value
/// or the error of the latest evaluation. The query re-runs when its filter
/// key changes or one of the tables it reads is written. Dropping the `Live`
/// stops the driver task.
pub struct Live<T> {
    rx: watch::Receiver<Slot<T>>,
    driver: JoinHandle<()>,
}

impl<T: Clone> Live<T> {
    /// Latest value, if the latest evaluation succeeded.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        match &*self.rx.borrow() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Current value, waiting for the first evaluation if necessary.
    pub async fn first(&self) -> Result<T> {
        self.wait_for(|_| true).await
    }

    /// First published value (current one included) matching `pred`.
    ///
    /// Returns the error instead if an evaluation fails before that.
    pub async fn wait_for(&self, mut pred: impl FnMut(&T) -> bool) -> Result<T> {
        let mut rx = self.rx.clone();
        let slot = rx
            .wait_for(|slot| match slot {
                Some(Ok(value)) => pred(value),
                Some(Err(_)) => true,
                None => false,
            })
            .await
            .context("Live query stopped")?;
        resolve(&slot)
    }

    /// Wait for the next publication after the last one seen through this handle.
    pub async fn changed(&mut self) -> Result<T> {
        self.rx.changed().await.context("Live query stopped")?;
        let slot = self.rx.borrow_and_update();
        resolve(&slot)
    }
}

fn resolve<T: Clone>(slot: &Slot<T>) -> Result<T> {
    match slot {
        Some(Ok(value)) => Ok(value.clone()),
        Some(Err(e)) => Err(anyhow!("{e:#}")),
        None => Err(anyhow!("Live query has no value")),
    }
}

impl<T> Drop for Live<T> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Start a driver that evaluates `query` on `pool` for the current `key`,
/// then again each time `key` changes or a table in `tables` is written.
///
/// Only the latest key is evaluated; keys set while a query is running are
/// coalesced into one re-run. A key channel whose sender is gone simply
/// never triggers.
pub(crate) fn spawn_live<K, T, Q>(
    pool: &WorkerPool,
    db: Arc<Database>,
    label: &'static str,
    mut key: watch::Receiver<K>,
    tables: &'static [Table],
    query: Q,
) -> Live<T>
where
    K: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    Q: Fn(&Database, &K) -> Result<T> + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(None);
    let runner = pool.clone();
    let query = Arc::new(query);
    // Subscribe before the first evaluation so no write is missed.
    let mut changes = db.subscribe();

    let driver = pool.spawn(async move {
        let mut key_open = true;
        loop {
            let current = key.borrow_and_update().clone();
            let job = {
                let db = Arc::clone(&db);
                let query = Arc::clone(&query);
                runner.submit(label, move || (*query)(db.as_ref(), &current))
            };
            match job.await {
                Ok(value) => {
                    tx.send_replace(Some(Ok(value)));
                }
                Err(e) => {
                    warn!(query = label, error = %format!("{e:#}"), "live query failed");
                    tx.send_replace(Some(Err(Arc::new(e))));
                }
            }

            if !next_trigger(&mut key, &mut key_open, &mut changes, tables).await {
                debug!(query = label, "live query has no more triggers");
                break;
            }
        }
    });

    Live { rx, driver }
}

/// Wait until something should cause a re-run. Returns `false` once nothing can.
async fn next_trigger<K>(
    key: &mut watch::Receiver<K>,
    key_open: &mut bool,
    changes: &mut broadcast::Receiver<Table>,
    tables: &[Table],
) -> bool {
    loop {
        tokio::select! {
            res = key.changed(), if *key_open => match res {
                Ok(()) => return true,
                Err(_) => *key_open = false,
            },
            res = changes.recv() => match res {
                Ok(table) if tables.contains(&table) => {
                    drain(changes);
                    return true;
                }
                Ok(_) => {}
                // Missed events might have touched our tables.
                Err(RecvError::Lagged(_)) => {
                    drain(changes);
                    return true;
                }
                Err(RecvError::Closed) => return false,
            },
        }
    }
}

// Coalesce a burst of writes into a single re-run.
fn drain(changes: &mut broadcast::Receiver<Table>) {
    loop {
        match changes.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

//! Live queries: callbacks that are re-run after every write to a table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Tables a write can touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Fish,
    FeedingSchedules,
}

pub(crate) type Delivery = Box<dyn FnOnce() + Send + 'static>;
type Loader = dyn Fn(&Connection) -> Result<Delivery> + Send + Sync;

struct Subscriber {
    table: Table,
    active: Arc<AtomicBool>,
    loader: Arc<Loader>,
}

#[derive(Default)]
pub(crate) struct LiveQueries {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    // Serialises refresh rounds so snapshots arrive in commit order.
    round: Mutex<()>,
}

impl LiveQueries {
    /// Register `query` + `callback` on `table`. The callback is run once
    /// with the current value before this returns.
    pub(crate) fn subscribe<T, Q, F>(
        self: &Arc<Self>,
        conn: &Mutex<Connection>,
        table: Table,
        query: Q,
        callback: F,
    ) -> Result<Subscription>
    where
        T: Send + 'static,
        Q: Fn(&Connection) -> anyhow::Result<T> + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let loader: Arc<Loader> = Arc::new(move |conn: &Connection| {
            let value = query(conn)?;
            let callback = Arc::clone(&callback);
            Ok(Box::new(move || callback(value)) as Delivery)
        });

        let initial = {
            let conn = conn
                .lock()
                .map_err(|e| Error::Persistence(format!("database lock poisoned: {e}")))?;
            loader(&*conn)?
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.lock_subscribers()?.insert(
            id,
            Subscriber {
                table,
                active: Arc::clone(&active),
                loader,
            },
        );
        debug!(id, ?table, "live query subscribed");
        initial();

        Ok(Subscription {
            id,
            active,
            registry: Arc::downgrade(self),
        })
    }

    /// Re-run every live query on `tables` and deliver fresh values.
    pub(crate) fn refresh(&self, conn: &Mutex<Connection>, tables: &[Table]) {
        let _round = match self.round.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let targets: Vec<(u64, Arc<AtomicBool>, Arc<Loader>)> = match self.lock_subscribers() {
            Ok(subs) => subs
                .iter()
                .filter(|(_, sub)| tables.contains(&sub.table))
                .map(|(id, sub)| (*id, Arc::clone(&sub.active), Arc::clone(&sub.loader)))
                .collect(),
            Err(err) => {
                warn!("skipping live query refresh: {err}");
                return;
            }
        };
        if targets.is_empty() {
            return;
        }

        let mut deliveries = Vec::with_capacity(targets.len());
        {
            let conn = match conn.lock() {
                Ok(conn) => conn,
                Err(err) => {
                    warn!("skipping live query refresh: database lock poisoned: {err}");
                    return;
                }
            };
            for (id, active, loader) in targets {
                match loader(&*conn) {
                    Ok(delivery) => deliveries.push((active, delivery)),
                    Err(err) => warn!(id, "live query failed: {err}"),
                }
            }
        }

        for (active, delivery) in deliveries {
            if active.load(Ordering::Acquire) {
                delivery();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock_subscribers().map(|subs| subs.len()).unwrap_or(0)
    }

    fn remove(&self, id: u64) {
        if let Ok(mut subs) = self.lock_subscribers() {
            subs.remove(&id);
        }
    }

    fn lock_subscribers(&self) -> Result<std::sync::MutexGuard<'_, HashMap<u64, Subscriber>>> {
        self.subscribers
            .lock()
            .map_err(|e| Error::Persistence(format!("subscriber lock poisoned: {e}")))
    }
}

/// Handle to a live query. Updates stop once it is cancelled or dropped.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<LiveQueries>,
}

impl Subscription {
    pub fn cancel(self) {
        // Drop does the work.
    }

    fn release(&mut self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.id);
            }
            debug!(id = self.id, "live query cancelled");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

//! Shared key-value store with change notifications.
//!
//! The only communication primitive between tabs. There is no lock, no
//! compare-and-swap and no ordered log: callers tolerate racing writers
//! through the monotonic `lastModified` + host-identity discipline.
//!
//! ```text
//! set(key, v) ──► write (memory / file) ──► every subscriber of key: (key, old, new)
//!                                             in subscription order, writer included
//! refresh()   ──► re-read file written by other processes ──► same fan-out per changed key
//! ```
//!
//! Subscribers are invoked after the store lock is released, so a listener
//! may read or write the store without deadlocking.

mod file;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use file::{FileStamp, StoreFile};

/// Change listener: `(key, old, new)`. `None` means absent or null.
pub type Listener = dyn Fn(&str, Option<&Value>, Option<&Value>) + Send + Sync;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on store file `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("store file `{0}` is not a JSON object")]
    Corrupt(PathBuf, #[source] serde_json::Error),

    #[error("value for `{0}` is not serializable")]
    Encode(String, #[source] serde_json::Error),
}

struct Registered {
    id: u64,
    key: String,
    listener: Arc<Listener>,
}

struct Inner {
    values: BTreeMap<String, Value>,
    listeners: Vec<Registered>,
    next_id: u64,
    file: Option<StoreFile>,
}

/// Handle returned by [`SharedStore::subscribe`].
///
/// Listeners stay attached until detached explicitly; dropping the handle
/// does not unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Detach the listener. Returns false if the store is gone or the
    /// listener was already removed.
    pub fn detach(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut inner = inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|l| l.id != self.id);
        inner.listeners.len() != before
    }
}

/// Cloneable handle to one shared store. Every clone sees the same values.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SharedStore")
            .field("keys", &inner.values.len())
            .field("listeners", &inner.listeners.len())
            .field("file", &inner.file.as_ref().map(|f| f.path().to_path_buf()))
            .finish()
    }
}

/// A change waiting to be delivered once the lock is dropped.
struct Delivery {
    key: String,
    old: Option<Value>,
    new: Option<Value>,
    listeners: Vec<Arc<Listener>>,
}

impl Delivery {
    fn run(self) {
        for listener in &self.listeners {
            listener(&self.key, self.old.as_ref(), self.new.as_ref());
        }
    }
}

impl SharedStore {
    /// Process-local store. Tabs in the same process share it by cloning.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::from_parts(BTreeMap::new(), None)
    }

    /// File-backed store shared by every process that opens the same path.
    ///
    /// A missing file is an empty store; it is created on the first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = StoreFile::new(path.as_ref());
        let (values, stamp) = file.load()?;
        Ok(Self::from_parts(values, Some(file.with_stamp(stamp))))
    }

    fn from_parts(values: BTreeMap<String, Value>, file: Option<StoreFile>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                values,
                listeners: Vec::new(),
                next_id: 0,
                file,
            })),
        }
    }

    /// Backing file, if any.
    #[cfg(test)]
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().file.as_ref().map(|f| f.path().to_path_buf())
    }

    /// Last written value. `null` reads as absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .values
            .get(key)
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// Last written value or `default`.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Typed read. Values that fail to decode read as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                crate::debug!("store"; "ignoring undecodable `{}`: {}", key, e);
                None
            }
        }
    }

    /// Write and notify every subscriber of `key`, the writer's included.
    ///
    /// Writes by other processes are merged in first, so only `key` is
    /// overwritten in the backing file. Their changes are delivered even
    /// when this write fails.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let (deliveries, result) = {
            let mut inner = self.inner.lock();
            let mut deliveries = inner.pull_or_keep();
            let old = inner.values.insert(key.to_string(), value.clone());
            let result = inner.persist();
            match &result {
                Ok(()) => deliveries.push(inner.delivery(key, old, Some(value))),
                // Keep memory consistent with what is on disk
                Err(_) => match old {
                    Some(old) => {
                        inner.values.insert(key.to_string(), old);
                    }
                    None => {
                        inner.values.remove(key);
                    }
                },
            }
            (deliveries, result)
        };
        for delivery in deliveries {
            delivery.run();
        }
        result
    }

    /// Serialize and write.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value =
            serde_json::to_value(value).map_err(|e| StoreError::Encode(key.to_string(), e))?;
        self.set(key, value)
    }

    /// Remove a key and notify subscribers with `new = None`.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let (deliveries, result) = {
            let mut inner = self.inner.lock();
            let mut deliveries = inner.pull_or_keep();
            let mut result = Ok(());
            if let Some(old) = inner.values.remove(key) {
                result = inner.persist();
                if result.is_ok() {
                    deliveries.push(inner.delivery(key, Some(old), None));
                } else {
                    inner.values.insert(key.to_string(), old);
                }
            }
            (deliveries, result)
        };
        for delivery in deliveries {
            delivery.run();
        }
        result
    }

    /// Attach a listener for `key`. Listeners fire in subscription order.
    pub fn subscribe<F>(&self, key: &str, listener: F) -> Subscription
    where
        F: Fn(&str, Option<&Value>, Option<&Value>) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(Registered {
            id,
            key: key.to_string(),
            listener: Arc::new(listener),
        });
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Detach a listener (same as [`Subscription::detach`]).
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        subscription.detach()
    }

    /// Pick up writes made by other processes to the backing file.
    ///
    /// Fires listeners for every key whose value differs from the local view.
    /// Returns the number of changed keys. In-memory stores always return 0.
    pub fn refresh(&self) -> Result<usize, StoreError> {
        let deliveries = self.inner.lock().pull()?;

        let changed = deliveries.len();
        if changed > 0 {
            crate::debug!("store"; "refresh picked up {} change(s)", changed);
        }
        for delivery in deliveries {
            delivery.run();
        }
        Ok(changed)
    }
}

impl Inner {
    /// Merge in the backing file if another process changed it.
    fn pull(&mut self) -> Result<Vec<Delivery>, StoreError> {
        let Some(file) = self.file.as_ref() else {
            return Ok(Vec::new());
        };
        let Some((values, stamp)) = file.load_if_changed()? else {
            return Ok(Vec::new());
        };
        if let Some(file) = self.file.as_mut() {
            file.set_stamp(stamp);
        }
        Ok(self.merge(values))
    }

    /// [`pull`](Self::pull) before a write. An unreadable file is
    /// overwritten from the local view.
    fn pull_or_keep(&mut self) -> Vec<Delivery> {
        self.pull().unwrap_or_else(|e| {
            crate::debug!("store"; "writing over unreadable state: {}", e);
            Vec::new()
        })
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let stamp: Option<FileStamp> = file.write(&self.values)?;
        file.set_stamp(stamp);
        Ok(())
    }

    fn delivery(&self, key: &str, old: Option<Value>, new: Option<Value>) -> Delivery {
        Delivery {
            key: key.to_string(),
            old: old.filter(|v| !v.is_null()),
            new: new.filter(|v| !v.is_null()),
            listeners: self.listeners_for(key),
        }
    }

    fn listeners_for(&self, key: &str) -> Vec<Arc<Listener>> {
        self.listeners
            .iter()
            .filter(|l| l.key == key)
            .map(|l| Arc::clone(&l.listener))
            .collect()
    }

    /// Replace the local view with `values`, returning one delivery per
    /// changed key.
    fn merge(&mut self, values: BTreeMap<String, Value>) -> Vec<Delivery> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.extend(values.keys().filter(|k| !self.values.contains_key(*k)).cloned());

        let mut deliveries = Vec::new();
        for key in keys {
            let old = self.values.get(&key).cloned();
            let new = values.get(&key).cloned();
            if old != new {
                deliveries.push(self.delivery(&key, old, new));
            }
        }
        self.values = values;
        deliveries
    }
}

#[cfg(test)]
mod tests;

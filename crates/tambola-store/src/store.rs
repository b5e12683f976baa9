//! Optimistic transactional document store.
//!
//! Documents live in named collections, keyed by string, bodies encoded
//! as JSON values. Every document carries a version; every collection
//! carries a version bumped on any write to it. A transaction records
//! the versions it observed (including "absent", version 0) and
//! validates all of them under one write lock at commit, so committed
//! transactions are serializable: a competing write to any read
//! document — or any write at all to a scanned collection — forces a
//! retry instead of a lost update or a phantom.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::StoreError;

/// Commit attempts before a transaction reports contention.
const MAX_TXN_ATTEMPTS: u32 = 5;
/// Base backoff between contended attempts; jitter of the same size is
/// added so competing transactions desynchronize.
const BACKOFF_BASE: Duration = Duration::from_millis(2);

#[derive(Default)]
struct Collection {
    docs: HashMap<String, VersionedDoc>,
    /// Bumped on every insert, update, or delete in this collection.
    version: u64,
}

#[derive(Clone)]
struct VersionedDoc {
    version: u64,
    body: Value,
}

// ---------------------------------------------------------------------------
// DocStore
// ---------------------------------------------------------------------------

/// The shared document store. Cheap to clone — all clones share state.
#[derive(Clone, Default)]
pub struct DocStore {
    inner: Arc<RwLock<HashMap<String, Collection>>>,
}

impl DocStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a transaction handle against the current state.
    pub fn begin(&self) -> Transaction {
        Transaction {
            store: self.clone(),
            reads: HashMap::new(),
            scans: HashMap::new(),
            writes: Vec::new(),
        }
    }

    /// Runs `body` inside a transaction, committing on success.
    ///
    /// Commit conflicts retry the whole body (bounded, with jittered
    /// backoff). A business error from `body` aborts immediately and is
    /// returned as-is — business rejections are never retried.
    pub async fn in_transaction<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&mut Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut txn = self.begin();
            let value = body(&mut txn)?;
            match txn.commit() {
                Ok(()) => return Ok(value),
                Err(conflict) if attempt < MAX_TXN_ATTEMPTS => {
                    tracing::debug!(
                        attempt,
                        error = %conflict,
                        "transaction conflict, retrying"
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(_) => {
                    return Err(StoreError::Contention {
                        attempts: MAX_TXN_ATTEMPTS,
                    }
                    .into());
                }
            }
        }
        unreachable!("loop returns on final attempt")
    }

    /// Reads one document outside any transaction (no version tracking).
    /// For listeners and diagnostics; mutations must go through
    /// [`in_transaction`](Self::in_transaction).
    pub fn peek<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let guard = self.inner.read().expect("store lock poisoned");
        let Some(doc) =
            guard.get(collection).and_then(|c| c.docs.get(key))
        else {
            return Ok(None);
        };
        decode(collection, key, &doc.body).map(Some)
    }

    /// All keys currently present in a collection.
    pub fn keys(&self, collection: &str) -> Vec<String> {
        let guard = self.inner.read().expect("store lock poisoned");
        guard
            .get(collection)
            .map(|c| c.docs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn backoff(attempt: u32) -> Duration {
    let base = BACKOFF_BASE * attempt;
    let jitter = rand::rng().random_range(0..=BACKOFF_BASE.as_micros() as u64);
    base + Duration::from_micros(jitter)
}

fn decode<T: DeserializeOwned>(
    collection: &str,
    key: &str,
    body: &Value,
) -> Result<T, StoreError> {
    serde_json::from_value(body.clone()).map_err(|source| {
        StoreError::Codec {
            collection: collection.to_string(),
            key: key.to_string(),
            source,
        }
    })
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

enum Write {
    Put(Value),
    Delete,
}

/// One read-modify-write unit against the store.
///
/// Reads see a consistent overlay: documents this transaction has
/// already written read back as written. Nothing is visible to other
/// transactions until [`commit`](Transaction::commit) succeeds, and a
/// failed commit applies nothing.
pub struct Transaction {
    store: DocStore,
    /// (collection, key) → document version observed (0 = absent).
    reads: HashMap<(String, String), u64>,
    /// collection → collection version observed by a scan.
    scans: HashMap<String, u64>,
    /// Ordered pending writes; later writes to a key win.
    writes: Vec<(String, String, Write)>,
}

impl Transaction {
    /// Reads a document, recording its version for commit validation.
    pub fn get<T: DeserializeOwned>(
        &mut self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        // Pending writes of this transaction shadow the store.
        if let Some(write) = self.pending(collection, key) {
            return match write {
                Write::Put(body) => {
                    decode(collection, key, body).map(Some)
                }
                Write::Delete => Ok(None),
            };
        }

        let guard =
            self.store.inner.read().expect("store lock poisoned");
        let doc = guard.get(collection).and_then(|c| c.docs.get(key));
        let version = doc.map(|d| d.version).unwrap_or(0);
        let body = doc.map(|d| d.body.clone());
        drop(guard);

        self.reads
            .entry((collection.to_string(), key.to_string()))
            .or_insert(version);

        match body {
            Some(body) => decode(collection, key, &body).map(Some),
            None => Ok(None),
        }
    }

    /// Returns `true` if the key exists, recording the observation.
    pub fn exists(
        &mut self,
        collection: &str,
        key: &str,
    ) -> bool {
        if let Some(write) = self.pending(collection, key) {
            return matches!(write, Write::Put(_));
        }
        let guard =
            self.store.inner.read().expect("store lock poisoned");
        let version = guard
            .get(collection)
            .and_then(|c| c.docs.get(key))
            .map(|d| d.version)
            .unwrap_or(0);
        drop(guard);
        self.reads
            .entry((collection.to_string(), key.to_string()))
            .or_insert(version);
        version != 0
    }

    /// Scans a whole collection, recording its version so any
    /// concurrent insert/update/delete in it invalidates the commit.
    /// Pending writes of this transaction are reflected in the result.
    pub fn scan<T: DeserializeOwned>(
        &mut self,
        collection: &str,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let guard =
            self.store.inner.read().expect("store lock poisoned");
        let (version, mut bodies) = match guard.get(collection) {
            Some(c) => (
                c.version,
                c.docs
                    .iter()
                    .map(|(k, d)| (k.clone(), d.body.clone()))
                    .collect::<HashMap<_, _>>(),
            ),
            None => (0, HashMap::new()),
        };
        drop(guard);

        self.scans
            .entry(collection.to_string())
            .or_insert(version);

        for (coll, key, write) in &self.writes {
            if coll != collection {
                continue;
            }
            match write {
                Write::Put(body) => {
                    bodies.insert(key.clone(), body.clone());
                }
                Write::Delete => {
                    bodies.remove(key);
                }
            }
        }

        let mut out = Vec::with_capacity(bodies.len());
        for (key, body) in bodies {
            let value = decode(collection, &key, &body)?;
            out.push((key, value));
        }
        Ok(out)
    }

    /// Stages a write. Visible to this transaction's later reads.
    pub fn put<T: Serialize>(
        &mut self,
        collection: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_value(value).map_err(|source| {
            StoreError::Codec {
                collection: collection.to_string(),
                key: key.to_string(),
                source,
            }
        })?;
        self.writes.push((
            collection.to_string(),
            key.to_string(),
            Write::Put(body),
        ));
        Ok(())
    }

    /// Stages a deletion.
    pub fn delete(&mut self, collection: &str, key: &str) {
        self.writes.push((
            collection.to_string(),
            key.to_string(),
            Write::Delete,
        ));
    }

    /// The last pending write for a key, if any.
    fn pending(&self, collection: &str, key: &str) -> Option<&Write> {
        self.writes
            .iter()
            .rev()
            .find(|(c, k, _)| c == collection && k == key)
            .map(|(_, _, w)| w)
    }

    /// Validates every observed version and applies all writes, or
    /// applies nothing.
    pub(crate) fn commit(self) -> Result<(), StoreError> {
        let mut guard =
            self.store.inner.write().expect("store lock poisoned");

        for ((collection, key), observed) in &self.reads {
            let current = guard
                .get(collection)
                .and_then(|c| c.docs.get(key))
                .map(|d| d.version)
                .unwrap_or(0);
            if current != *observed {
                return Err(StoreError::Conflict {
                    collection: collection.clone(),
                    key: key.clone(),
                });
            }
        }
        for (collection, observed) in &self.scans {
            let current =
                guard.get(collection).map(|c| c.version).unwrap_or(0);
            if current != *observed {
                return Err(StoreError::Conflict {
                    collection: collection.clone(),
                    key: "<scan>".to_string(),
                });
            }
        }

        for (collection, key, write) in self.writes {
            let coll = guard.entry(collection).or_default();
            coll.version += 1;
            match write {
                Write::Put(body) => {
                    let next_version = coll
                        .docs
                        .get(&key)
                        .map(|d| d.version + 1)
                        .unwrap_or(1);
                    coll.docs.insert(
                        key,
                        VersionedDoc {
                            version: next_version,
                            body,
                        },
                    );
                }
                Write::Delete => {
                    coll.docs.remove(&key);
                }
            }
        }
        Ok(())
    }
}

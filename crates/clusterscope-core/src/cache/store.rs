use std::collections::{BTreeMap, HashSet};

use jiff::Timestamp;
use kube::runtime::watcher::Event;
use kube::{Resource, ResourceExt};
use parking_lot::RwLock;

/// Canonical identity of a cached object. Cluster-scoped objects use an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self { namespace: obj.namespace().unwrap_or_default(), name: obj.name_any() }
    }
}

#[derive(Debug, Clone)]
pub struct Record<K> {
    pub uid: Option<String>,
    pub observed_at: Timestamp,
    pub object: K,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    /// Same name, different UID: the object was recreated upstream.
    Replaced,
    Removed,
    Unchanged,
}

struct Inner<K> {
    records: BTreeMap<ObjectKey, Record<K>>,
    // insertion sequence -> key, oldest first; drives cap eviction
    order: BTreeMap<u64, ObjectKey>,
    next_seq: u64,
    relist: Option<HashSet<ObjectKey>>,
    // set once the watch finished its first list; seeding stops from then on
    synced: bool,
}

/// Informer-style store for one resource kind.
///
/// Keyed by `(namespace, name)` so iteration is already in listing order.
/// Handlers hold the write lock only for the map update; reads clone out.
pub struct ResourceStore<K> {
    inner: RwLock<Inner<K>>,
    cap: Option<usize>,
}

impl<K> Default for ResourceStore<K>
where
    K: Resource + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ResourceStore<K>
where
    K: Resource + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner { records: BTreeMap::new(), order: BTreeMap::new(), next_seq: 0, relist: None, synced: false }),
            cap: None,
        }
    }

    /// A store that drops its oldest records once it holds more than `cap`.
    pub fn bounded(cap: usize) -> Self {
        Self { cap: Some(cap.max(1)), ..Self::new() }
    }

    pub fn apply_event(&self, event: Event<K>) -> ApplyOutcome {
        let mut inner = self.inner.write();
        match event {
            Event::Apply(obj) => inner.upsert(obj, self.cap),
            Event::Delete(obj) => inner.remove(&ObjectKey::of(&obj)),
            Event::Init => {
                inner.relist = Some(HashSet::new());
                ApplyOutcome::Unchanged
            }
            Event::InitApply(obj) => {
                let key = ObjectKey::of(&obj);
                if let Some(seen) = inner.relist.as_mut() {
                    seen.insert(key);
                }
                inner.upsert(obj, self.cap)
            }
            Event::InitDone => {
                if let Some(seen) = inner.relist.take() {
                    let stale: Vec<ObjectKey> = inner.records.keys().filter(|k| !seen.contains(*k)).cloned().collect();
                    for key in stale {
                        inner.remove(&key);
                    }
                }
                inner.synced = true;
                ApplyOutcome::Unchanged
            }
        }
    }

    pub fn apply(&self, obj: K) -> ApplyOutcome {
        self.apply_event(Event::Apply(obj))
    }

    pub fn delete(&self, obj: &K) -> ApplyOutcome {
        self.inner.write().remove(&ObjectKey::of(obj))
    }

    /// Bulk insert from a one-off list. Keys the watch already delivered are left alone; never prunes.
    /// A no-op once the watch has synced, since the list may predate later deletes.
    pub fn seed(&self, objects: impl IntoIterator<Item = K>) -> usize {
        let mut inner = self.inner.write();
        if inner.synced {
            return 0;
        }
        let mut inserted = 0;
        for obj in objects {
            if !inner.records.contains_key(&ObjectKey::of(&obj)) {
                inner.upsert(obj, self.cap);
                inserted += 1;
            }
        }
        inserted
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.inner.read().records.get(&ObjectKey::new(namespace, name)).map(|r| r.object.clone())
    }

    pub fn record(&self, namespace: &str, name: &str) -> Option<Record<K>> {
        self.inner.read().records.get(&ObjectKey::new(namespace, name)).cloned()
    }

    /// Objects in the given namespaces ordered by `(namespace, name)`. An empty slice means all namespaces.
    pub fn list(&self, namespaces: &[String]) -> Vec<K> {
        let inner = self.inner.read();
        if namespaces.is_empty() {
            return inner.records.values().map(|r| r.object.clone()).collect();
        }

        let mut wanted: Vec<&str> = namespaces.iter().map(String::as_str).collect();
        wanted.sort_unstable();
        wanted.dedup();

        let mut out = Vec::new();
        for ns in wanted {
            let start = ObjectKey::new(ns, "");
            out.extend(
                inner.records.range(start..).take_while(|(k, _)| k.namespace == ns).map(|(_, r)| r.object.clone()),
            );
        }
        out
    }

    pub fn list_all(&self) -> Vec<K> {
        self.list(&[])
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Inner<K>
where
    K: Resource + Clone,
{
    fn upsert(&mut self, obj: K, cap: Option<usize>) -> ApplyOutcome {
        let key = ObjectKey::of(&obj);
        let uid = obj.uid();
        let now = Timestamp::now();

        let outcome = match self.records.get_mut(&key) {
            Some(existing) if existing.uid == uid => {
                let version = obj.resource_version();
                if version.is_some() && existing.object.resource_version() == version {
                    return ApplyOutcome::Unchanged;
                }
                existing.object = obj;
                existing.observed_at = now;
                return ApplyOutcome::Updated;
            }
            Some(_) => {
                self.remove(&key);
                ApplyOutcome::Replaced
            }
            None => ApplyOutcome::Inserted,
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.records.insert(key, Record { uid, observed_at: now, object: obj, seq });

        if let Some(cap) = cap {
            while self.records.len() > cap {
                let Some((_, oldest)) = self.order.pop_first() else { break };
                self.records.remove(&oldest);
            }
        }

        outcome
    }

    fn remove(&mut self, key: &ObjectKey) -> ApplyOutcome {
        match self.records.remove(key) {
            Some(record) => {
                self.order.remove(&record.seq);
                ApplyOutcome::Removed
            }
            None => ApplyOutcome::Unchanged,
        }
    }
}

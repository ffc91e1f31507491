//! Document persistence
//!
//! Backends implement a small key-document contract:
//! - Local: JSON file in the data directory
//! - Memory: in-memory store with an availability switch for testing
//!
//! [`PersistenceGateway`] fronts a backend with a local document cache and a
//! FIFO outbox. Writes land in the cache immediately and are delivered to the
//! backend in the order they were issued; a write the backend refuses stays at
//! the head of the outbox until the next flush.
//!
//! The cache only knows what this process has seen. An offline query is
//! answered from it only when the same query already ran against the backend,
//! and [`PersistenceGateway::create`] queues writes that must never replace a
//! document the cache has not seen.

use crate::config::Environment;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// A stored document: always a JSON object
pub type Document = Map<String, Value>;

/// Location of a document: collection path plus document id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached right now
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The backend failed to read or write
    #[error("storage error: {0}")]
    Storage(String),
    #[error("document encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Connectivity faults are retried; everything else is a real failure
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Encode a value as a document
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Storage(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Decode a document into a value
pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Shallow merge: top-level fields of `patch` overwrite those of `target`
pub fn merge_into(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== Queries ====================

/// Identity of a query's result set, ignoring order and limit
fn query_key(query: &Query) -> String {
    let filters: Vec<String> = query
        .filters
        .iter()
        .map(|(field, value)| format!("{}={}", field, value))
        .collect();
    format!("{}?{}", query.collection, filters.join("&"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters, an optional sort field and a limit over one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }

    /// Filter, sort (stable, so ties keep input order) and truncate
    pub fn apply(&self, docs: Vec<(String, Document)>) -> Vec<(String, Document)> {
        let mut docs: Vec<_> = docs.into_iter().filter(|(_, d)| self.matches(d)).collect();

        if let Some((field, direction)) = &self.order_by {
            docs.sort_by(|(_, a), (_, b)| {
                let ord = compare_values(a.get(field), b.get(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&y.as_f64().unwrap_or(0.0)),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

// ==================== Backends ====================

/// Trait for document store backends
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Write a document; `merge` keeps fields absent from `doc`
    fn set(&self, path: &DocPath, doc: Document, merge: bool) -> StoreResult<()>;

    /// Matching documents with their ids
    fn query(&self, query: &Query) -> StoreResult<Vec<(String, Document)>>;

    /// Check if backend is available/connected
    fn is_available(&self) -> bool;

    /// Get backend name for display
    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collections {
    collections: BTreeMap<String, Vec<StoredDocument>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    id: String,
    data: Document,
}

impl Collections {
    fn get(&self, path: &DocPath) -> Option<Document> {
        self.collections
            .get(&path.collection)?
            .iter()
            .find(|d| d.id == path.id)
            .map(|d| d.data.clone())
    }

    /// Upsert in place so documents keep their insertion position
    fn set(&mut self, path: &DocPath, doc: Document, merge: bool) {
        let docs = self.collections.entry(path.collection.clone()).or_default();
        match docs.iter_mut().find(|d| d.id == path.id) {
            Some(existing) if merge => merge_into(&mut existing.data, doc),
            Some(existing) => existing.data = doc,
            None => docs.push(StoredDocument {
                id: path.id.clone(),
                data: doc,
            }),
        }
    }

    fn query(&self, query: &Query) -> Vec<(String, Document)> {
        let docs: Vec<(String, Document)> = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|d| (d.id.clone(), d.data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        query.apply(docs)
    }

    fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }
}

/// Local file-based store
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<Option<Collections>>,
}

impl FileStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("noirnote_store.json"),
            cache: Mutex::new(None),
        }
    }

    fn load(&self) -> StoreResult<Collections> {
        let mut cache = lock(&self.cache);
        if let Some(ref data) = *cache {
            return Ok(data.clone());
        }

        let data = match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections::default(),
            Err(e) => return Err(StoreError::Storage(e.to_string())),
        };

        *cache = Some(data.clone());
        Ok(data)
    }

    fn save(&self, data: &Collections) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(data)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        std::fs::write(&self.path, json).map_err(|e| StoreError::Storage(e.to_string()))?;

        *lock(&self.cache) = Some(data.clone());
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        Ok(self.load()?.get(path))
    }

    fn set(&self, path: &DocPath, doc: Document, merge: bool) -> StoreResult<()> {
        let mut data = self.load()?;
        data.set(path, doc, merge);
        self.save(&data)
    }

    fn query(&self, query: &Query) -> StoreResult<Vec<(String, Document)>> {
        Ok(self.load()?.query(query))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "Local"
    }
}

/// In-memory store for testing
pub struct MemoryStore {
    data: Mutex<Collections>,
    available: AtomicBool,
    /// Paths in the order writes were applied
    write_log: Mutex<Vec<DocPath>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Collections::default()),
            available: AtomicBool::new(true),
            write_log: Mutex::new(Vec::new()),
        }
    }

    /// Set whether the backend should report as available
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Documents stored in a collection
    pub fn count(&self, collection: &str) -> usize {
        lock(&self.data).count(collection)
    }

    pub fn write_log(&self) -> Vec<DocPath> {
        lock(&self.write_log).clone()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".into()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        self.check_available()?;
        Ok(lock(&self.data).get(path))
    }

    fn set(&self, path: &DocPath, doc: Document, merge: bool) -> StoreResult<()> {
        self.check_available()?;
        lock(&self.data).set(path, doc, merge);
        lock(&self.write_log).push(path.clone());
        Ok(())
    }

    fn query(&self, query: &Query) -> StoreResult<Vec<(String, Document)>> {
        self.check_available()?;
        Ok(lock(&self.data).query(query))
    }

    fn is_available(&self) -> bool {
        self.available.load(AtomicOrdering::SeqCst)
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }
}

/// Create the appropriate backend based on environment
pub fn create_backend(env: Environment, data_dir: &Path) -> Arc<dyn DocumentStore> {
    match env {
        Environment::Local => Arc::new(FileStore::new(data_dir)),
        Environment::Test => Arc::new(MemoryStore::new()),
    }
}

// ==================== Gateway ====================

/// Result of looking a document up in the local cache only
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Document),
    /// Known not to exist
    Absent,
    /// Never seen locally
    Miss,
}

/// A write that has not reached the backend yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub seq: u64,
    pub path: DocPath,
    pub doc: Document,
    pub merge: bool,
    /// Dropped on delivery if the document already exists in the backend
    pub if_absent: bool,
}

/// Acknowledgement of a locally applied write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    pub seq: u64,
    /// Whether the backend accepted it during this call
    pub delivered: bool,
}

#[derive(Debug)]
struct CacheEntry {
    doc: Option<Document>,
    /// First time this path was seen locally
    order: u64,
}

#[derive(Debug, Default)]
struct GatewayState {
    cache: HashMap<DocPath, CacheEntry>,
    outbox: VecDeque<PendingWrite>,
    network_disabled: bool,
    /// Unlimited queries answered by the backend in this process
    synced_queries: HashSet<String>,
    next_order: u64,
    next_seq: u64,
}

impl GatewayState {
    fn cache_put(&mut self, path: &DocPath, doc: Option<Document>) {
        match self.cache.get_mut(path) {
            Some(entry) => entry.doc = doc,
            None => {
                self.next_order += 1;
                let order = self.next_order;
                self.cache.insert(path.clone(), CacheEntry { doc, order });
            }
        }
    }

    fn apply_local(&mut self, path: &DocPath, doc: Document, merge: bool) {
        let merged = match self.cache.get(path).and_then(|e| e.doc.clone()) {
            Some(mut existing) if merge => {
                merge_into(&mut existing, doc);
                existing
            }
            _ => doc,
        };
        self.cache_put(path, Some(merged));
    }

    fn has_pending(&self, path: &DocPath) -> bool {
        self.outbox.iter().any(|w| &w.path == path)
    }

    fn enqueue(&mut self, path: &DocPath, doc: Document, merge: bool, if_absent: bool) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.outbox.push_back(PendingWrite {
            seq,
            path: path.clone(),
            doc,
            merge,
            if_absent,
        });
        seq
    }

    /// Drop `seq` and every later write to the same path; the backend copy wins
    fn discard_from(&mut self, seq: u64, path: &DocPath, existing: Document) -> usize {
        let before = self.outbox.len();
        self.outbox.retain(|w| !(w.seq >= seq && &w.path == path));
        self.cache_put(path, Some(existing));
        before - self.outbox.len()
    }

    fn lookup(&self, path: &DocPath) -> CacheLookup {
        match self.cache.get(path) {
            Some(CacheEntry { doc: Some(doc), .. }) => CacheLookup::Hit(doc.clone()),
            Some(CacheEntry { doc: None, .. }) => CacheLookup::Absent,
            None => CacheLookup::Miss,
        }
    }

    fn cached_collection(&self, collection: &str) -> Vec<(String, Document)> {
        let mut docs: Vec<_> = self
            .cache
            .iter()
            .filter(|(path, _)| path.collection == collection)
            .filter_map(|(path, entry)| {
                entry
                    .doc
                    .clone()
                    .map(|doc| (entry.order, path.id.clone(), doc))
            })
            .collect();
        docs.sort_by_key(|(order, _, _)| *order);
        docs.into_iter().map(|(_, id, doc)| (id, doc)).collect()
    }
}

/// Cache plus ordered write queue in front of a document store
pub struct PersistenceGateway {
    backend: Arc<dyn DocumentStore>,
    state: Mutex<GatewayState>,
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("backend", &self.backend.backend_name())
            .field("pending", &self.pending_writes())
            .finish()
    }
}

impl PersistenceGateway {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend,
            state: Mutex::new(GatewayState::default()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Enable or disable network access; re-enabling flushes the outbox
    pub fn set_network_enabled(&self, enabled: bool) {
        lock(&self.state).network_disabled = !enabled;
        if enabled {
            let delivered = self.flush();
            log::info!("[store] network enabled, delivered {} queued writes", delivered);
        } else {
            log::info!("[store] network disabled, writes will be queued");
        }
    }

    pub fn network_enabled(&self) -> bool {
        !lock(&self.state).network_disabled
    }

    pub fn is_online(&self) -> bool {
        self.network_enabled() && self.backend.is_available()
    }

    pub fn pending_writes(&self) -> usize {
        lock(&self.state).outbox.len()
    }

    /// Drop every queued write. Only used when the player's data is deleted.
    pub fn discard_pending(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.outbox.len();
        state.outbox.clear();
        dropped
    }

    pub fn get_from_local_cache(&self, path: &DocPath) -> CacheLookup {
        lock(&self.state).lookup(path)
    }

    /// Read a document from the backend, falling back to the local cache.
    ///
    /// Paths with queued writes are always answered locally. Fails with
    /// `Unavailable` only when the backend is unreachable and the document
    /// was never seen locally.
    pub fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let pending = lock(&self.state).has_pending(path);
        if self.is_online() && !pending {
            match self.backend.get(path) {
                Ok(doc) => {
                    lock(&self.state).cache_put(path, doc.clone());
                    return Ok(doc);
                }
                Err(e) => log::warn!("[store] read of {} failed, using cache: {}", path, e),
            }
        }

        match self.get_from_local_cache(path) {
            CacheLookup::Hit(doc) => Ok(Some(doc)),
            CacheLookup::Absent => Ok(None),
            CacheLookup::Miss => Err(StoreError::Unavailable(format!(
                "{} is not cached and the store is unreachable",
                path
            ))),
        }
    }

    /// Whether writes to `path` are still waiting in the outbox
    pub fn has_pending(&self, path: &DocPath) -> bool {
        lock(&self.state).has_pending(path)
    }

    /// Apply a write locally, queue it, and try to deliver the queue
    pub fn set(&self, path: &DocPath, doc: Document, merge: bool) -> WriteAck {
        let seq = {
            let mut state = lock(&self.state);
            state.apply_local(path, doc.clone(), merge);
            state.enqueue(path, doc, merge, false)
        };
        self.settle(seq, path)
    }

    /// Create a document unless the backend already holds one at `path`.
    ///
    /// The check happens at delivery. When the backend copy exists, this
    /// write and every later queued write to the same path are dropped and
    /// the cache takes the backend copy.
    pub fn create(&self, path: &DocPath, doc: Document) -> WriteAck {
        let seq = {
            let mut state = lock(&self.state);
            if !matches!(state.lookup(path), CacheLookup::Hit(_)) {
                state.cache_put(path, Some(doc.clone()));
            }
            state.enqueue(path, doc, false, true)
        };
        self.settle(seq, path)
    }

    fn settle(&self, seq: u64, path: &DocPath) -> WriteAck {
        self.flush();

        let delivered = !lock(&self.state).outbox.iter().any(|w| w.seq == seq);
        if !delivered {
            log::debug!("[store] write #{} to {} queued", seq, path);
        }
        WriteAck { seq, delivered }
    }

    /// Deliver queued writes in order until the queue is empty or one fails.
    ///
    /// Returns the number of writes delivered.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        while self.is_online() {
            let Some(write) = lock(&self.state).outbox.front().cloned() else {
                break;
            };

            if write.if_absent {
                match self.backend.get(&write.path) {
                    Ok(Some(existing)) => {
                        let dropped = lock(&self.state).discard_from(write.seq, &write.path, existing);
                        delivered += 1;
                        log::info!(
                            "[store] {} already exists, dropped {} queued writes from #{}",
                            write.path,
                            dropped,
                            write.seq
                        );
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::info!("[store] cannot check {} before create: {}", write.path, e);
                        break;
                    }
                }
            }

            match self.backend.set(&write.path, write.doc, write.merge) {
                Ok(()) => {
                    let mut state = lock(&self.state);
                    if state.outbox.front().map(|w| w.seq) == Some(write.seq) {
                        state.outbox.pop_front();
                    }
                    delivered += 1;
                    log::debug!("[store] delivered write #{} to {}", write.seq, write.path);
                }
                Err(e) => {
                    if e.is_transient() {
                        log::info!("[store] write #{} to {} waiting for connectivity", write.seq, write.path);
                    } else {
                        log::warn!("[store] write #{} to {} failed, will retry: {}", write.seq, write.path, e);
                    }
                    break;
                }
            }
        }
        delivered
    }

    /// Run a query against the backend, falling back to cached documents.
    ///
    /// Online results are overlaid with queued local writes so the caller
    /// always sees its own writes. The cache fallback is only used for a
    /// query that already ran unlimited against the backend; otherwise the
    /// cache may hold a fraction of the result and the query fails with
    /// `Unavailable`.
    pub fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let remote = if self.is_online() {
            match self.backend.query(query) {
                Ok(docs) => Some(docs),
                Err(e) => {
                    log::warn!("[store] query on {} failed, using cache: {}", query.collection, e);
                    None
                }
            }
        } else {
            None
        };

        let key = query_key(query);
        let mut state = lock(&self.state);
        let docs = match remote {
            Some(mut docs) => {
                if query.limit.is_none() {
                    state.synced_queries.insert(key);
                }
                for (id, doc) in &docs {
                    let path = DocPath::new(query.collection.clone(), id.clone());
                    if !state.has_pending(&path) {
                        state.cache_put(&path, Some(doc.clone()));
                    }
                }

                let pending: Vec<DocPath> = state
                    .outbox
                    .iter()
                    .filter(|w| w.path.collection == query.collection)
                    .map(|w| w.path.clone())
                    .collect();
                for path in pending {
                    docs.retain(|(id, _)| *id != path.id);
                    if let CacheLookup::Hit(doc) = state.lookup(&path) {
                        docs.push((path.id.clone(), doc));
                    }
                }
                docs
            }
            None if state.synced_queries.contains(&key) => state.cached_collection(&query.collection),
            None => {
                return Err(StoreError::Unavailable(format!(
                    "{} has not been fetched and the store is unreachable",
                    key
                )))
            }
        };

        Ok(query.apply(docs).into_iter().map(|(_, doc)| doc).collect())
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: &DocPath) -> StoreResult<Option<T>> {
        self.get(path)?.map(from_document).transpose()
    }

    pub fn set_from<T: Serialize>(&self, path: &DocPath, value: &T, merge: bool) -> StoreResult<WriteAck> {
        Ok(self.set(path, to_document(value)?, merge))
    }

    pub fn create_from<T: Serialize>(&self, path: &DocPath, value: &T) -> StoreResult<WriteAck> {
        Ok(self.create(path, to_document(value)?))
    }

    /// Query and decode, skipping documents that do not decode
    pub fn query_as<T: DeserializeOwned>(&self, query: &Query) -> StoreResult<Vec<T>> {
        Ok(self
            .query(query)?
            .into_iter()
            .filter_map(|doc| match from_document(doc) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("[store] skipping undecodable document in {}: {}", query.collection, e);
                    None
                }
            })
            .collect())
    }
}

//! Bounded TTL cache of full per-document chunk sequences.
//!
//! Auto-merge needs the complete ordered chunk list of every document it
//! expands. Fetching that list means scrolling the index, so sequences are
//! cached under an LRU policy with a per-entry TTL. Concurrent misses for
//! the same document coalesce into a single fetch. Failed fetches are
//! never cached (no negative caching), and a fetch abandoned mid-flight
//! is simply not inserted.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::ChunkPayload;
use crate::error::IndexError;
use crate::index::{MetadataFilter, VectorIndex};

/// One chunk of a document, as fetched from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct DocChunk {
    /// Index point id of the chunk.
    pub id: String,
    /// Chunk payload.
    pub payload: ChunkPayload,
}

/// Complete chunk sequence of one document, ascending by `chunk_index`.
///
/// Shared immutably: the cache owns the allocation, readers hold cheap
/// clones of the `Arc`.
pub type DocChunkSequence = Arc<[DocChunk]>;

struct CachedEntry {
    chunks: DocChunkSequence,
    created_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Hit/miss counters for operator introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required an index fetch.
    pub misses: u64,
}

/// Bounded TTL cache of [`DocChunkSequence`]s keyed by `doc_id`.
pub struct ChunkCache {
    index: Arc<dyn VectorIndex>,
    collection: String,
    scroll_batch_size: u32,
    scroll_timeout: Duration,
    ttl: Duration,
    entries: Mutex<LruCache<String, CachedEntry>>,
    inflight: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    /// Creates a cache over the shared index client.
    ///
    /// `maxsize` of zero is clamped to one entry.
    #[must_use]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        maxsize: usize,
        ttl: Duration,
        scroll_batch_size: u32,
        scroll_timeout: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(maxsize).unwrap_or(NonZeroUsize::MIN);
        Self {
            index,
            collection: collection.into(),
            scroll_batch_size,
            scroll_timeout,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the full ordered chunk sequence for `doc_id`.
    ///
    /// On a miss the document is scrolled from the index, sorted by
    /// `chunk_index` and installed. A scroll failure yields an empty
    /// sequence and leaves the cache untouched, so the next request
    /// retries the fetch.
    pub async fn get(&self, doc_id: &str) -> DocChunkSequence {
        if doc_id.is_empty() {
            return Arc::from(Vec::new());
        }

        if let Some(chunks) = self.lookup(doc_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return chunks;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Coalesce concurrent misses for the same document.
        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(doc_id.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = gate.lock().await;

        // A coalesced peer may have installed the entry while we waited.
        if let Some(chunks) = self.lookup(doc_id) {
            self.drop_gate(doc_id).await;
            return chunks;
        }

        // Install before releasing the gate so coalesced peers see the entry.
        let chunks = match self.fetch(doc_id).await {
            Ok(chunks) => {
                self.entries.lock().put(
                    doc_id.to_string(),
                    CachedEntry {
                        chunks: Arc::clone(&chunks),
                        created_at: Instant::now(),
                    },
                );
                chunks
            }
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "failed to scroll document chunks");
                Arc::from(Vec::new())
            }
        };
        self.drop_gate(doc_id).await;
        chunks
    }

    /// Drops every cached sequence. Operator/test hook.
    pub fn clear(&self) {
        self.entries.lock().clear();
        debug!("document chunk cache cleared");
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next lookup).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Hit/miss counters since process start.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, doc_id: &str) -> Option<DocChunkSequence> {
        let mut entries = self.entries.lock();
        match entries.get(doc_id) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(Arc::clone(&entry.chunks)),
            Some(_) => {
                entries.pop(doc_id);
                None
            }
            None => None,
        }
    }

    async fn drop_gate(&self, doc_id: &str) {
        let mut inflight = self.inflight.lock().await;
        inflight.remove(doc_id);
    }

    async fn fetch(&self, doc_id: &str) -> Result<DocChunkSequence, IndexError> {
        let filter = MetadataFilter::doc_id(doc_id);
        let mut collected: Vec<DocChunk> = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = match tokio::time::timeout(
                self.scroll_timeout,
                self.index
                    .scroll(&self.collection, &filter, self.scroll_batch_size, offset),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(IndexError::Timeout {
                        operation: "scroll",
                        seconds: self.scroll_timeout.as_secs(),
                    });
                }
            };

            if page.hits.is_empty() {
                break;
            }
            collected.extend(page.hits.into_iter().map(|hit| DocChunk {
                id: hit.id,
                payload: ChunkPayload::from_index_map(hit.payload),
            }));
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        collected.sort_by_key(|chunk| chunk.payload.chunk_index.unwrap_or(0));
        debug!(doc_id = %doc_id, chunks = collected.len(), "document chunk sequence fetched");
        Ok(Arc::from(collected))
    }
}

//! Bounded cache of rasterized pages with asynchronous fill.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::backend::{Bitmap, BitmapHandle, DocumentHandle, PdfBackend, RenderRequest, Rotation};
use crate::error::RenderError;
use crate::executor::RenderExecutor;

pub const DEFAULT_BUDGET_BYTES: usize = 500 * 1024 * 1024;
pub const DEFAULT_ZOOM_BUCKET_PERCENT: u32 = 25;
/// Abandoned tickets remembered for classifying late completions. Older ones are forgotten and
/// their results, if they ever arrive, count as stale.
const MAX_DROPPED_TICKETS: usize = 256;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub page_index: usize,
    /// Zoom in percent, always a positive multiple of the bucket width.
    pub zoom_bucket: u32,
    pub rotation: Rotation,
}

impl CacheKey {
    pub fn new(page_index: usize, zoom: f32, rotation: Rotation, bucket_percent: u32) -> Self {
        Self {
            page_index,
            zoom_bucket: quantize_zoom(zoom, bucket_percent),
            rotation,
        }
    }

    /// Zoom factor the backend renders at; every zoom in the bucket shares it.
    pub fn render_zoom(&self) -> f32 {
        self.zoom_bucket as f32 / 100.0
    }
}

fn quantize_zoom(zoom: f32, bucket_percent: u32) -> u32 {
    let bucket = bucket_percent.max(1);
    let steps = (zoom * 100.0 / bucket as f32).round();
    if !steps.is_finite() || steps < 1.0 {
        bucket
    } else if steps * bucket as f32 > u32::MAX as f32 {
        u32::MAX - u32::MAX % bucket
    } else {
        steps as u32 * bucket
    }
}

/// What a lookup found.
#[derive(Debug, Clone)]
pub enum Fetch {
    Ready(BitmapHandle),
    /// A render is in flight; the result arrives through the completion queue.
    Pending,
    /// The last render failed; no new attempt is made until [`PageRenderCache::clear_failure`].
    Failed(String),
}

/// A finished render travelling from a worker back to the interactive thread.
#[derive(Debug)]
pub struct RenderCompletion {
    pub key: CacheKey,
    ticket: u64,
    result: Result<Bitmap, RenderError>,
}

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Ready { key: CacheKey, bitmap: BitmapHandle },
    Failed { key: CacheKey, reason: String },
    /// The page was invalidated while the render ran.
    Stale { key: CacheKey },
    /// The key left the required set while the render ran.
    Cancelled { key: CacheKey },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub failures: u64,
    pub stale_dropped: u64,
    pub cancelled_dropped: u64,
    pub oversized_skipped: u64,
}

#[derive(Debug)]
enum Slot {
    Ready { bitmap: BitmapHandle, bytes: usize },
    Failed { reason: String },
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    last_access: u64,
}

#[derive(Debug, Clone, Copy)]
enum Dropped {
    Stale,
    Cancelled,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    in_flight: HashMap<CacheKey, u64>,
    dropped: BTreeMap<u64, Dropped>,
    pinned: HashSet<CacheKey>,
    resident_bytes: usize,
    access_seq: u64,
    next_ticket: u64,
    stats: CacheStats,
}

impl Inner {
    fn touch(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    fn drop_in_flight(&mut self, key: &CacheKey, reason: Dropped) {
        if let Some(ticket) = self.in_flight.remove(key) {
            self.dropped.insert(ticket, reason);
        }
        while self.dropped.len() > MAX_DROPPED_TICKETS {
            self.dropped.pop_first();
        }
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if let Slot::Ready { bytes, .. } = &entry.slot {
            self.resident_bytes -= bytes;
        }
        Some(entry)
    }

    /// Evicts unpinned bitmaps, least recently used first, until at most `target` bytes remain.
    fn evict_down_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.resident_bytes > target {
            let victim = self
                .entries
                .iter()
                .filter(|(key, entry)| {
                    matches!(entry.slot, Slot::Ready { .. }) && !self.pinned.contains(*key)
                })
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| *key);
            let Some(key) = victim else {
                break;
            };
            self.remove_entry(&key);
            debug!(page = key.page_index, zoom = key.zoom_bucket, "evicted cached page");
            evicted += 1;
        }
        self.stats.evictions += evicted as u64;
        evicted
    }
}

/// Page bitmaps of one document, bounded by a byte budget.
///
/// One lock guards the maps; it is never held while the backend renders. Renders run on the
/// executor and report through an unbounded channel whose receiver the owner drains and feeds
/// back into [`PageRenderCache::complete`].
pub struct PageRenderCache {
    inner: Mutex<Inner>,
    budget_bytes: usize,
    bucket_percent: u32,
    backend: Arc<dyn PdfBackend>,
    handle: DocumentHandle,
    executor: Arc<dyn RenderExecutor>,
    completions: UnboundedSender<RenderCompletion>,
}

impl PageRenderCache {
    pub fn new(
        backend: Arc<dyn PdfBackend>,
        handle: DocumentHandle,
        executor: Arc<dyn RenderExecutor>,
        budget_bytes: usize,
        bucket_percent: u32,
    ) -> (Self, UnboundedReceiver<RenderCompletion>) {
        let (completions, receiver) = unbounded_channel();
        let cache = Self {
            inner: Mutex::new(Inner::default()),
            budget_bytes,
            bucket_percent: bucket_percent.max(1),
            backend,
            handle,
            executor,
            completions,
        };
        (cache, receiver)
    }

    pub fn key(&self, page_index: usize, zoom: f32, rotation: Rotation) -> CacheKey {
        CacheKey::new(page_index, zoom, rotation, self.bucket_percent)
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub fn resident_bytes(&self) -> usize {
        self.inner.lock().resident_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.lock().in_flight.contains_key(key)
    }

    /// Returns the resident bitmap for `key`, or starts a render and reports `Pending`.
    pub fn get_or_fetch(&self, key: CacheKey) -> Fetch {
        let ticket = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let now = inner.touch();
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.last_access = now;
                match &entry.slot {
                    Slot::Ready { bitmap, .. } => {
                        let bitmap = Arc::clone(bitmap);
                        inner.stats.hits += 1;
                        return Fetch::Ready(bitmap);
                    }
                    Slot::Failed { reason } => return Fetch::Failed(reason.clone()),
                }
            }
            if inner.in_flight.contains_key(&key) {
                return Fetch::Pending;
            }
            inner.stats.misses += 1;
            inner.next_ticket += 1;
            let ticket = inner.next_ticket;
            inner.in_flight.insert(key, ticket);
            ticket
        };

        debug!(page = key.page_index, zoom = key.zoom_bucket, ticket, "cache miss, rendering");
        let backend = Arc::clone(&self.backend);
        let handle = self.handle;
        let completions = self.completions.clone();
        self.executor.submit(Box::new(move || {
            let request = RenderRequest {
                page_index: key.page_index,
                zoom: key.render_zoom(),
                rotation: key.rotation,
            };
            let result = backend.render_page(handle, request);
            // The receiver is gone once the session closed; nothing left to deliver to.
            let _ = completions.send(RenderCompletion {
                key,
                ticket,
                result,
            });
        }));
        Fetch::Pending
    }

    /// Replaces the pinned set with `keys` and cancels in-flight renders outside it.
    /// Returns how many renders were cancelled.
    pub fn set_required<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = CacheKey>,
    {
        let mut inner = self.inner.lock();
        inner.pinned = keys.into_iter().collect();
        let cancelled: Vec<CacheKey> = inner
            .in_flight
            .keys()
            .filter(|key| !inner.pinned.contains(*key))
            .copied()
            .collect();
        for key in &cancelled {
            inner.drop_in_flight(key, Dropped::Cancelled);
            debug!(page = key.page_index, zoom = key.zoom_bucket, "cancelled render");
        }
        cancelled.len()
    }

    /// Applies a finished render. Results for invalidated or cancelled requests are dropped.
    pub fn complete(&self, completion: RenderCompletion) -> CompletionOutcome {
        let RenderCompletion {
            key,
            ticket,
            result,
        } = completion;
        let mut inner = self.inner.lock();

        if inner.in_flight.get(&key) != Some(&ticket) {
            let reason = inner.dropped.remove(&ticket).unwrap_or(Dropped::Stale);
            return match reason {
                Dropped::Cancelled => {
                    inner.stats.cancelled_dropped += 1;
                    debug!(page = key.page_index, ticket, "dropped cancelled render");
                    CompletionOutcome::Cancelled { key }
                }
                Dropped::Stale => {
                    inner.stats.stale_dropped += 1;
                    debug!(page = key.page_index, ticket, "dropped stale render");
                    CompletionOutcome::Stale { key }
                }
            };
        }
        inner.in_flight.remove(&key);
        let now = inner.touch();

        match result {
            Ok(bitmap) => {
                let bytes = bitmap.byte_size();
                let bitmap: BitmapHandle = Arc::new(bitmap);
                if bytes <= self.budget_bytes {
                    inner.evict_down_to(self.budget_bytes - bytes);
                }
                if inner.resident_bytes + bytes <= self.budget_bytes {
                    inner.resident_bytes += bytes;
                    inner.entries.insert(
                        key,
                        Entry {
                            slot: Slot::Ready {
                                bitmap: Arc::clone(&bitmap),
                                bytes,
                            },
                            last_access: now,
                        },
                    );
                } else {
                    inner.stats.oversized_skipped += 1;
                    warn!(
                        page = key.page_index,
                        bytes,
                        budget = self.budget_bytes,
                        "rendered page does not fit the cache budget"
                    );
                }
                CompletionOutcome::Ready { key, bitmap }
            }
            Err(err) => {
                let reason = err.to_string();
                inner.stats.failures += 1;
                warn!(page = key.page_index, %reason, "page render failed");
                inner.entries.insert(
                    key,
                    Entry {
                        slot: Slot::Failed {
                            reason: reason.clone(),
                        },
                        last_access: now,
                    },
                );
                CompletionOutcome::Failed { key, reason }
            }
        }
    }

    /// Drops every variant of `page_index`, including renders still running.
    pub fn invalidate_page(&self, page_index: usize) -> usize {
        let mut inner = self.inner.lock();
        let doomed: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|key| key.page_index == page_index)
            .copied()
            .collect();
        for key in &doomed {
            inner.remove_entry(key);
        }
        let running: Vec<CacheKey> = inner
            .in_flight
            .keys()
            .filter(|key| key.page_index == page_index)
            .copied()
            .collect();
        for key in &running {
            inner.drop_in_flight(key, Dropped::Stale);
        }
        debug!(page_index, dropped = doomed.len(), running = running.len(), "invalidated page");
        doomed.len()
    }

    /// Evicts unpinned entries until the resident size fits the budget.
    pub fn evict_to_budget(&self) -> usize {
        self.inner.lock().evict_down_to(self.budget_bytes)
    }

    /// Forgets a failed render so the next lookup tries again.
    pub fn clear_failure(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(Entry {
                slot: Slot::Failed { .. },
                ..
            }) => {
                inner.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Drops every entry and abandons running renders.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let running: Vec<CacheKey> = inner.in_flight.keys().copied().collect();
        for key in &running {
            inner.drop_in_flight(key, Dropped::Stale);
        }
        inner.entries.clear();
        inner.pinned.clear();
        inner.dropped.clear();
        inner.resident_bytes = 0;
    }
}

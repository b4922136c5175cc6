//! Two-tier texture cache.
//!
//! Lookups go memory -> persistent store -> remote source. Background loads
//! run on spawned tasks and report back over a channel; the frame loop only
//! ever calls the non-blocking `peek` and `poll_completed`.
//!
//! Tasks go onto the runtime the cache was built in (or the one current at
//! load time). With no runtime at all, background loads are skipped and the
//! view keeps drawing fallbacks.

use std::sync::Arc;
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::texture::store::LocalStore;
use crate::texture::{decode_image, ImageHandle, Namespace};
use crate::transport::TextureSource;

/// How a background load ended
#[derive(Debug, Clone)]
pub enum LoadResult {
    Loaded(ImageHandle),
    /// Definitive absence; never retried
    NotFound,
    /// Transport or decode failure; may be retried later
    Failed,
    /// Task went away before finishing
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// `"namespace:key"`
    pub key: String,
    pub result: LoadResult,
}

/// Reports the outcome of one in-flight key when dropped, whatever path the
/// load took.
struct InFlightGuard {
    key: String,
    tx: mpsc::UnboundedSender<LoadOutcome>,
    result: LoadResult,
}

impl InFlightGuard {
    fn new(key: String, tx: mpsc::UnboundedSender<LoadOutcome>) -> Self {
        Self { key, tx, result: LoadResult::Abandoned }
    }

    fn finish(mut self, result: LoadResult) {
        self.result = result;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let result = std::mem::replace(&mut self.result, LoadResult::Abandoned);
        let _ = self.tx.send(LoadOutcome { key: std::mem::take(&mut self.key), result });
    }
}

pub struct TextureCache {
    memory: AHashMap<String, ImageHandle>,
    in_flight: AHashSet<String>,
    failed: AHashSet<String>,
    source: Arc<dyn TextureSource>,
    store: Arc<dyn LocalStore>,
    batch_size: usize,
    batch_delay: Duration,
    completions_tx: mpsc::UnboundedSender<LoadOutcome>,
    completions_rx: mpsc::UnboundedReceiver<LoadOutcome>,
    /// Pinged after every successful background fetch
    redraw: Arc<Notify>,
    runtime: Option<Handle>,
    tasks: Vec<JoinHandle<()>>,
}

impl TextureCache {
    pub fn new(source: Arc<dyn TextureSource>, store: Arc<dyn LocalStore>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            memory: AHashMap::new(),
            in_flight: AHashSet::new(),
            failed: AHashSet::new(),
            source,
            store,
            batch_size: 8,
            batch_delay: Duration::from_millis(50),
            completions_tx,
            completions_rx,
            redraw: Arc::new(Notify::new()),
            runtime: Handle::try_current().ok(),
            tasks: Vec::new(),
        }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    /// Spawn background loads onto `runtime`.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Signal fired when newly fetched art is waiting in `poll_completed`.
    pub fn redraw_signal(&self) -> Arc<Notify> {
        self.redraw.clone()
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn is_in_flight(&self, namespace: Namespace, key: &str) -> bool {
        self.in_flight.contains(&namespace.cache_key(key))
    }

    pub fn is_failed(&self, namespace: Namespace, key: &str) -> bool {
        self.failed.contains(&namespace.cache_key(key))
    }

    /// Memory-tier lookup only. Never blocks; safe from the frame loop.
    pub fn peek(&self, namespace: Namespace, key: &str) -> Option<ImageHandle> {
        self.memory.get(&namespace.cache_key(key)).cloned()
    }

    /// Resolve a texture through every tier. Failures yield `None` and are
    /// not remembered here.
    pub async fn get(&mut self, namespace: Namespace, key: &str) -> Option<ImageHandle> {
        let cache_key = namespace.cache_key(key);
        if let Some(img) = self.memory.get(&cache_key) {
            return Some(img.clone());
        }

        if let Some(img) = load_stored(self.store.as_ref(), &cache_key) {
            self.memory.insert(cache_key, img.clone());
            return Some(img);
        }

        match fetch_and_persist(self.source.as_ref(), self.store.as_ref(), namespace, key).await {
            Ok(img) => {
                self.memory.insert(cache_key, img.clone());
                Some(img)
            }
            Err(e) => {
                debug!(key = %cache_key, error = %e, "texture unavailable");
                None
            }
        }
    }

    /// Insert already-encoded image bytes (e.g. embedded base64 textures)
    /// without a fetch. The bytes are persisted as well.
    pub fn insert_encoded(&mut self, namespace: Namespace, key: &str, bytes: &[u8]) -> Result<ImageHandle> {
        let img = decode_image(bytes)?;
        let cache_key = namespace.cache_key(key);
        if let Err(e) = self.store.put(&cache_key, bytes) {
            warn!(key = %cache_key, error = %e, "failed to persist texture");
        }
        self.failed.remove(&cache_key);
        self.memory.insert(cache_key, img.clone());
        Ok(img)
    }

    /// Queue background loads for `keys`. Keys already cached, in flight or
    /// permanently failed are skipped. Returns how many were queued.
    pub fn load_background<I, S>(&mut self, namespace: Namespace, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queued: Vec<(String, String)> = Vec::new();
        for key in keys {
            let key = key.as_ref();
            let cache_key = namespace.cache_key(key);
            if self.memory.contains_key(&cache_key)
                || self.in_flight.contains(&cache_key)
                || self.failed.contains(&cache_key)
            {
                continue;
            }
            self.in_flight.insert(cache_key.clone());
            queued.push((cache_key, key.to_string()));
        }

        if queued.is_empty() {
            return 0;
        }

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            warn!(namespace = namespace.as_str(), count = queued.len(), "no async runtime, skipping background texture loads");
            for (cache_key, _) in &queued {
                self.in_flight.remove(cache_key);
            }
            return 0;
        };

        let count = queued.len();
        debug!(namespace = namespace.as_str(), count, "queued background texture loads");

        // Guards are created before spawning so every key reports back even
        // if the task never gets to run.
        let guarded: Vec<(InFlightGuard, String)> = queued
            .into_iter()
            .map(|(cache_key, key)| (InFlightGuard::new(cache_key, self.completions_tx.clone()), key))
            .collect();

        let source = self.source.clone();
        let store = self.store.clone();
        let redraw = self.redraw.clone();
        let batch_size = self.batch_size;
        let batch_delay = self.batch_delay;

        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(runtime.spawn(async move {
            let mut remaining = guarded.into_iter().peekable();
            while remaining.peek().is_some() {
                let batch: Vec<_> = remaining.by_ref().take(batch_size).collect();
                let loads = batch.into_iter().map(|(guard, key)| {
                    let source = source.clone();
                    let store = store.clone();
                    let redraw = redraw.clone();
                    async move {
                        let result = match fetch_or_stored(source.as_ref(), store.as_ref(), namespace, &key).await {
                            Ok(img) => LoadResult::Loaded(img),
                            Err(e) if e.is_permanent() => LoadResult::NotFound,
                            Err(e) => {
                                debug!(key = %key, error = %e, "background texture load failed");
                                LoadResult::Failed
                            }
                        };
                        let loaded = matches!(result, LoadResult::Loaded(_));
                        // completion is queued before the wakeup
                        guard.finish(result);
                        if loaded {
                            redraw.notify_one();
                        }
                    }
                });
                futures::future::join_all(loads).await;

                if remaining.peek().is_some() && !batch_delay.is_zero() {
                    tokio::time::sleep(batch_delay).await;
                }
            }
        }));

        count
    }

    /// Drain finished background loads into the cache. Returns how many new
    /// images became available.
    pub fn poll_completed(&mut self) -> usize {
        let mut loaded = 0;
        while let Ok(outcome) = self.completions_rx.try_recv() {
            self.in_flight.remove(&outcome.key);
            match outcome.result {
                LoadResult::Loaded(img) => {
                    trace!(key = %outcome.key, "texture loaded");
                    self.memory.insert(outcome.key, img);
                    loaded += 1;
                }
                LoadResult::NotFound => {
                    debug!(key = %outcome.key, "texture permanently missing");
                    self.failed.insert(outcome.key);
                }
                LoadResult::Failed | LoadResult::Abandoned => {}
            }
        }
        loaded
    }

    /// Stop background work and drop every cached image.
    pub fn clear(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.memory.clear();
        self.in_flight.clear();
        self.failed.clear();
        while self.completions_rx.try_recv().is_ok() {}
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn load_stored(store: &dyn LocalStore, cache_key: &str) -> Option<ImageHandle> {
    let bytes = store.get(cache_key)?;
    match decode_image(&bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!(key = %cache_key, error = %e, "stored texture is corrupt");
            None
        }
    }
}

async fn fetch_and_persist(
    source: &dyn TextureSource,
    store: &dyn LocalStore,
    namespace: Namespace,
    key: &str,
) -> Result<ImageHandle> {
    let bytes = source.fetch_texture(namespace, key).await?;
    let img = decode_image(&bytes)?;
    let cache_key = namespace.cache_key(key);
    if let Err(e) = store.put(&cache_key, &bytes) {
        warn!(key = %cache_key, error = %e, "failed to persist texture");
    }
    Ok(img)
}

async fn fetch_or_stored(
    source: &dyn TextureSource,
    store: &dyn LocalStore,
    namespace: Namespace,
    key: &str,
) -> Result<ImageHandle> {
    match load_stored(store, &namespace.cache_key(key)) {
        Some(img) => Ok(img),
        None => fetch_and_persist(source, store, namespace, key).await,
    }
}

impl std::fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureCache")
            .field("cached", &self.memory.len())
            .field("in_flight", &self.in_flight.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}

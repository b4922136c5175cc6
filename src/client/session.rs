use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::client::driver::ViewDriver;
use crate::client::events::{OrderEvent, ViewMessage};
use crate::config::ViewConfig;
use crate::error::{Error, Result};
use crate::renderer::{FrameStats, Surface, ViewEngine};
use crate::texture::{DiskStore, LocalStore, TextureCache};
use crate::transport::{StaticTerrainSource, StaticTextureSource, TerrainSource, TextureSource};

/// Builder for view sessions
pub struct ViewBuilder {
    config: ViewConfig,
    terrain: Option<Arc<dyn TerrainSource>>,
    textures: Option<Arc<dyn TextureSource>>,
    store: Option<Arc<dyn LocalStore>>,
    orders: Option<mpsc::UnboundedSender<OrderEvent>>,
    inbox_capacity: usize,
}

impl ViewBuilder {
    pub fn new(config: ViewConfig) -> Self {
        Self {
            config,
            terrain: None,
            textures: None,
            store: None,
            orders: None,
            inbox_capacity: 256,
        }
    }

    pub fn terrain_source(mut self, source: Arc<dyn TerrainSource>) -> Self {
        self.terrain = Some(source);
        self
    }

    pub fn texture_source(mut self, source: Arc<dyn TextureSource>) -> Self {
        self.textures = Some(source);
        self
    }

    /// Persistent texture store. Defaults to a `DiskStore` under the user
    /// cache directory.
    pub fn store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn orders(mut self, orders: mpsc::UnboundedSender<OrderEvent>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }

    /// Engine only, for callers that drive frames themselves.
    pub fn build_engine(&mut self, surface: Box<dyn Surface>) -> ViewEngine {
        let source = self
            .textures
            .clone()
            .unwrap_or_else(|| Arc::new(StaticTextureSource::new()));
        let store = self
            .store
            .clone()
            .unwrap_or_else(|| Arc::new(DiskStore::new(self.config.resolved_store_dir())));
        let textures = TextureCache::new(source, store)
            .with_batching(self.config.texture_batch_size, self.config.texture_batch_delay());
        let engine = ViewEngine::new(self.config.clone(), textures, surface);
        match self.orders.take() {
            Some(orders) => engine.with_orders(orders),
            None => engine,
        }
    }

    /// Start a driver task on the current runtime.
    pub fn spawn(mut self, surface: Box<dyn Surface>) -> ViewHandle {
        let initial_size = surface.size();
        let engine = self.build_engine(surface);
        let terrain = self
            .terrain
            .take()
            .unwrap_or_else(|| Arc::new(StaticTerrainSource::new()));
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        let (resize_tx, resize_rx) = watch::channel(initial_size);
        let driver = ViewDriver::new(engine, terrain, rx).with_resize(resize_rx);
        ViewHandle {
            tx,
            resize: resize_tx,
            task: tokio::spawn(driver.run()),
        }
    }
}

/// Handle to a running view
pub struct ViewHandle {
    tx: mpsc::Sender<ViewMessage>,
    resize: watch::Sender<(u32, u32)>,
    task: JoinHandle<ViewEngine>,
}

impl ViewHandle {
    pub fn sender(&self) -> mpsc::Sender<ViewMessage> {
        self.tx.clone()
    }

    pub async fn send(&self, msg: ViewMessage) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| Error::Destroyed)
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.resize.send_replace((width, height));
    }

    /// Statistics of the most recent frame.
    pub async fn stats(&self) -> Result<FrameStats> {
        let (reply, rx) = oneshot::channel();
        self.send(ViewMessage::Stats(reply)).await?;
        rx.await.map_err(|_| Error::Destroyed)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the driver and return the torn-down engine.
    pub async fn shutdown(self) -> Option<ViewEngine> {
        let _ = self.tx.send(ViewMessage::Shutdown).await;
        match self.task.await {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!(error = %e, "view driver task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PositionUpdate, TerrainResponse, Tier};
    use crate::renderer::{DrawList, ViewState};
    use crate::texture::MemoryStore;
    use std::time::Duration;

    fn builder() -> ViewBuilder {
        let terrain = TerrainResponse::from_json(br#"{"width": 30, "height": 30, "palette": ["Soil"], "grid": [[900, 0]]}"#).unwrap();
        ViewBuilder::new(ViewConfig::default())
            .terrain_source(Arc::new(StaticTerrainSource::new().with_map("m1", terrain)))
            .store(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_session_renders_and_shuts_down() {
        let view = builder().spawn(Box::new(DrawList::new(320, 320)));
        view.send(ViewMessage::LoadTerrain { map_id: "m1".into() }).await.unwrap();
        view.send(ViewMessage::Positions {
            tier: Tier::Ultrafast,
            updates: vec![PositionUpdate::new("p1", 12.0, 12.0), PositionUpdate::new("p2", 14.0, 12.0)],
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let stats = view.stats().await.unwrap();
        assert!(stats.frame > 1);
        assert_eq!(stats.dots, 2);
        assert_eq!(stats.tiles, 100);
        assert!(view.is_running());

        let engine = view.shutdown().await.unwrap();
        assert_eq!(engine.state(), &ViewState::Destroyed);
        assert!(engine.reconciler().is_empty());
    }

    #[tokio::test]
    async fn test_clicks_reach_order_channel() {
        let (orders_tx, mut orders) = mpsc::unbounded_channel();
        let view = builder().orders(orders_tx).spawn(Box::new(DrawList::new(320, 320)));
        view.send(ViewMessage::Follow(false)).await.unwrap();
        view.send(ViewMessage::Click { x: 160.0, y: 160.0 }).await.unwrap();

        let order = tokio::time::timeout(Duration::from_secs(1), orders.recv()).await.unwrap().unwrap();
        // default focus is the origin
        assert_eq!(order, OrderEvent { x: 0.0, z: 0.0 });
        view.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let view = builder().spawn(Box::new(DrawList::new(100, 100)));
        let sender = view.sender();
        view.shutdown().await;
        assert!(sender.send(ViewMessage::Zoom(1)).await.is_err());
    }
}

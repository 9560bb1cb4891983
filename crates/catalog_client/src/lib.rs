use std::sync::Arc;

use shared::{
    domain::{CategoryId, CategoryRecord},
    error::CatalogError,
    protocol::{CategoryPatch, ChangeOp, NewCategory, RecordChange},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod feed;
pub mod reconciler;
pub mod store;

use feed::{ChangeFeed, FeedConnector, WsFeedConnector};
use reconciler::Reconciler;
use store::{ImageUpload, ListOptions, RemoteCatalog, RemoteCatalogConfig};

/// Rows fetched for the initial snapshot; one bounded page is the whole
/// working set for this catalog.
const SNAPSHOT_PAGE_SIZE: u32 = 100;

/// Notifications consumers react to, usually by re-reading [`LiveCatalog::items`].
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    Connected { seeded: usize },
    Changed { op: ChangeOp, id: CategoryId },
    Closed,
    Error(String),
}

/// Live presentation boundary over the remote catalog.
///
/// `connect` opens the change feed first and seeds from a snapshot second;
/// from then on the feed is the only thing that mutates the in-memory view.
/// CRUD calls pass through to the store and their results are advisory;
/// the authoritative entry for every write arrives back over the feed.
pub struct LiveCatalog {
    store: RemoteCatalog,
    connector: Arc<dyn FeedConnector>,
    live: Mutex<LiveState>,
    events: broadcast::Sender<CatalogEvent>,
}

struct LiveState {
    reconciler: Arc<Mutex<Reconciler>>,
    feed_task: Option<JoinHandle<()>>,
}

impl LiveCatalog {
    pub fn new(config: RemoteCatalogConfig) -> Arc<Self> {
        Self::new_with_dependencies(RemoteCatalog::new(config), Arc::new(WsFeedConnector))
    }

    pub fn new_with_dependencies(
        store: RemoteCatalog,
        connector: Arc<dyn FeedConnector>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            store,
            connector,
            live: Mutex::new(LiveState {
                reconciler: Arc::new(Mutex::new(Reconciler::new())),
                feed_task: None,
            }),
            events,
        })
    }

    /// Opens the live view: fresh reconciler, feed subscription, snapshot
    /// seed. Returns how many rows the seed installed. Any previous live
    /// view is torn down first.
    pub async fn connect(self: &Arc<Self>) -> Result<usize, CatalogError> {
        let url = self.store.realtime_url()?;
        let mut live = self.live.lock().await;

        if let Some(task) = live.feed_task.take() {
            task.abort();
        }
        live.reconciler.lock().await.disconnect();

        let reconciler = Arc::new(Mutex::new(Reconciler::new()));
        live.reconciler = Arc::clone(&reconciler);

        // Subscribe before the snapshot fetch so nothing created in between
        // is lost; the seed never overwrites what the feed already applied.
        let feed = self
            .connector
            .connect(&url)
            .await
            .map_err(CatalogError::transport)?;
        let task = self.spawn_feed_task(feed, Arc::clone(&reconciler));

        let options = ListOptions {
            per_page: SNAPSHOT_PAGE_SIZE,
            ..ListOptions::default()
        };
        let page = match self.store.list_categories(&options).await {
            Ok(page) => page,
            Err(err) => {
                task.abort();
                reconciler.lock().await.disconnect();
                return Err(err);
            }
        };

        let seeded = reconciler.lock().await.connect(page.items);
        live.feed_task = Some(task);
        drop(live);

        info!(seeded, "catalog: live view connected");
        let _ = self.events.send(CatalogEvent::Connected { seeded });
        Ok(seeded)
    }

    /// Tears the live view down. Infallible and idempotent; outstanding
    /// store calls are not cancelled.
    pub async fn disconnect(&self) {
        let mut live = self.live.lock().await;
        if let Some(task) = live.feed_task.take() {
            task.abort();
        }
        live.reconciler.lock().await.disconnect();
    }

    fn spawn_feed_task(
        self: &Arc<Self>,
        mut feed: Box<dyn ChangeFeed>,
        reconciler: Arc<Mutex<Reconciler>>,
    ) -> JoinHandle<()> {
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = feed.next_frame().await {
                match frame {
                    Ok(text) => match serde_json::from_str::<RecordChange>(&text) {
                        Ok(change) => {
                            if change.collection != catalog.store.config().categories {
                                continue;
                            }
                            let applied = {
                                let mut guard = reconciler.lock().await;
                                guard.apply(change.action, &change.record)
                            };
                            if let Some(applied) = applied {
                                let _ = catalog.events.send(CatalogEvent::Changed {
                                    op: applied.op,
                                    id: applied.id,
                                });
                            }
                        }
                        Err(err) => {
                            warn!("catalog: dropping undecodable change frame: {err}");
                        }
                    },
                    Err(err) => {
                        let _ = catalog
                            .events
                            .send(CatalogEvent::Error(format!("change feed failed: {err}")));
                        break;
                    }
                }
            }
            reconciler.lock().await.disconnect();
            let _ = catalog.events.send(CatalogEvent::Closed);
        })
    }

    /// Current materialized list: ascending by `order`, ties by arrival.
    pub async fn items(&self) -> Vec<CategoryRecord> {
        let reconciler = self.current_reconciler().await;
        let guard = reconciler.lock().await;
        guard.items()
    }

    pub async fn get(&self, id: &CategoryId) -> Option<CategoryRecord> {
        let reconciler = self.current_reconciler().await;
        let guard = reconciler.lock().await;
        guard.get(id).cloned()
    }

    pub async fn is_connected(&self) -> bool {
        let reconciler = self.current_reconciler().await;
        let guard = reconciler.lock().await;
        guard.is_connected()
    }

    /// Suggested `order` for the next new category.
    pub async fn next_order(&self) -> i64 {
        let reconciler = self.current_reconciler().await;
        let guard = reconciler.lock().await;
        guard.next_order()
    }

    async fn current_reconciler(&self) -> Arc<Mutex<Reconciler>> {
        let live = self.live.lock().await;
        Arc::clone(&live.reconciler)
    }

    /// Creates a category on the store. The echo is advisory; the
    /// authoritative entry arrives over the change feed.
    pub async fn create_category(
        &self,
        category: NewCategory,
        file: Option<ImageUpload>,
    ) -> Result<CategoryRecord, CatalogError> {
        self.store.create_category(category, file).await
    }

    pub async fn update_category(
        &self,
        id: &CategoryId,
        patch: CategoryPatch,
        file: Option<ImageUpload>,
    ) -> Result<CategoryRecord, CatalogError> {
        self.store.update_category(id, patch, file).await
    }

    pub async fn delete_category(&self, id: &CategoryId) -> Result<(), CatalogError> {
        self.store.remove_category(id).await
    }

    pub fn image_url(&self, category: &CategoryRecord) -> String {
        self.store.image_url(category)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

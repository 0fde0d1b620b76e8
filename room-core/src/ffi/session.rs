//! Session implementation for FFI

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

use parking_lot::RwLock;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::WsConnector;
use crate::config::{LaunchParams, SessionConfig};
use crate::engine::{self, EngineHandle, RoomEngine};
use crate::provider::{PlaybackProvider, ProviderClient, QueueStore, StoreClient};

use super::types::*;

static TRACING_INIT: Once = Once::new();

const DEFAULT_LOG_FILTER: &str = "room_core=debug,hyper=off,hyper_util=off,reqwest=off,tungstenite=info";

/// Where views of the mounted room go.
///
/// Every mount gets a new number; views and the unmount notification of an
/// older mount (still shutting down after a remount) are dropped.
#[derive(Clone, Default)]
struct ViewSink {
    callback: Arc<RwLock<Option<Arc<dyn RoomViewCallback>>>>,
    latest_view: Arc<RwLock<Option<RoomView>>>,
    mounts: Arc<AtomicU64>,
}

impl ViewSink {
    /// Start a new mount and forget the previous room's view
    fn begin_mount(&self) -> u64 {
        let mut latest = self.latest_view.write();
        *latest = None;
        self.mounts.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, mount: u64) -> bool {
        self.mounts.load(Ordering::SeqCst) == mount
    }

    fn callback(&self) -> Option<Arc<dyn RoomViewCallback>> {
        self.callback.read().clone()
    }

    async fn forward(self, mount: u64, mut views: mpsc::UnboundedReceiver<engine::RoomView>) {
        while let Some(view) = views.recv().await {
            let view = RoomView::from(view);
            {
                let mut latest = self.latest_view.write();
                if !self.is_current(mount) {
                    debug!("Dropping view of replaced mount #{}", mount);
                    continue;
                }
                *latest = Some(view.clone());
            }

            if let Some(cb) = self.callback() {
                cb.on_view_changed(view);
            }
        }

        if !self.is_current(mount) {
            debug!("Mount #{} ended after being replaced", mount);
            return;
        }
        debug!("View stream of mount #{} ended", mount);
        if let Some(cb) = self.callback() {
            cb.on_unmounted();
        }
    }
}

/// Main session interface: one mounted room at a time
#[derive(uniffi::Object)]
pub struct Session {
    runtime: Runtime,
    config: SessionConfig,
    engine: RwLock<Option<EngineHandle>>,
    views: ViewSink,
}

#[uniffi::export]
impl Session {
    /// Create a new session, configured from the environment
    #[uniffi::constructor]
    pub fn new() -> Result<Self, CoreError> {
        TRACING_INIT.call_once(|| {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
            let _ = tracing_subscriber::fmt()
                .with_ansi(false) // Disable colors for Xcode console
                .with_target(false)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        });

        info!("Initializing room-core session");

        let runtime = Runtime::new().map_err(|e| CoreError::Runtime(e.to_string()))?;

        Ok(Self {
            runtime,
            config: SessionConfig::from_env(),
            engine: RwLock::new(None),
            views: ViewSink::default(),
        })
    }

    /// Set the view callback
    pub fn set_callback(&self, callback: Box<dyn RoomViewCallback>) {
        *self.views.callback.write() = Some(Arc::from(callback));
    }

    /// Mount the room described by a launch query (`?access_token=…&room_id=…`)
    pub fn mount(&self, query: String) -> Result<(), CoreError> {
        if self.is_mounted() {
            return Err(CoreError::AlreadyMounted);
        }
        let params = LaunchParams::from_query(&query)?;
        info!("Mounting room {}", params.room_id);

        let provider: Arc<dyn PlaybackProvider> = Arc::new(ProviderClient::with_base_url(&self.config.provider_url));
        let store: Arc<dyn QueueStore> = Arc::new(StoreClient::with_base_url(&self.config.store_url));
        let connector = WsConnector::new(&self.config.channel.url);

        let engine = RoomEngine::new(params, &self.config, provider, store, connector);
        let (handle, views) = {
            let _guard = self.runtime.enter();
            engine.start()
        };
        let mount = self.views.begin_mount();
        *self.engine.write() = Some(handle);

        self.runtime.spawn(self.views.clone().forward(mount, views));
        Ok(())
    }

    /// Resume polling after the "not playing" notice was acknowledged
    pub fn acknowledge_ready(&self) -> Result<(), CoreError> {
        self.with_engine(|engine| engine.acknowledge_ready())
    }

    /// The room's queue changed; fetch it again
    pub fn refresh_queue(&self) -> Result<(), CoreError> {
        self.with_engine(|engine| engine.refresh_queue())
    }

    /// Our playback changed; poll now
    pub fn refresh_playback(&self) -> Result<(), CoreError> {
        self.with_engine(|engine| engine.refresh_playback())
    }

    /// Leave the room. `on_unmounted` fires once the engine has stopped,
    /// unless another room was mounted meanwhile.
    pub fn unmount(&self) -> Result<(), CoreError> {
        let engine = self.engine.write().take().ok_or(CoreError::NotMounted)?;
        engine.unmount()?;
        info!("Unmounting room");
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.engine.read().as_ref().is_some_and(EngineHandle::is_running)
    }

    /// Latest view delivered to the callback
    pub fn current_view(&self) -> Option<RoomView> {
        self.views.latest_view.read().clone()
    }
}

impl Session {
    fn with_engine(
        &self,
        f: impl FnOnce(&EngineHandle) -> Result<(), crate::engine::EngineError>,
    ) -> Result<(), CoreError> {
        let engine = self.engine.read();
        let engine = engine.as_ref().ok_or(CoreError::NotMounted)?;
        f(engine).map_err(CoreError::from)
    }
}

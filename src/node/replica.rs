//! The replica node: store, client listener, admin endpoint and internal jobs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::NodeConfig;
use crate::drain::server::DrainService;
use crate::lifecycle::shutdown::Stopper;
use crate::lifecycle::state::Lifecycle;
use crate::net::connection::WorkTracker;
use crate::net::listener::{self, ListenerError};
use crate::node::membership::Membership;
use crate::node::store::StoreHandle;
use crate::node::work::NodeWork;
use crate::node::{Node, StartError};

/// What the startup summary and the admin endpoint need from the store.
#[derive(Debug, Clone)]
struct StoreInfo {
    root: Option<PathBuf>,
    temp_dir: PathBuf,
    node_id: Uuid,
    initial_boot: bool,
}

impl StoreInfo {
    fn of(store: &StoreHandle) -> Self {
        Self {
            root: store.root().map(PathBuf::from),
            temp_dir: store.temp_dir().to_path_buf(),
            node_id: store.node_id(),
            initial_boot: store.initial_boot(),
        }
    }
}

/// A replica node as started by `replica-node`.
pub struct ReplicaNode {
    config: NodeConfig,
    lifecycle: Lifecycle,
    stopper: Stopper,
    drain: DrainService,
    work: NodeWork,
    store: Option<StoreInfo>,
    created: Instant,
}

impl ReplicaNode {
    /// Build the node and the drain service the orchestrator drives it with.
    pub fn new(config: NodeConfig, lifecycle: Lifecycle, stopper: Stopper) -> (Self, DrainService) {
        let work = NodeWork::new(Duration::from_secs(config.shutdown.drain_mode_timeout_secs));
        let drain = DrainService::new(Arc::new(work.clone()), stopper.clone(), lifecycle.clone());

        let node = Self {
            config,
            lifecycle,
            stopper,
            drain: drain.clone(),
            work,
            store: None,
            created: Instant::now(),
        };
        (node, drain)
    }

    pub fn work(&self) -> &NodeWork {
        &self.work
    }

    fn summary(&self, store: &StoreInfo, client: &TcpListener, admin: &TcpListener) -> String {
        let address = |l: &TcpListener| {
            l.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        };
        let status = if store.initial_boot {
            "initialized new node"
        } else {
            "restarted pre-existing node"
        };
        let store_desc = match &store.root {
            Some(root) => root.display().to_string(),
            None => "in-memory".to_string(),
        };

        format!(
            "replica node starting (took {:.1}s)\n\
             version:   {}\n\
             clients:   {}\n\
             admin:     http://{}\n\
             store:     {}\n\
             temp dir:  {}\n\
             status:    {}\n\
             node ID:   {}",
            self.created.elapsed().as_secs_f64(),
            env!("CARGO_PKG_VERSION"),
            address(client),
            address(admin),
            store_desc,
            store.temp_dir.display(),
            status,
            store.node_id,
        )
    }
}

impl Node for ReplicaNode {
    async fn init(&mut self) -> Result<(), StartError> {
        let config = self.config.store.clone();
        let store = tokio::task::spawn_blocking(move || StoreHandle::acquire(&config))
            .await
            .map_err(|e| StartError::Init(Box::new(e)))?
            .map_err(|e| StartError::Init(Box::new(e)))?;
        tracing::info!(
            node_id = %store.node_id(),
            temp_dir = %store.temp_dir().display(),
            "Store acquired"
        );
        self.store = Some(StoreInfo::of(&store));

        // The temp dir lives as long as the stopper runs, whether or not
        // the node ever serves.
        match self.stopper.track() {
            Some(guard) => {
                let stopper = self.stopper.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    keep_store(store, stopper).await;
                });
            }
            None => {
                tracing::info!("Stop requested during initialization; releasing store");
                release_store(store).await;
            }
        }
        Ok(())
    }

    async fn serve(&mut self, stopper: Stopper) -> Result<(), StartError> {
        let Some(store) = self.store.clone() else {
            return Err(StartError::Serve("serve called before init".into()));
        };

        let client_listener = bind(&self.config.listener.client_address).await?;
        let admin_listener = bind(&self.config.admin.bind_address).await?;
        let summary = self.summary(&store, &client_listener, &admin_listener);

        let admin_state = AdminState {
            drain: self.drain.clone(),
            lifecycle: self.lifecycle.clone(),
            stopper: stopper.clone(),
            membership: Membership::new(store.node_id),
            api_key: Arc::from(self.config.admin.api_key.as_str()),
        };

        let spawned = [
            serve_router(&stopper, "client-server", client_listener, client_router(self.work.clients.clone())),
            serve_router(&stopper, "admin-server", admin_listener, setup_admin_router(admin_state)),
            stopper.spawn(
                "heartbeat",
                heartbeat(
                    self.work.internal.clone(),
                    stopper.clone(),
                    Duration::from_millis(self.config.store.heartbeat_interval_ms),
                ),
            ),
        ];
        if spawned.iter().any(Option::is_none) {
            tracing::info!("Stop requested while starting node tasks");
            return Ok(());
        }

        tracing::info!("node startup completed:\n{}", summary);
        if self.config.shutdown.echo_notices {
            println!("{summary}");
        }
        Ok(())
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartError> {
    listener::bind(address).await.map_err(|e| {
        if e.is_address_in_use() {
            match e {
                ListenerError::Bind { address, source } => StartError::ListenConflict { address, source },
                other => StartError::Serve(Box::new(other)),
            }
        } else {
            StartError::Serve(Box::new(e))
        }
    })
}

fn serve_router(
    stopper: &Stopper,
    name: &'static str,
    listener: TcpListener,
    router: Router,
) -> Option<tokio::task::JoinHandle<()>> {
    let shutdown = stopper.clone();
    stopper.spawn(name, async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.should_stop().await })
            .await;
        if let Err(e) = result {
            tracing::error!(server = name, error = %e, "Server exited with error");
        }
    })
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    active_requests: u64,
}

fn client_router(clients: WorkTracker) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(clients.clone(), track_client_work)),
        )
        .with_state(clients)
}

async fn health(State(clients): State<WorkTracker>) -> Json<Health> {
    Json(Health {
        status: "ok",
        active_requests: clients.active_count(),
    })
}

/// Count every client request as in-flight work; refuse new ones once draining.
async fn track_client_work(State(clients): State<WorkTracker>, request: Request, next: Next) -> Response {
    let Some(guard) = clients.try_admit() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "node is draining").into_response();
    };
    let response = next.run(request).await;
    drop(guard);
    response
}

/// Periodic internal job, admitted through the internal work gate.
async fn heartbeat(internal: WorkTracker, stopper: Stopper, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut beats: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(_work) = internal.try_admit() else {
                    tracing::debug!(beats, "Internal work drained; heartbeat stopping");
                    return;
                };
                beats += 1;
                tracing::trace!(beats, "Heartbeat");
            }
            () = stopper.should_stop() => return,
        }
    }
}

/// Hold the store until the node stops, then release its temporary directory.
async fn keep_store(store: StoreHandle, stopper: Stopper) {
    stopper.should_stop().await;
    release_store(store).await;
}

async fn release_store(store: StoreHandle) {
    match tokio::task::spawn_blocking(move || store.release()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to remove temporary directory"),
        Err(e) => tracing::warn!(error = %e, "Temporary directory cleanup task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::signals::Signal;
    use crate::lifecycle::startup::run_startup;
    use crate::lifecycle::state::Phase;
    use crate::node::store::{TEMP_DIRS_RECORD, TEMP_DIR_PREFIX};
    use std::fs;
    use std::path::Path;

    fn scratch_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        let root = std::env::temp_dir().join(format!("replica-node-unit-{}", Uuid::new_v4()));
        config.store.path = root.display().to_string();
        config.listener.client_address = "127.0.0.1:0".to_string();
        config.admin.bind_address = "127.0.0.1:0".to_string();
        config.shutdown.echo_notices = false;
        config
    }

    fn temp_dirs(root: &Path) -> Vec<String> {
        fs::read_dir(root)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_DIR_PREFIX))
            .collect()
    }

    fn assert_store_released(root: &Path) {
        assert!(temp_dirs(root).is_empty(), "leftover temp dirs: {:?}", temp_dirs(root));
        let record = fs::read_to_string(root.join(TEMP_DIRS_RECORD)).unwrap();
        assert!(record.trim().is_empty(), "record still lists: {record}");
    }

    #[tokio::test]
    async fn stop_during_init_releases_store() {
        let config = scratch_config();
        let root = PathBuf::from(&config.store.path);
        let lifecycle = Lifecycle::new();
        let stopper = Stopper::new();
        let (node, _drain) = ReplicaNode::new(config, lifecycle.clone(), stopper.clone());

        lifecycle.begin_starting();
        lifecycle.on_signal(Signal::TERMINATE);
        stopper.request_stop();

        let (tx, rx) = tokio::sync::oneshot::channel();
        run_startup(node, lifecycle.clone(), stopper.clone(), tx).await;

        assert!(rx.await.unwrap().is_ok());
        assert_eq!(lifecycle.phase(), Phase::Stopped);
        assert_store_released(&root);
        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn stop_before_serve_releases_store() {
        let config = scratch_config();
        let root = PathBuf::from(&config.store.path);
        let stopper = Stopper::new();
        let (mut node, _drain) = ReplicaNode::new(config, Lifecycle::new(), stopper.clone());

        node.init().await.unwrap();
        assert_eq!(temp_dirs(&root).len(), 1);
        assert_eq!(stopper.num_tasks(), 1);

        stopper.request_stop();
        tokio::time::timeout(Duration::from_secs(5), stopper.is_stopped())
            .await
            .expect("store keeper should exit on stop");
        assert_store_released(&root);
        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn restart_reports_existing_node() {
        let config = scratch_config();
        let root = PathBuf::from(&config.store.path);

        let (mut first, _) = ReplicaNode::new(config.clone(), Lifecycle::new(), Stopper::new());
        first.init().await.unwrap();
        let (mut second, _) = ReplicaNode::new(config, Lifecycle::new(), Stopper::new());
        second.init().await.unwrap();

        let (first, second) = (first.store.unwrap(), second.store.unwrap());
        assert!(first.initial_boot);
        assert!(!second.initial_boot);
        assert_eq!(first.node_id, second.node_id);
        let _ = fs::remove_dir_all(&root);
    }
}

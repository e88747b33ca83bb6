//! b3lb dispatcher server.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use b3lb_api::handlers::{self, AppState};
use b3lb_api::{metrics, poller::NodePoller, recording, stats};
use b3lb_storage::{Config, LocalBlobStore, NullRenderer, Store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!("starting b3lb with db at {}", config.db_path);

    let store = Store::new(&config.db_path).expect("failed to open store");
    let blob: Arc<dyn b3lb_storage::BlobStore> = Arc::new(LocalBlobStore::new(config.blob_root.clone()));
    let renderer: Arc<dyn b3lb_storage::Renderer> = Arc::new(NullRenderer);
    let http = reqwest::Client::builder()
        .timeout(config.node_request_timeout)
        .build()
        .expect("reqwest client");

    let state = AppState {
        store: store.clone(),
        blob,
        renderer,
        http,
        api_base_domain: std::env::var("B3LB_API_BASE_DOMAIN").unwrap_or_else(|_| "localhost".into()),
        path_hierarchy_width: config.record_path_hierarchy_width,
        path_hierarchy_depth: config.record_path_hierarchy_depth,
    };

    spawn_background_tasks(&store, &config);

    let app = Router::new()
        .route("/bigbluebutton/api/:endpoint", get(handlers::bbb_api).post(handlers::bbb_api))
        .route("/b3lb/b/meeting/end", get(handlers::meeting_end))
        .route("/b3lb/b/record/upload", post(handlers::upload_record))
        .route("/b3lb/r/:nonce", get(handlers::deliver_record))
        .route("/b3lb/stats/:slug", get(handlers::stats))
        .route("/b3lb/assets/:slug", get(handlers::get_assets))
        .route("/b3lb/assets/:slug/slide", post(handlers::upload_slide))
        .route("/metrics", get(metrics::process_metrics))
        .route("/b3lb/metrics", get(handlers::domain_metrics))
        .route("/b3lb/metrics/:slug", get(handlers::domain_metrics_for_tenant))
        .route("/b3lb/ping", get(handlers::ping))
        .route("/health", get(health_check))
        .route(
            "/b3lb/t/:slug/bbb/api/:endpoint",
            get(handlers::bbb_api).post(handlers::bbb_api),
        )
        .route("/b3lb/t/:slug/logo", get(handlers::serve_logo))
        .route("/b3lb/t/:slug/slide", get(handlers::serve_slide))
        .route("/b3lb/t/:slug/css", get(handlers::serve_custom_css))
        .layer(middleware::from_fn(metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: std::net::SocketAddr = config.bind_addr.parse().expect("invalid bind address");
    tracing::info!("b3lb listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> &'static str {
    "ok"
}

/// Kicks off the three periodic background jobs: node polling (load +
/// meeting-list refresh), the recording retention sweep, and tenant stats
/// recomputation. Each runs in its own loop rather than a shared scheduler
/// so a slow node poll never delays the retention sweep.
fn spawn_background_tasks(store: &Store, config: &Config) {
    let poller = NodePoller::new(store.clone(), config.node_request_timeout);
    let poll_interval = config.poll_interval;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(poll_interval);
        loop {
            tick.tick().await;
            poller.poll_once().await;
        }
    });

    let retention_store = store.clone();
    let retention_interval = config.retention_sweep_interval;
    let path_width = config.record_path_hierarchy_width;
    let path_depth = config.record_path_hierarchy_depth;
    let blob_root = config.blob_root.clone();
    tokio::spawn(async move {
        let blob: Arc<dyn b3lb_storage::BlobStore> = Arc::new(LocalBlobStore::new(blob_root));
        let mut tick = tokio::time::interval(retention_interval);
        loop {
            tick.tick().await;
            // 0-day floor: the SQL prefilter sees every record set, and
            // sweep_retention's per-tenant hold-time check does the real
            // filtering. Sweeps run hourly by default, so the extra rows
            // scanned don't matter.
            match recording::sweep_retention(&retention_store, blob.as_ref(), 0, path_width, path_depth).await {
                Ok(deleted) if deleted > 0 => tracing::info!("retention sweep deleted {deleted} record sets"),
                Ok(_) => {}
                Err(e) => tracing::error!("retention sweep failed: {e}"),
            }
        }
    });

    let stats_store = store.clone();
    let stats_interval = config.stats_interval;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(stats_interval);
        loop {
            tick.tick().await;
            let tenants = match stats_store.list_all_tenants() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("failed to list tenants for stats sweep: {e}");
                    continue;
                }
            };
            for tenant in tenants {
                if let Err(e) = stats::recompute_tenant_stats(&stats_store, tenant.uuid) {
                    tracing::error!("stats recompute failed for tenant {}: {e}", tenant.uuid);
                }
            }
        }
    });
}

//! HTTP transport for the directive adapter. Accepts raw directives on
//! `POST /directive`, logs request and response for debugging, and delegates
//! everything else to the core router.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use hearth_core::{
    AdapterConfig, DirectiveRouter, MemoryDeviceStore, ProfileResolver, SledDeviceStore,
};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AdapterConfig::from_env();
    let router = match SledDeviceStore::open(&config.device_db_path) {
        Ok(store) => {
            let resolver = Arc::new(ProfileResolver::new(&config.profile_endpoint));
            DirectiveRouter::new(config, Arc::new(store), resolver)
        }
        Err(e) => {
            // Keep serving with volatile state rather than refusing to start.
            tracing::warn!("could not open device database: {e}; falling back to in-memory store");
            let resolver = Arc::new(ProfileResolver::new(&config.profile_endpoint));
            DirectiveRouter::new(config, Arc::new(MemoryDeviceStore::new()), resolver)
        }
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/directive", post(directive_handler))
        .with_state(Arc::new(router));

    let bind = std::env::var("HEARTH_BIND").unwrap_or_else(|_| "127.0.0.1:8300".into());
    tracing::info!("hearth gateway listening on {bind}");
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .expect("bind gateway listener");
    axum::serve(listener, app).await.expect("serve gateway");
}

async fn health() -> &'static str {
    "OK"
}

async fn directive_handler(
    State(router): State<Arc<DirectiveRouter>>,
    Json(request): Json<Value>,
) -> Json<Value> {
    tracing::info!(
        "==Request==\n{}",
        serde_json::to_string_pretty(&request).unwrap_or_default()
    );

    let response = router.handle(&request).await;
    let raw = serde_json::to_value(&response).unwrap_or(Value::Null);

    tracing::info!(
        "==Response==\n{}",
        serde_json::to_string_pretty(&raw).unwrap_or_default()
    );
    Json(raw)
}

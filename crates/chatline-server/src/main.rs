mod config;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use chatline_api::devices::DatabaseTokenSource;
use chatline_api::middleware::principal_from_token;
use chatline_api::state::{AppState, AppStateInner};
use chatline_api::storage::LocalDiskStore;
use chatline_db::Database;
use chatline_gateway::{Dispatcher, PusherClient, RealtimeNotifier, connection};
use chatline_push::{DeviceTokenSource, FcmClient, PushDispatcher, PushRouter};
use chatline_types::models::RecipientClass;

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[derive(Deserialize)]
struct GatewayQuery {
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatline=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    let store = Arc::new(LocalDiskStore::new(config.storage_dir.clone(), &config.public_url).await?);
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let tokens: Arc<dyn DeviceTokenSource> = Arc::new(DatabaseTokenSource::new(db.clone()));
    let push = PushRouter::new(
        push_dispatcher(
            RecipientClass::Customer,
            config.customer_fcm_credentials.as_deref(),
            &http_client,
            &tokens,
        )?,
        push_dispatcher(
            RecipientClass::Driver,
            config.driver_fcm_credentials.as_deref(),
            &http_client,
            &tokens,
        )?,
    );

    let dispatcher = Dispatcher::new();
    let pusher = config
        .pusher
        .clone()
        .map(|cfg| Arc::new(PusherClient::new(cfg, http_client.clone())));
    let notifier: Arc<dyn RealtimeNotifier> = match &pusher {
        Some(client) => {
            info!("Realtime events go through Pusher");
            client.clone()
        }
        None => {
            info!("Realtime events go through the in-process gateway");
            Arc::new(dispatcher.clone())
        }
    };

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        store,
        notifier,
        push,
        pusher: pusher.clone(),
        policy: config.policy.clone(),
        per_page: config.per_page,
    });

    let mut app = Router::new()
        .route("/health", get(health))
        .merge(chatline_api::router(app_state))
        .nest_service("/storage", ServeDir::new(&config.storage_dir));

    if pusher.is_none() {
        let gateway = Router::new()
            .route("/gateway", get(ws_upgrade))
            .with_state(GatewayState {
                dispatcher,
                jwt_secret: config.jwt_secret.clone(),
            });
        app = app.merge(gateway);
    }

    let app = app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Chatline server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// One dispatcher per configured credential file. A class without
/// credentials has push disabled.
fn push_dispatcher(
    class: RecipientClass,
    credentials: Option<&Path>,
    http_client: &reqwest::Client,
    tokens: &Arc<dyn DeviceTokenSource>,
) -> anyhow::Result<Option<PushDispatcher>> {
    let Some(path) = credentials else {
        warn!("No FCM credentials for {} push, notifications disabled", class);
        return Ok(None);
    };

    let client = FcmClient::from_file(path, http_client.clone())?;
    info!("{} push enabled for FCM project {}", class, client.project_id());
    Ok(Some(PushDispatcher::new(class, Arc::new(client), tokens.clone())))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// The token travels in the query string since browsers cannot set headers
/// on a WebSocket upgrade.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match principal_from_token(&query.token, &state.jwt_secret) {
        Ok(principal) => ws
            .on_upgrade(move |socket| {
                connection::handle_connection_authenticated(socket, state.dispatcher, principal.id)
            })
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

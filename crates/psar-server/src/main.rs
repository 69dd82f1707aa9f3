use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use psar_api::middleware::require_auth;
use psar_api::{AppState, AppStateInner, messages, payments};
use psar_gateway::connection;
use psar_gateway::registry::RoomRegistry;
use psar_gateway::relay::MessageRelay;
use psar_payments::confirm::PaymentConfirmer;
use psar_payments::verifier::{HttpVerifier, PaymentVerifier, VerifierConfig};

#[derive(Clone)]
struct ServerState {
    registry: RoomRegistry,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "psar=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PSAR_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PSAR_DB_PATH").unwrap_or_else(|_| "psar.db".into());
    let host = std::env::var("PSAR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PSAR_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let verifier_config = VerifierConfig {
        base_url: std::env::var("PSAR_VERIFIER_URL")
            .unwrap_or_else(|_| "https://api.example-khqr.test".into()),
        api_token: std::env::var("PSAR_VERIFIER_TOKEN").unwrap_or_default(),
        merchant_name: std::env::var("PSAR_MERCHANT_NAME").unwrap_or_else(|_| "Psar".into()),
    };

    // Init database
    let db = Arc::new(psar_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state: one registry per process, injected everywhere it is used
    let registry = RoomRegistry::new();
    let relay = MessageRelay::new(registry.clone());
    let verifier: Arc<dyn PaymentVerifier> = Arc::new(HttpVerifier::new(verifier_config));
    let confirmer = PaymentConfirmer::new(db.clone(), verifier);

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        relay,
        confirmer,
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        registry: registry.clone(),
        jwt_secret: jwt_secret.clone(),
    };

    // Routes
    let protected_routes = Router::new()
        .route("/threads/{thread_id}/messages", get(messages::get_messages))
        .route("/threads/{thread_id}/messages", post(messages::send_message))
        .route("/threads/{thread_id}/read", post(messages::mark_read))
        .route("/payment/create", post(payments::create_payment))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state.clone());

    // The status poll is keyed by the unguessable tracking hash and polled
    // from contexts that may not carry a session, so it stays public.
    let public_routes = Router::new()
        .route("/payment/status", get(payments::payment_status))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Psar server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.registry, state.jwt_secret)
    })
}

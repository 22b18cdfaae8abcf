pub mod appresult;
pub mod config;
pub mod connections;
pub mod geo;
pub mod matching;
pub mod reaper;
pub mod rooms;
pub mod similarity;
pub mod waiting;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::cors::CorsLayer;

pub use appresult::{AppError, AppResult};
pub use config::Config;

use connections::ConnectionStore;
use matching::Matcher;
use rooms::Relay;
use similarity::SimilaritySearch;
use waiting::WaitingRegistry;

/// Opaque id supplied by the caller; not authenticated here.
pub type UserId = String;
pub type RoomId = String;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub matcher: Arc<Matcher>,
    pub relay: Relay,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        connections: Arc<dyn ConnectionStore>,
        waiting: Arc<dyn WaitingRegistry>,
        search: Arc<dyn SimilaritySearch>,
    ) -> Self {
        let matcher = Matcher::new(connections, waiting, search, config.top_k);
        AppState {
            matcher: Arc::new(matcher),
            relay: Relay::new(config.room_capacity),
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> anyhow::Result<Router> {
    let origin: HeaderValue = state.config.cors_origin.parse()?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(Router::new()
        .route("/", get(hello))
        .nest("/api/v1/video-chat", matching::router())
        .merge(rooms::router())
        .with_state(state)
        .layer(cors))
}

async fn hello() -> &'static str {
    "signaling server is running"
}

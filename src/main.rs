mod config;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod store;
mod utils;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use tower_http::cors::CorsLayer;
use tracing_subscriber::filter::LevelFilter;

use crate::service::dispatch_service::DispatchService;
use crate::service::workflow_service::WorkflowService;
use crate::store::store::StoreClient;

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub store: Arc<StoreClient>,
    pub workflow_service: Arc<WorkflowService>,
    pub dispatch_service: Arc<DispatchService>,
}

impl AppState {
    pub fn new(store: Arc<StoreClient>, config: Config) -> Self {
        let workflow_service = Arc::new(WorkflowService::new(store.clone()));
        let dispatch_service =
            DispatchService::start(store.clone(), config.subscriber_queue_capacity);

        Self {
            env: config,
            store,
            workflow_service,
            dispatch_service,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();

    let store = Arc::new(StoreClient::new(config.feed_retention));
    println!(
        "✅ Marketplace store is up (feed retention: {} events)",
        config.feed_retention
    );

    let app_state = Arc::new(AppState::new(store, config.clone()));

    let cors = CorsLayer::new()
        .allow_origin(config.allowed_origin.parse::<HeaderValue>().unwrap())
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static(crate::middleware::USER_ID_HEADER),
        ])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app = create_router(app_state.clone()).layer(cors);

    println!(
        "🚀 Server is running on http://localhost:{}",
        app_state.env.port
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port))
        .await
        .unwrap();

    axum::serve(listener, app).await.unwrap();
}

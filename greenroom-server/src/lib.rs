use std::net::{Ipv6Addr, SocketAddr};

use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod config;
mod context;
mod errors;
mod interviews;
mod logging;
mod schemas;
mod serialized;
mod sessions;

pub use config::*;
pub use context::*;
pub use logging::init_logger;

pub type Router = axum::Router<ServerContext>;

/// Starts the greenroom server, returning once a shutdown is requested and
/// in-flight analyses have drained
pub async fn run_server(context: ServerContext, port: u16) {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/interviews", interviews::router())
        .nest("/sessions", sessions::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context.clone());

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {port}");

    axum::serve(listener, root_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server runs");

    info!("Shutting down, draining in-flight analyses...");
    context.greenroom.interviews.shutdown().await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

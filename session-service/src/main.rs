use std::net::SocketAddr;

use common_observability::init_tracing;
use session_service::{build_router, load_config, AppState, UserDirectory, SERVICE_NAME};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(SERVICE_NAME, config.log_json);

    let state = AppState::new(&config, UserDirectory::seeded())?;
    let app = build_router(state, &config);

    let addr = SocketAddr::from((config.host, config.port));
    info!(%addr, service = SERVICE_NAME, "starting service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

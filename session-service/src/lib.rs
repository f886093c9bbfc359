pub mod app;
pub mod config;
pub mod directory;
pub mod handlers;

pub use app::{build_router, AppState, SERVICE_NAME};
pub use config::{load_config, load_config_from, ServiceConfig};
pub use directory::UserDirectory;

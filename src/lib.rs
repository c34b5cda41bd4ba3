pub mod client;
pub mod error;
pub mod models;
pub mod views;

pub use views::AppState;
pub use views::OpenApiRoot;
pub use views::Server;
pub use views::ServerConfig;

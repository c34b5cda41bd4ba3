mod auth_config;
pub mod healthcheck;
mod postgres_config;
mod provider_config;
pub mod runserver;
mod telemetry_config;
pub mod user;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
pub use auth_config::AuthArgs;
use healthcheck::HealthcheckArgs;
pub use postgres_config::PostgresConfig;
pub use provider_config::ProviderArgs;
use runserver::RunserverArgs;
pub use telemetry_config::TelemetryConfig;
pub use telemetry_config::TelemetryKind;
use user::UserCommand;

use crate::views::OpenApiRoot;

#[derive(Parser, Debug)]
#[command(author, version)]
pub struct Client {
    #[command(flatten)]
    pub postgres_config: PostgresConfig,
    #[command(flatten)]
    pub telemetry_config: TelemetryConfig,
    #[arg(long, env, value_enum, default_value_t = Color::Auto)]
    pub color: Color,
    /// Service version (reported by /version, always provide in production)
    #[clap(long, env = "ATELIER_GIT_DESCRIBE")]
    pub app_version: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Default, Clone)]
pub enum Color {
    Never,
    Always,
    #[default]
    Auto,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Runserver(Box<RunserverArgs>), // suppresses clippy lint about variant size
    #[command(about, long_about = "Prints the OpenApi of the service")]
    Openapi,
    #[command(subcommand, about, long_about = "Account related commands")]
    User(UserCommand),
    #[command(about, long_about = "Healthcheck")]
    Healthcheck(HealthcheckArgs),
}

/// Prints the OpenApi to stdout
pub fn print_openapi() {
    let openapi = OpenApiRoot::build_openapi();
    print!("{}", serde_yaml::to_string(&openapi).unwrap());
}

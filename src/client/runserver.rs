use chrono::Duration;
use clap::Args;

use crate::views;

use super::AuthArgs;
use super::PostgresConfig;
use super::ProviderArgs;

#[derive(Args, Debug)]
#[command(about, long_about = "Launch the server")]
pub struct RunserverArgs {
    #[arg(long, env = "ATELIER_PORT", default_value_t = 8090)]
    port: u16,
    #[arg(long, env = "ATELIER_ADDRESS", default_value_t = String::from("0.0.0.0"))]
    address: String,
    #[command(flatten)]
    auth: AuthArgs,
    #[command(flatten)]
    provider: ProviderArgs,
    /// If this option is set to false, any role and permission check will be bypassed. Even if no
    /// token is provided by the request or if the provided user doesn't have the required privileges.
    #[clap(long, env = "ATELIER_ENABLE_AUTHORIZATION", default_value_t = true)]
    enable_authorization: bool,
    /// The timeout to use when performing the healthcheck, in milliseconds
    #[clap(long, env = "ATELIER_HEALTH_CHECK_TIMEOUT_MS", default_value_t = 1000)]
    health_check_timeout_ms: u64,
}

/// Create and run the server
pub async fn runserver(
    RunserverArgs {
        port,
        address,
        auth,
        provider,
        enable_authorization,
        health_check_timeout_ms,
    }: RunserverArgs,
    postgres: PostgresConfig,
    app_version: Option<String>,
) -> anyhow::Result<()> {
    let config = views::ServerConfig {
        port,
        address,
        health_check_timeout: Duration::milliseconds(health_check_timeout_ms as i64),
        enable_authorization,
        postgres_config: postgres.into(),
        auth: auth.into(),
        provider: provider.into(),
        app_version,
    };

    let server = views::Server::new(config).await?;
    Ok(server.start().await?)
}

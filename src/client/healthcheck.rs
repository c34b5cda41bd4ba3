use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use assist_client::AssistClient;
use database::DbConnectionPoolV2;

use crate::views;

use super::PostgresConfig;
use super::ProviderArgs;

#[derive(Args, Debug)]
#[command(about, long_about = "Check that the database and the providers answer")]
pub struct HealthcheckArgs {
    #[command(flatten)]
    provider: ProviderArgs,
    /// The timeout to use when performing the healthcheck, in milliseconds
    #[clap(long, env = "ATELIER_HEALTH_CHECK_TIMEOUT_MS", default_value_t = 1000)]
    timeout_ms: u64,
}

pub async fn healthcheck(
    HealthcheckArgs {
        provider,
        timeout_ms,
    }: HealthcheckArgs,
    postgres: PostgresConfig,
) -> anyhow::Result<()> {
    let db_pool = DbConnectionPoolV2::try_initialize(postgres.database_url, 1).await?;
    let provider_config: views::ProviderConfig = provider.into();
    let assist_client = AssistClient::new_http(provider_config.as_options())?;

    tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        views::check_health(Arc::new(db_pool), Arc::new(assist_client)),
    )
    .await
    .map_err(|_| anyhow::anyhow!("healthcheck timed out"))??;

    println!("ok");
    Ok(())
}

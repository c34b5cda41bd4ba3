use chrono::Duration;
use clap::Args;
use url::Url;

use crate::views;

#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    #[clap(long, env = "ATELIER_INFERENCE_URL", default_value_t = Url::parse("https://api.openai.com/").unwrap())]
    inference_url: Url,
    #[clap(long, env = "ATELIER_INFERENCE_API_KEY", hide_env_values = true)]
    inference_api_key: Option<String>,
    #[clap(long, env = "ATELIER_INFERENCE_MODEL", default_value = "gpt-3.5-turbo-instruct")]
    inference_model: String,
    #[clap(long, env = "ATELIER_EXECUTION_URL", default_value_t = Url::parse("https://ce.judge0.com/").unwrap())]
    execution_url: Url,
    #[clap(long, env = "ATELIER_EXECUTION_API_KEY", hide_env_values = true)]
    execution_api_key: Option<String>,
    /// Provider call timeout, in seconds
    #[clap(long, env = "ATELIER_PROVIDER_TIMEOUT", default_value_t = 30)]
    provider_timeout: i64,
}

impl From<ProviderArgs> for views::ProviderConfig {
    fn from(args: ProviderArgs) -> Self {
        Self {
            inference_url: args.inference_url,
            inference_api_key: args.inference_api_key,
            inference_model: args.inference_model,
            execution_url: args.execution_url,
            execution_api_key: args.execution_api_key,
            timeout: Duration::seconds(args.provider_timeout),
        }
    }
}

use chrono::Duration;
use clap::Args;

use crate::views;

#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    /// HS256 secret used to sign bearer tokens
    #[clap(long, env = "ATELIER_JWT_SECRET", default_value = "atelier-insecure-dev-secret", hide_env_values = true)]
    jwt_secret: String,
    /// Bearer token lifetime, in hours
    #[clap(long, env = "ATELIER_TOKEN_TTL_HOURS", default_value_t = 24)]
    token_ttl_hours: i64,
}

impl From<AuthArgs> for views::AuthConfig {
    fn from(args: AuthArgs) -> Self {
        Self {
            jwt_secret: args.jwt_secret,
            token_ttl: Duration::hours(args.token_ttl_hours),
        }
    }
}

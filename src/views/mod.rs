pub mod assist;
pub mod auth;
pub mod documents;
pub mod files;
pub mod friends;
mod openapi;
pub mod ordering;
pub mod pagination;
pub mod project;
pub mod relay;
pub mod users;

#[cfg(test)]
mod test_app;

use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use axum::Router;
use axum::ServiceExt;
use axum::extract::DefaultBodyLimit;
use axum::extract::FromRef;
use axum::extract::Json;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum_tracing_opentelemetry::middleware::OtelAxumLayer;
use chrono::Duration;
use futures::TryFutureExt;
use headers::Authorization;
use headers::HeaderMapExt as _;
use headers::authorization::Bearer;
use thiserror::Error;
use tokio::time::timeout;
use tower::Layer as _;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePath;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing::warn;
use url::Url;

use assist_client::AssistClient;
use atelier_derive::AtelierError;
use atelier_models::prelude::*;
use common::Version;
use database::DbConnectionPoolV2;
use database::db_connection_pool::ping_database;

pub use openapi::OpenApiRoot;
pub use relay::RelayHub;

use crate::error::Result;
use crate::models::Role;
use crate::models::User;

fn service_router() -> Router<AppState> {
    use axum::routing::delete;
    use axum::routing::get;
    use axum::routing::post;

    // # Ordering
    //
    // - arbitrary toplevel sections
    // - routes first, nests second
    // - paths ordered by number of segments
    // - equal number of segments in a path => alphabetical order

    Router::new()
        // service plumbing
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/ws", get(relay::websocket))
        // accounts
        .nest(
            "/auth",
            Router::new()
                .route("/login", post(auth::login))
                .route("/signup", post(auth::signup)),
        )
        .nest(
            "/users",
            Router::new()
                .route("/", get(users::list))
                .route("/me", get(users::me).patch(users::patch))
                .route("/{user_id}", get(users::get).delete(users::delete)),
        )
        // projects & files
        .nest(
            "/projects",
            Router::new()
                .route("/", post(project::create).get(project::list))
                .nest(
                    "/{project_id}",
                    Router::new()
                        .route(
                            "/",
                            get(project::get)
                                .patch(project::patch)
                                .delete(project::delete),
                        )
                        .route("/fork", post(project::fork))
                        .route(
                            "/ratings",
                            get(project::ratings::list).post(project::ratings::rate),
                        )
                        .nest(
                            "/collaborators",
                            Router::new()
                                .route(
                                    "/",
                                    get(project::collaborators::list)
                                        .post(project::collaborators::add),
                                )
                                .route("/{user_id}", delete(project::collaborators::remove)),
                        )
                        .nest(
                            "/files",
                            Router::new()
                                .route("/", post(files::create).get(files::list))
                                .route(
                                    "/{file_id}",
                                    get(files::get).patch(files::patch).delete(files::delete),
                                )
                                .route(
                                    "/{file_id}/content",
                                    get(files::get_content).put(files::put_content),
                                ),
                        ),
                ),
        )
        // uploads
        .nest(
            "/documents",
            Router::new().route("/", post(documents::post)).route(
                "/{document_key}",
                get(documents::get).delete(documents::delete),
            ),
        )
        // friends
        .nest(
            "/friends",
            Router::new()
                .route("/", get(friends::list))
                .route("/requests", get(friends::pending).post(friends::request))
                .route("/requests/{request_id}/accept", post(friends::accept))
                .route("/{user_id}", delete(friends::remove)),
        )
        // AI helpers
        .nest(
            "/assist",
            Router::new()
                .route("/complete", post(assist::complete))
                .route("/execute", post(assist::execute))
                .route("/explain", post(assist::explain)),
        )
}

/// Represents the bundle of information about the issuer of a request
/// that can be extracted from the bearer token.
#[derive(Debug, Clone)]
pub enum Authentication {
    /// The issuer of the request did not provide any token.
    Unauthenticated,
    /// The issuer of the request provided a valid token for this account.
    Authenticated(Box<User>),
    /// Authorization is disabled by configuration. Role checks pass; the
    /// account is still resolved when a token was provided so that
    /// ownership-taking operations keep working.
    SkipAuthorization { user: Option<Box<User>> },
}

impl Authentication {
    /// The account id of the issuer, `None` when authorization is disabled
    /// and no token was provided
    pub fn user_id(&self) -> Result<Option<i64>, AuthorizationError> {
        match self {
            Authentication::SkipAuthorization { user } => Ok(user.as_ref().map(|user| user.id)),
            Authentication::Unauthenticated => Err(AuthorizationError::Unauthorized),
            Authentication::Authenticated(user) => Ok(Some(user.id)),
        }
    }

    /// The account id of the issuer, for operations that need an identity
    /// no matter what
    pub fn require_user_id(&self) -> Result<i64, AuthorizationError> {
        self.user_id()?.ok_or(AuthorizationError::Unauthorized)
    }

    pub fn require_user(&self) -> Result<User, AuthorizationError> {
        match self {
            Authentication::Authenticated(user) => Ok(user.as_ref().clone()),
            Authentication::SkipAuthorization { user: Some(user) } => Ok(user.as_ref().clone()),
            _ => Err(AuthorizationError::Unauthorized),
        }
    }

    /// Checks if the issuer of the request has the required roles. Always returns `false` if the
    /// request is unauthenticated.
    pub async fn check_roles(
        &self,
        required_roles: HashSet<Role>,
    ) -> Result<bool, AuthorizationError> {
        match self {
            Authentication::SkipAuthorization { .. } => Ok(true),
            Authentication::Unauthenticated => Ok(false),
            Authentication::Authenticated(user) => Ok(required_roles.is_subset(&user.roles())),
        }
    }
}

pub type AuthenticationExt = axum::extract::Extension<Authentication>;

async fn authenticate(
    config: &ServerConfig,
    headers: &HeaderMap,
    db_pool: &DbConnectionPoolV2,
) -> Result<Authentication, AuthorizationError> {
    let Some(bearer) = headers.typed_get::<Authorization<Bearer>>() else {
        return Ok(if config.enable_authorization {
            Authentication::Unauthenticated
        } else {
            Authentication::SkipAuthorization { user: None }
        });
    };
    let user_id = match auth::decode_token(bearer.token(), &config.auth) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting bearer token");
            return Err(AuthorizationError::Unauthorized);
        }
    };
    let conn = db_pool.get().await?;
    let user = User::retrieve(conn, user_id)
        .await
        .map_err(AuthorizationError::Database)?
        // the token outlived its account
        .ok_or(AuthorizationError::Unauthorized)?;

    if config.enable_authorization {
        Ok(Authentication::Authenticated(Box::new(user)))
    } else {
        Ok(Authentication::SkipAuthorization {
            user: Some(Box::new(user)),
        })
    }
}

async fn authentication_middleware(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let authentication =
        authenticate(&app_state.config, req.headers(), &app_state.db_pool).await?;
    req.extensions_mut().insert(authentication);
    Ok(next.run(req).await)
}

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "authz")]
pub enum AuthorizationError {
    #[error("Unauthorized, the request must carry a valid bearer token")]
    #[atelier_error(status = 401)]
    Unauthorized,
    #[error("Forbidden, the user has insufficient privileges")]
    #[atelier_error(status = 403)]
    Forbidden,
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
    #[error(transparent)]
    #[atelier_error(status = 500)]
    DbError(#[from] database::db_connection_pool::DatabasePoolError),
}

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "app_health")]
pub enum AppHealthError {
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Database(#[from] database::db_connection_pool::PingError),
    #[error(transparent)]
    Provider(assist_client::Error),
}

#[utoipa::path(
    get, path = "/health",
    responses(
        (status = 200, description = "Check if the service is running correctly", body = String)
    )
)]
async fn health(
    State(AppState {
        db_pool,
        assist_client,
        health_check_timeout,
        ..
    }): State<AppState>,
) -> Result<&'static str> {
    timeout(
        health_check_timeout
            .to_std()
            .expect("timeout should be valid at this point"),
        check_health(db_pool, assist_client),
    )
    .await
    .map_err(|_| AppHealthError::Timeout)??;
    Ok("ok")
}

pub async fn check_health(
    db_pool: Arc<DbConnectionPoolV2>,
    assist_client: Arc<AssistClient>,
) -> Result<()> {
    let mut db_connection = db_pool.clone().get().await?;
    let provider_ping = async {
        assist_client
            .ping()
            .await
            .map_err(AppHealthError::Provider)?;
        Ok(())
    };
    tokio::try_join!(
        ping_database(&mut db_connection).map_err(AppHealthError::Database),
        provider_ping
    )?;
    Ok(())
}

#[utoipa::path(
    get, path = "/version",
    responses(
        (status = 200, description = "Return the service version", body = Version),
    ),
)]
pub(in crate::views) async fn version(
    State(AppState { config, .. }): State<AppState>,
) -> Json<Version> {
    Json(Version {
        git_describe: config.app_version.clone(),
    })
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub inference_url: Url,
    pub inference_api_key: Option<String>,
    pub inference_model: String,
    pub execution_url: Url,
    pub execution_api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn as_options(&self) -> assist_client::Options {
        assist_client::Options {
            inference_url: self.inference_url.clone(),
            inference_api_key: self.inference_api_key.clone(),
            execution_url: self.execution_url.clone(),
            execution_api_key: self.execution_api_key.clone(),
            timeout: self
                .timeout
                .to_std()
                .expect("provider timeout should be valid at this point"),
        }
    }
}

#[derive(Clone)]
pub struct PostgresConfig {
    pub database_url: Url,
    pub pool_size: usize,
}

pub struct ServerConfig {
    pub port: u16,
    pub address: String,
    pub health_check_timeout: Duration,
    pub enable_authorization: bool,
    pub postgres_config: PostgresConfig,
    pub auth: AuthConfig,
    pub provider: ProviderConfig,
    pub app_version: Option<String>,
}

pub struct Server {
    app_state: AppState,
    router: NormalizePath<Router>,
}

/// The state of the whole service, available to all handlers
///
/// If only the database is needed, use `State<Arc<DbConnectionPoolV2>>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db_pool: Arc<DbConnectionPoolV2>,
    pub assist_client: Arc<AssistClient>,
    pub relay: RelayHub,
    pub health_check_timeout: Duration,
}

impl FromRef<AppState> for Arc<DbConnectionPoolV2> {
    fn from_ref(input: &AppState) -> Self {
        input.db_pool.clone()
    }
}

impl FromRef<AppState> for Arc<AssistClient> {
    fn from_ref(input: &AppState) -> Self {
        input.assist_client.clone()
    }
}

impl AppState {
    #[tracing::instrument(skip_all, level = "info", err, name = "AppState initialization")]
    async fn init(config: ServerConfig) -> anyhow::Result<Self> {
        let PostgresConfig {
            database_url,
            pool_size,
        } = config.postgres_config.clone();
        let db_pool = DbConnectionPoolV2::try_initialize(database_url, pool_size).await?;
        let assist_client = AssistClient::new_http(config.provider.as_options())?;

        Ok(Self {
            db_pool: Arc::new(db_pool),
            assist_client: Arc::new(assist_client),
            relay: RelayHub::new(),
            health_check_timeout: config.health_check_timeout,
            config: Arc::new(config),
        })
    }
}

impl Server {
    #[tracing::instrument(skip_all, err, level = "info", name = "server initialization")]
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        info!("Building server...");
        let app_state = AppState::init(config).await?;

        // Custom Bytes and String extractor configuration
        let request_payload_limit = RequestBodyLimitLayer::new(50 * 1024 * 1024); // 50MiB

        // Build CORS layer
        let cors = {
            let allowed_origin = env::var("ATELIER_ALLOWED_ORIGIN").ok();
            match allowed_origin {
                Some(origin) => CorsLayer::new()
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .allow_origin(
                        origin
                            .parse::<axum::http::header::HeaderValue>()
                            .expect("invalid allowed origin"),
                    ),
                None => CorsLayer::new()
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .allow_origin(Any),
            }
        };

        // Configure the axum router
        let router: Router<()> = axum::Router::<AppState>::new()
            .merge(service_router())
            .route_layer(axum::middleware::from_fn_with_state(
                app_state.clone(),
                authentication_middleware,
            ))
            .layer(OtelAxumLayer::default())
            .layer(DefaultBodyLimit::disable())
            .layer(request_payload_limit)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(app_state.clone());
        let normalizing_router = NormalizePathLayer::trim_trailing_slash().layer(router);

        Ok(Self {
            app_state,
            router: normalizing_router,
        })
    }

    pub async fn start(self) -> std::io::Result<()> {
        let Self { app_state, router } = self;
        let ServerConfig {
            address,
            port,
            enable_authorization,
            ..
        } = app_state.config.as_ref();

        if !*enable_authorization {
            warn!("authorization disabled, all role and permission checks are bypassed");
        }

        info!("Running server...");
        let service = ServiceExt::<axum::extract::Request>::into_make_service(router);
        let listener = tokio::net::TcpListener::bind((address.as_str(), *port)).await?;
        axum::serve(listener, service).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::StatusCode;

    use super::test_app::TestAppBuilder;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn health() {
        let app = TestAppBuilder::default_app();
        let request = app.get("/health");
        app.fetch(request).await.assert_status(StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn version() {
        let app = TestAppBuilder::default_app();
        let request = app.get("/version");
        let response: HashMap<String, Option<String>> = app.fetch(request).await.json_into();
        assert!(response.contains_key("git_describe"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn requests_without_a_token_are_unauthenticated() {
        let app = super::test_app::test_app!().enable_authorization(true).build();
        let request = app.get("/users/me");
        app.fetch(request)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn garbage_tokens_are_rejected() {
        let app = TestAppBuilder::default_app();
        let request = app
            .get("/users/me")
            .add_header("Authorization", "Bearer not-a-jwt");
        app.fetch(request)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

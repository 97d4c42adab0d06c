use std::sync::Arc;

use handlebars::{DirectorySourceOptions, Handlebars};

pub mod backend;
pub mod config;
pub mod identity;
pub mod routes;
pub mod session;
pub mod telemetry;

pub use backend::Post;

use backend::{ApiError, ApiGateway, AppSyncClient, AuthMode};
use config::Config;
use identity::{CognitoIdentityProvider, IdentityError, IdentityProvider};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("Failed to load templates: {0}")]
    Templates(#[from] handlebars::TemplateError),
    #[error("Failed to build backend client: {0}")]
    Backend(#[from] ApiError),
    #[error("Failed to build identity client: {0}")]
    Identity(#[from] IdentityError),
}

#[derive(Clone)]
pub struct AppState {
    pub templates: Handlebars<'static>,
    pub api: Arc<dyn ApiGateway>,
    pub identity: Arc<dyn IdentityProvider>,
    pub default_auth_mode: AuthMode,
    pub secure_cookies: bool,
}

impl AppState {
    /// Wires the state from an explicit config and the two external clients.
    pub fn new(
        config: &Config,
        api: Arc<dyn ApiGateway>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, StartupError> {
        let mut templates = Handlebars::new();
        templates.set_dev_mode(cfg!(debug_assertions));
        templates.register_templates_directory(
            config.template_dir.as_str(),
            DirectorySourceOptions::default(),
        )?;

        Ok(Self {
            templates,
            api,
            identity,
            default_auth_mode: config.backend.default_auth_mode,
            secure_cookies: config.secure_cookies,
        })
    }

    /// Builds the production clients for the managed backend and user pool.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let api = AppSyncClient::new(&config.backend)?;
        let identity = CognitoIdentityProvider::new(&config.identity, &config.backend)?;
        tracing::info!(
            endpoint = %config.backend.graphql_endpoint,
            region = %config.backend.region,
            user_pool = %config.identity.user_pool_id,
            "configured backend"
        );
        Self::new(config, Arc::new(api), Arc::new(identity))
    }
}

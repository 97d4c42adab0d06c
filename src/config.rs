use std::{collections::HashMap, time::Duration};

use crate::backend::AuthMode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No {0} Specified")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Everything the service needs from its environment, loaded once at
/// startup and handed to [`crate::AppState::new`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub template_dir: String,
    pub static_dir: String,
    pub secure_cookies: bool,
    pub backend: BackendConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub graphql_endpoint: String,
    pub region: String,
    pub default_auth_mode: AuthMode,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub user_pool_id: String,
    pub client_id: String,
    pub endpoint: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str| -> Option<String> {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let region = require("AWS_REGION")?;

        let default_auth_mode = match get("GRAPHQL_AUTH_MODE") {
            Some(mode) => mode.parse().map_err(|_| ConfigError::Invalid {
                key: "GRAPHQL_AUTH_MODE",
                value: mode,
            })?,
            None => AuthMode::AmazonCognitoUserPools,
        };
        let api_key = get("GRAPHQL_API_KEY");
        if default_auth_mode == AuthMode::ApiKey && api_key.is_none() {
            return Err(ConfigError::Missing("GRAPHQL_API_KEY"));
        }

        let timeout_secs: u64 = match get("HTTP_TIMEOUT_SECS") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS",
                value: v,
            })?,
            None => 10,
        };

        let secure_cookies = match get("SECURE_COOKIES").as_deref() {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "SECURE_COOKIES",
                    value: other.to_string(),
                });
            }
        };

        let identity = IdentityConfig {
            user_pool_id: require("USER_POOL_ID")?,
            client_id: require("USER_POOL_CLIENT_ID")?,
            endpoint: get("COGNITO_ENDPOINT")
                .unwrap_or_else(|| format!("https://cognito-idp.{region}.amazonaws.com/")),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            template_dir: get("TEMPLATE_DIR").unwrap_or_else(|| "templates/".to_string()),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| "static".to_string()),
            secure_cookies,
            backend: BackendConfig {
                graphql_endpoint: require("GRAPHQL_ENDPOINT")?,
                region,
                default_auth_mode,
                api_key,
                timeout: Duration::from_secs(timeout_secs),
            },
            identity,
        })
    }
}

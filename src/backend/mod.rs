//! Client side of the managed GraphQL backend that owns the posts.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::Session;

pub mod appsync;

pub use appsync::AppSyncClient;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreatePostInput {
    pub message: String,
}

/// How a request to the backend is authorized, as configured by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    ApiKey,
    AmazonCognitoUserPools,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "API_KEY" => Ok(AuthMode::ApiKey),
            "AMAZON_COGNITO_USER_POOLS" => Ok(AuthMode::AmazonCognitoUserPools),
            other => Err(format!("unsupported auth mode {other}")),
        }
    }
}

/// The credential attached to a single backend call.
#[derive(Clone, PartialEq, Eq)]
pub enum Authorization {
    ApiKey,
    /// Signed-in user; carries the identity provider's id token.
    UserPool(String),
}

impl Authorization {
    pub fn mode(&self) -> AuthMode {
        match self {
            Authorization::ApiKey => AuthMode::ApiKey,
            Authorization::UserPool(_) => AuthMode::AmazonCognitoUserPools,
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authorization::ApiKey => f.write_str("ApiKey"),
            Authorization::UserPool(_) => f.write_str("UserPool(..)"),
        }
    }
}

/// One entry of a GraphQL `errors` list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "errorType", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    GraphQl,
    Unauthorized,
    MissingCredentials,
    Transport,
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend answered with a structured error list. Displays as the
    /// first entry's message.
    #[error("{message}")]
    GraphQl {
        message: String,
        errors: Vec<GraphQlError>,
    },
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("No signed-in user for this request")]
    MissingCredentials,
    #[error("Backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed backend response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// An empty list has no first message to carry, so it is malformed.
    pub fn from_errors(errors: Vec<GraphQlError>) -> Self {
        match errors.first() {
            Some(first) => ApiError::GraphQl {
                message: first.message.clone(),
                errors,
            },
            None => ApiError::Malformed("empty error list".to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::GraphQl { .. } => ErrorKind::GraphQl,
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::MissingCredentials => ErrorKind::MissingCredentials,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Malformed(_) => ErrorKind::Malformed,
        }
    }
}

#[async_trait]
pub trait ApiGateway: Send + Sync {
    async fn list_posts(&self, auth: &Authorization) -> Result<Vec<Post>, ApiError>;

    async fn get_post(&self, auth: &Authorization, id: &str) -> Result<Option<Post>, ApiError>;

    async fn create_post(
        &self,
        auth: &Authorization,
        input: &CreatePostInput,
    ) -> Result<Post, ApiError>;
}

/// Per-request view of who is calling, independent of any web framework.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    pub session: Option<&'a Session>,
    pub default_auth_mode: AuthMode,
}

impl<'a> RequestContext<'a> {
    pub fn new(session: Option<&'a Session>, default_auth_mode: AuthMode) -> Self {
        Self {
            session,
            default_auth_mode,
        }
    }

    pub fn authorization(&self) -> Result<Authorization, ApiError> {
        match self.default_auth_mode {
            AuthMode::ApiKey => Ok(Authorization::ApiKey),
            AuthMode::AmazonCognitoUserPools => self.user_authorization(),
        }
    }

    pub fn user_authorization(&self) -> Result<Authorization, ApiError> {
        self.session
            .map(|s| Authorization::UserPool(s.id_token.clone()))
            .ok_or(ApiError::MissingCredentials)
    }
}

/// Reads the current posts with the context's default authorization.
pub async fn fetch_posts(
    ctx: &RequestContext<'_>,
    api: &dyn ApiGateway,
) -> Result<Vec<Post>, ApiError> {
    let auth = ctx.authorization()?;
    let posts = api.list_posts(&auth).await?;
    tracing::debug!(count = posts.len(), "fetched posts");
    Ok(posts)
}

pub async fn fetch_post(
    ctx: &RequestContext<'_>,
    api: &dyn ApiGateway,
    id: &str,
) -> Result<Option<Post>, ApiError> {
    let auth = ctx.authorization()?;
    api.get_post(&auth, id).await
}

/// Creates a post as the signed-in user. Structured backend errors are
/// logged entry by entry before being returned.
pub async fn submit_post(
    ctx: &RequestContext<'_>,
    api: &dyn ApiGateway,
    input: CreatePostInput,
) -> Result<Post, ApiError> {
    let auth = ctx.user_authorization()?;
    match api.create_post(&auth, &input).await {
        Ok(post) => {
            tracing::info!(post_id = %post.id, "created post");
            Ok(post)
        }
        Err(err) => {
            match &err {
                ApiError::GraphQl { errors, .. } => {
                    for entry in errors {
                        tracing::error!(
                            error_message = %entry.message,
                            error_type = entry.error_type.as_deref().unwrap_or("-"),
                            "createPost failed"
                        );
                    }
                }
                other => tracing::error!(kind = ?other.kind(), error = %other, "createPost failed"),
            }
            Err(err)
        }
    }
}

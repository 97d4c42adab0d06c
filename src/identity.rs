//! Sign-in and sign-out against the managed user pool.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{BackendConfig, IdentityConfig};

/// Tokens issued for a signed-in user.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Session {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{0}")]
    Rejected(String),
    #[error("Additional sign-in step required: {0}")]
    ChallengeRequired(String),
    #[error("Identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed identity provider response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, username: &str, password: &str) -> Result<Session, IdentityError>;

    async fn sign_out(&self, session: &Session) -> Result<(), IdentityError>;
}

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    id_token: String,
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct ServiceError {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Cognito user-pool JSON API client.
pub struct CognitoIdentityProvider {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
}

impl CognitoIdentityProvider {
    pub fn new(config: &IdentityConfig, backend: &BackendConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder().timeout(backend.timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            client_id: config.client_id.clone(),
        })
    }

    async fn call(&self, action: &str, payload: serde_json::Value) -> Result<String, IdentityError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{action}"))
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        match serde_json::from_str::<ServiceError>(&body) {
            Ok(err) => {
                tracing::warn!(action, kind = %err.kind, "identity provider rejected request");
                Err(IdentityError::Rejected(err.message))
            }
            Err(_) => Err(IdentityError::Malformed(format!("HTTP {status}"))),
        }
    }
}

fn session_from_initiate_auth(body: &str) -> Result<Session, IdentityError> {
    let parsed: InitiateAuthResponse =
        serde_json::from_str(body).map_err(|e| IdentityError::Malformed(e.to_string()))?;
    match (parsed.authentication_result, parsed.challenge_name) {
        (Some(result), _) => Ok(Session {
            id_token: result.id_token,
            access_token: result.access_token,
            refresh_token: result.refresh_token,
        }),
        (None, Some(challenge)) => Err(IdentityError::ChallengeRequired(challenge)),
        (None, None) => Err(IdentityError::Malformed(
            "no authentication result".to_string(),
        )),
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn sign_in(&self, username: &str, password: &str) -> Result<Session, IdentityError> {
        let body = self
            .call(
                "InitiateAuth",
                json!({
                    "AuthFlow": "USER_PASSWORD_AUTH",
                    "ClientId": self.client_id,
                    "AuthParameters": {
                        "USERNAME": username,
                        "PASSWORD": password,
                    },
                }),
            )
            .await?;
        session_from_initiate_auth(&body)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        self.call("GlobalSignOut", json!({ "AccessToken": session.access_token }))
            .await
            .map(|_| ())
    }
}

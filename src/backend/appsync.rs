use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use super::{ApiError, ApiGateway, Authorization, CreatePostInput, GraphQlError, Post};
use crate::config::BackendConfig;

const LIST_POSTS: &str = r#"query ListPosts($filter: ModelPostFilterInput, $limit: Int, $nextToken: String) {
  listPosts(filter: $filter, limit: $limit, nextToken: $nextToken) {
    items {
      id
      message
    }
    nextToken
  }
}"#;

const GET_POST: &str = r#"query GetPost($id: ID!) {
  getPost(id: $id) {
    id
    message
  }
}"#;

const CREATE_POST: &str = r#"mutation CreatePost($input: CreatePostInput!, $condition: ModelPostConditionInput) {
  createPost(input: $input, condition: $condition) {
    id
    message
  }
}"#;

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct ListPostsData {
    #[serde(rename = "listPosts")]
    list_posts: Option<PostConnection>,
}

#[derive(Deserialize)]
struct PostConnection {
    #[serde(default)]
    items: Vec<Option<Post>>,
}

#[derive(Deserialize)]
struct GetPostData {
    #[serde(rename = "getPost")]
    get_post: Option<Post>,
}

#[derive(Deserialize)]
struct CreatePostData {
    #[serde(rename = "createPost")]
    create_post: Option<Post>,
}

/// GraphQL over HTTPS against an AppSync-style endpoint.
pub struct AppSyncClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl AppSyncClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.graphql_endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        auth: &Authorization,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<T, ApiError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));

        request = match auth {
            Authorization::ApiKey => {
                let key = self
                    .api_key
                    .as_deref()
                    .ok_or(ApiError::MissingCredentials)?;
                request.header("x-api-key", key)
            }
            Authorization::UserPool(id_token) => request.header(AUTHORIZATION, id_token),
        };

        tracing::debug!(operation, auth_mode = ?auth.mode(), "graphql request");
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_response(status, &body)
    }
}

/// Turns an HTTP status plus body into data or a typed failure. Any
/// non-empty `errors` list fails the call, even alongside partial data.
fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    let unauthorized_status = status == 401 || status == 403;

    let parsed: GraphQlResponse<T> = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if unauthorized_status => {
            return Err(ApiError::Unauthorized(format!("HTTP {status}")));
        }
        Err(e) => return Err(ApiError::Malformed(format!("HTTP {status}: {e}"))),
    };

    let errors = parsed.errors.unwrap_or_default();
    if let Some(first) = errors.first() {
        if unauthorized_status || first.error_type.as_deref() == Some("UnauthorizedException") {
            return Err(ApiError::Unauthorized(first.message.clone()));
        }
        return Err(ApiError::from_errors(errors));
    }

    if unauthorized_status {
        return Err(ApiError::Unauthorized(format!("HTTP {status}")));
    }

    parsed
        .data
        .ok_or_else(|| ApiError::Malformed(format!("HTTP {status}: no data and no errors")))
}

#[async_trait]
impl ApiGateway for AppSyncClient {
    async fn list_posts(&self, auth: &Authorization) -> Result<Vec<Post>, ApiError> {
        let data: ListPostsData = self.execute(auth, "ListPosts", LIST_POSTS, json!({})).await?;
        Ok(data
            .list_posts
            .map(|connection| connection.items.into_iter().flatten().collect())
            .unwrap_or_default())
    }

    async fn get_post(&self, auth: &Authorization, id: &str) -> Result<Option<Post>, ApiError> {
        let data: GetPostData = self
            .execute(auth, "GetPost", GET_POST, json!({ "id": id }))
            .await?;
        Ok(data.get_post)
    }

    async fn create_post(
        &self,
        auth: &Authorization,
        input: &CreatePostInput,
    ) -> Result<Post, ApiError> {
        let data: CreatePostData = self
            .execute(auth, "CreatePost", CREATE_POST, json!({ "input": input }))
            .await?;
        data.create_post
            .ok_or_else(|| ApiError::Malformed("createPost returned null".to_string()))
    }
}

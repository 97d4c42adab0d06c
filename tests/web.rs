use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use amplipost::{
    AppState, Post,
    backend::{ApiError, ApiGateway, AuthMode, Authorization, CreatePostInput, GraphQlError},
    config::Config,
    identity::{IdentityError, IdentityProvider, Session},
    routes,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use tower::ServiceExt;

const SIGNED_IN: &str = "id_token=test-id-token; access_token=test-access-token";

enum CreateOutcome {
    Created(&'static str),
    Errors(Vec<&'static str>),
}

enum ListOutcome {
    Posts(Vec<Post>),
    Unauthorized,
    Broken,
}

struct MockGateway {
    list: ListOutcome,
    create: CreateOutcome,
    list_calls: Mutex<Vec<Authorization>>,
    create_calls: Mutex<Vec<(Authorization, CreatePostInput)>>,
}

impl MockGateway {
    fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            list: ListOutcome::Posts(posts),
            create: CreateOutcome::Created("abc123"),
            list_calls: Mutex::new(Vec::new()),
            create_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ApiGateway for MockGateway {
    async fn list_posts(&self, auth: &Authorization) -> Result<Vec<Post>, ApiError> {
        self.list_calls.lock().unwrap().push(auth.clone());
        match &self.list {
            ListOutcome::Posts(posts) => Ok(posts.clone()),
            ListOutcome::Unauthorized => Err(ApiError::Unauthorized("token expired".to_string())),
            ListOutcome::Broken => Err(ApiError::Malformed("HTTP 500".to_string())),
        }
    }

    async fn get_post(&self, _auth: &Authorization, id: &str) -> Result<Option<Post>, ApiError> {
        match &self.list {
            ListOutcome::Posts(posts) => Ok(posts.iter().find(|p| p.id == id).cloned()),
            _ => Ok(None),
        }
    }

    async fn create_post(
        &self,
        auth: &Authorization,
        input: &CreatePostInput,
    ) -> Result<Post, ApiError> {
        self.create_calls
            .lock()
            .unwrap()
            .push((auth.clone(), input.clone()));
        match &self.create {
            CreateOutcome::Created(id) => Ok(Post {
                id: id.to_string(),
                message: input.message.clone(),
            }),
            CreateOutcome::Errors(messages) => Err(ApiError::from_errors(
                messages.iter().map(|m| GraphQlError::new(*m)).collect(),
            )),
        }
    }
}

#[derive(Default)]
struct MockIdentity {
    sign_outs: Mutex<Vec<Session>>,
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn sign_in(&self, username: &str, password: &str) -> Result<Session, IdentityError> {
        if username == "alice" && password == "correct horse" {
            Ok(Session {
                id_token: "new-id".to_string(),
                access_token: "new-access".to_string(),
                refresh_token: Some("new-refresh".to_string()),
            })
        } else {
            Err(IdentityError::Rejected(
                "Incorrect username or password.".to_string(),
            ))
        }
    }

    async fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        self.sign_outs.lock().unwrap().push(session.clone());
        Ok(())
    }
}

fn test_config() -> Config {
    let vars: HashMap<String, String> = [
        ("AWS_REGION", "ap-northeast-1"),
        ("GRAPHQL_ENDPOINT", "http://127.0.0.1:9/graphql"),
        ("USER_POOL_ID", "ap-northeast-1_test"),
        ("USER_POOL_CLIENT_ID", "test-client"),
        ("TEMPLATE_DIR", "templates/"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    Config::from_vars(&vars).expect("test config")
}

fn app(api: Arc<MockGateway>, identity: Arc<MockIdentity>) -> Router {
    let state = AppState::new(&test_config(), api, identity).expect("app state");
    routes::build_router(state, "static")
}

fn post(id: &str, message: &str) -> Post {
    Post {
        id: id.to_string(),
        message: message.to_string(),
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

fn form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn home_lists_every_post() {
    let api = Arc::new(MockGateway::with_posts(vec![
        post("p1", "first"),
        post("p2", "second"),
        post("p3", "third"),
    ]));
    let response = app(api.clone(), Arc::default())
        .oneshot(get("/", Some(SIGNED_IN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"<code class="code">3</code>"#));
    assert_eq!(html.matches(r#"href="/posts/"#).count(), 3);
    assert!(html.contains(r#"href="/posts/p2""#));
    assert!(html.contains("second"));

    let calls = api.list_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], Authorization::UserPool("test-id-token".to_string()));
}

#[tokio::test]
async fn home_with_no_posts_still_shows_form() {
    let api = Arc::new(MockGateway::with_posts(Vec::new()));
    let response = app(api, Arc::default())
        .oneshot(get("/", Some(SIGNED_IN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"<code class="code">0</code>"#));
    assert_eq!(html.matches(r#"href="/posts/"#).count(), 0);
    assert!(html.contains(r#"<form method="post" action="/posts">"#));
    assert!(html.contains(r#"name="message""#));
    assert!(html.contains(r#"name="content""#));
}

#[tokio::test]
async fn home_escapes_messages() {
    let api = Arc::new(MockGateway::with_posts(vec![post("x", "<script>alert(1)</script>")]));
    let html = body_text(
        app(api, Arc::default())
            .oneshot(get("/", Some(SIGNED_IN)))
            .await
            .unwrap(),
    )
    .await;
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn home_requires_sign_in() {
    let api = Arc::new(MockGateway::with_posts(vec![post("p1", "first")]));
    let response = app(api.clone(), Arc::default())
        .oneshot(get("/", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(api.list_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_token_sends_user_to_login() {
    let mut api = MockGateway::with_posts(Vec::new());
    api.list = ListOutcome::Unauthorized;
    let response = app(Arc::new(api), Arc::default())
        .oneshot(get("/", Some(SIGNED_IN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn failed_list_fetch_is_a_bad_gateway() {
    let mut api = MockGateway::with_posts(Vec::new());
    api.list = ListOutcome::Broken;
    let response = app(Arc::new(api), Arc::default())
        .oneshot(get("/", Some(SIGNED_IN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn submit_sends_message_as_signed_in_user() {
    let api = Arc::new(MockGateway::with_posts(Vec::new()));
    let response = app(api.clone(), Arc::default())
        .oneshot(form(
            "/posts",
            Some(SIGNED_IN),
            "message=hello&content=never+sent",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/abc123");

    let calls = api.create_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (auth, input) = &calls[0];
    assert_eq!(auth.mode(), AuthMode::AmazonCognitoUserPools);
    assert_eq!(auth, &Authorization::UserPool("test-id-token".to_string()));
    assert_eq!(input.message, "hello");
}

#[tokio::test]
async fn submit_failure_reports_first_error() {
    let mut api = MockGateway::with_posts(Vec::new());
    api.create = CreateOutcome::Errors(vec!["X", "Y"]);
    let api = Arc::new(api);
    let response = app(api.clone(), Arc::default())
        .oneshot(form("/posts", Some(SIGNED_IN), "message=hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "X");
    assert_eq!(api.create_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn created_id_stays_one_path_segment() {
    for (id, expected) in [
        ("a/b?c#d", "/posts/a%2Fb%3Fc%23d"),
        ("a b", "/posts/a%20b"),
        ("投稿1", "/posts/%E6%8A%95%E7%A8%BF1"),
    ] {
        let mut api = MockGateway::with_posts(Vec::new());
        api.create = CreateOutcome::Created(id);
        let response = app(Arc::new(api), Arc::default())
            .oneshot(form("/posts", Some(SIGNED_IN), "message=hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), expected);
    }
}

#[tokio::test]
async fn encoded_id_reaches_detail_route() {
    let api = Arc::new(MockGateway::with_posts(vec![post("a/b?c#d", "tricky")]));
    let response = app(api, Arc::default())
        .oneshot(get("/posts/a%2Fb%3Fc%23d", Some(SIGNED_IN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("tricky"));
}

#[tokio::test]
async fn submit_without_session_never_reaches_backend() {
    let api = Arc::new(MockGateway::with_posts(Vec::new()));
    let response = app(api.clone(), Arc::default())
        .oneshot(form("/posts", None, "message=hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(api.create_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn post_detail_renders_and_404s() {
    let api = Arc::new(MockGateway::with_posts(vec![post("abc123", "hello there")]));
    let router = app(api, Arc::default());

    let response = router
        .clone()
        .oneshot(get("/posts/abc123", Some(SIGNED_IN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("hello there"));

    let response = router
        .oneshot(get("/posts/missing", Some(SIGNED_IN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sign_in_sets_session_cookies() {
    let api = Arc::new(MockGateway::with_posts(Vec::new()));
    let response = app(api, Arc::default())
        .oneshot(form(
            "/login",
            None,
            "username=alice&password=correct+horse",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookies: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("id_token=new-id")));
    assert!(cookies.iter().any(|c| c.starts_with("access_token=new-access")));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
}

#[tokio::test]
async fn bad_credentials_rerender_login() {
    let api = Arc::new(MockGateway::with_posts(Vec::new()));
    let response = app(api, Arc::default())
        .oneshot(form("/login", None, "username=alice&password=nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let html = body_text(response).await;
    assert!(html.contains("Incorrect username or password."));
    assert!(html.contains(r#"value="alice""#));
}

#[tokio::test]
async fn sign_out_calls_provider_once() {
    let api = Arc::new(MockGateway::with_posts(Vec::new()));
    let identity = Arc::new(MockIdentity::default());
    let response = app(api, identity.clone())
        .oneshot(form("/logout", Some(SIGNED_IN), ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let sign_outs = identity.sign_outs.lock().unwrap();
    assert_eq!(sign_outs.len(), 1);
    assert_eq!(sign_outs[0].access_token, "test-access-token");

    let removed: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(removed.iter().any(|c| c.starts_with("id_token=;")));
}

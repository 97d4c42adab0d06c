use std::sync::Arc;

use axum::Form;
use axum::extract::{Extension, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use serde_json::json;

use crate::AppState;
use crate::backend::{
    ApiError, CreatePostInput, RequestContext, fetch_post, fetch_posts, submit_post,
};
use crate::identity::IdentityError;
use crate::session::{UserState, clear_session, get_user_session, store_session};

const DEFAULT_MESSAGE: &str = "Amplify + Next.js + Typescriptでアプリつくってみた!";
const DEFAULT_CONTENT: &str = "I built an Amplify project with Next.js!";

pub async fn session_middleware(cookie_jar: CookieJar, mut req: Request, nxt: Next) -> Response {
    let user_state = get_user_session(&cookie_jar);
    req.extensions_mut().insert(user_state);
    nxt.run(req).await
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Backend(#[from] ApiError),
    #[error("Error rendering page")]
    Render(#[from] handlebars::RenderError),
    #[error("Post not found")]
    NotFound,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::Backend(ApiError::Unauthorized(reason)) => {
                tracing::info!(%reason, "backend rejected credentials");
                Redirect::to("/login").into_response()
            }
            WebError::Backend(ApiError::MissingCredentials) => {
                Redirect::to("/login").into_response()
            }
            WebError::Backend(e) => {
                tracing::error!(kind = ?e.kind(), error = %e, "backend call failed");
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
            WebError::Render(e) => {
                tracing::error!(error = %e, "template render failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error rendering page").into_response()
            }
            WebError::NotFound => (StatusCode::NOT_FOUND, "Post not found").into_response(),
        }
    }
}

fn render<T: Serialize>(app_state: &AppState, name: &str, data: &T) -> Result<Html<String>, WebError> {
    Ok(Html(app_state.templates.render(name, data)?))
}

#[axum::debug_handler]
pub async fn home(
    app_state: State<Arc<AppState>>,
    Extension(user_state): Extension<UserState>,
) -> Result<Response, WebError> {
    // The page is only shown to signed-in users.
    if user_state.session().is_none() {
        return Ok(Redirect::to("/login").into_response());
    }

    let ctx = RequestContext::new(user_state.session(), app_state.default_auth_mode);
    let posts = fetch_posts(&ctx, app_state.api.as_ref()).await?;

    Ok(render(
        &app_state,
        "home",
        &json!({
            "posts": posts,
            "post_count": posts.len(),
            "default_message": DEFAULT_MESSAGE,
            "default_content": DEFAULT_CONTENT,
        }),
    )?
    .into_response())
}

#[axum::debug_handler]
pub async fn view_post(
    app_state: State<Arc<AppState>>,
    Path(post_id): Path<String>,
    Extension(user_state): Extension<UserState>,
) -> Result<Response, WebError> {
    if user_state.session().is_none() {
        return Ok(Redirect::to("/login").into_response());
    }

    let ctx = RequestContext::new(user_state.session(), app_state.default_auth_mode);
    let post = fetch_post(&ctx, app_state.api.as_ref(), &post_id)
        .await?
        .ok_or(WebError::NotFound)?;

    Ok(render(&app_state, "post-view", &json!({ "post": post }))?.into_response())
}

#[derive(serde::Deserialize)]
pub struct NewPostForm {
    message: String,
    // Rendered on the page but never sent to the backend.
    #[serde(default)]
    content: Option<String>,
}

#[axum::debug_handler]
pub async fn create_post(
    app_state: State<Arc<AppState>>,
    Extension(user_state): Extension<UserState>,
    Form(form): Form<NewPostForm>,
) -> Result<Response, WebError> {
    if let Some(content) = form.content.as_deref().filter(|c| !c.trim().is_empty()) {
        tracing::debug!(len = content.len(), "ignoring content field");
    }

    let ctx = RequestContext::new(user_state.session(), app_state.default_auth_mode);
    let post = submit_post(
        &ctx,
        app_state.api.as_ref(),
        CreatePostInput {
            message: form.message,
        },
    )
    .await?;

    // The id is opaque; keep it a single path segment.
    Ok(Redirect::to(&format!("/posts/{}", urlencoding::encode(&post.id))).into_response())
}

#[axum::debug_handler]
pub async fn login_view(app_state: State<Arc<AppState>>) -> Result<Response, WebError> {
    Ok(render(&app_state, "login", &json!({}))?.into_response())
}

#[derive(serde::Deserialize)]
pub struct LoginFormData {
    username: String,
    password: String,
}

#[axum::debug_handler]
pub async fn login_handler(
    app_state: State<Arc<AppState>>,
    cookie_jar: CookieJar,
    Form(form): Form<LoginFormData>,
) -> Result<Response, WebError> {
    match app_state
        .identity
        .sign_in(form.username.trim(), &form.password)
        .await
    {
        Ok(session) => {
            tracing::info!(username = %form.username.trim(), "signed in");
            let jar = store_session(cookie_jar, session, app_state.secure_cookies);
            Ok((jar, Redirect::to("/")).into_response())
        }
        Err(e @ (IdentityError::Rejected(_) | IdentityError::ChallengeRequired(_))) => {
            let page = render(
                &app_state,
                "login",
                &json!({ "error": e.to_string(), "username": form.username }),
            )?;
            Ok((StatusCode::UNAUTHORIZED, page).into_response())
        }
        Err(e) => {
            tracing::error!(error = %e, "sign-in failed");
            Ok((StatusCode::BAD_GATEWAY, e.to_string()).into_response())
        }
    }
}

#[axum::debug_handler]
pub async fn logout_handler(
    app_state: State<Arc<AppState>>,
    Extension(user_state): Extension<UserState>,
    cookie_jar: CookieJar,
) -> impl IntoResponse {
    if let Some(session) = user_state.session() {
        if let Err(e) = app_state.identity.sign_out(session).await {
            tracing::warn!(error = %e, "sign-out call failed");
        }
    }

    (clear_session(cookie_jar), Redirect::to("/login"))
}

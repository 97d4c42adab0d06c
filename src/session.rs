use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::identity::Session;

const ID_TOKEN: &str = "id_token";
const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";

#[derive(Clone, Debug)]
pub enum UserState {
    SignedIn(Session),
    SignedOut,
}

impl UserState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            UserState::SignedIn(session) => Some(session),
            UserState::SignedOut => None,
        }
    }
}

fn cookie_value<'a>(cookie_jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    cookie_jar
        .get(name)
        .map(|c| c.value_trimmed())
        .filter(|v| !v.is_empty())
}

/// Token validity is left to the backend; a rejected token surfaces as an
/// unauthorized error on the first call that uses it.
pub fn get_user_session(cookie_jar: &CookieJar) -> UserState {
    match (
        cookie_value(cookie_jar, ID_TOKEN),
        cookie_value(cookie_jar, ACCESS_TOKEN),
    ) {
        (Some(id_token), Some(access_token)) => UserState::SignedIn(Session {
            id_token: id_token.to_string(),
            access_token: access_token.to_string(),
            refresh_token: cookie_value(cookie_jar, REFRESH_TOKEN).map(str::to_string),
        }),
        _ => UserState::SignedOut,
    }
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

pub fn store_session(cookie_jar: CookieJar, session: Session, secure: bool) -> CookieJar {
    let mut jar = cookie_jar
        .add(session_cookie(ID_TOKEN, session.id_token, secure))
        .add(session_cookie(ACCESS_TOKEN, session.access_token, secure));
    if let Some(refresh_token) = session.refresh_token {
        jar = jar.add(session_cookie(REFRESH_TOKEN, refresh_token, secure));
    }
    jar
}

pub fn clear_session(cookie_jar: CookieJar) -> CookieJar {
    [ID_TOKEN, ACCESS_TOKEN, REFRESH_TOKEN]
        .into_iter()
        .fold(cookie_jar, |jar, name| {
            jar.remove(Cookie::build(name).path("/"))
        })
}

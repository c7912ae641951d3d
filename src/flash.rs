//! One-shot user notices carried across a redirect in a cookie.

use actix_web::cookie::{Cookie, SameSite};
use actix_web::HttpRequest;
use base64::{engine::general_purpose, Engine as _};

pub const COOKIE_NAME: &str = "notifications";

pub fn encode(messages: &[String]) -> String {
    let json = serde_json::to_vec(messages).unwrap_or_else(|_| b"[]".to_vec());
    general_purpose::URL_SAFE_NO_PAD.encode(json)
}

/// Undecodable cookies are treated as empty.
pub fn decode(value: &str) -> Vec<String> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(value)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

/// Pending notices on this request. Pair with [`removal`] on the response.
pub fn take(req: &HttpRequest) -> Vec<String> {
    req.cookie(COOKIE_NAME)
        .map(|c| decode(c.value()))
        .unwrap_or_default()
}

pub fn cookie(messages: &[String]) -> Cookie<'static> {
    Cookie::build(COOKIE_NAME, encode(messages))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

pub fn notice(message: impl Into<String>) -> Cookie<'static> {
    cookie(&[message.into()])
}

/// Appends to whatever notices the request already carries.
pub fn push(req: &HttpRequest, message: impl Into<String>) -> Cookie<'static> {
    let mut messages = take(req);
    messages.push(message.into());
    cookie(&messages)
}

pub fn removal() -> Cookie<'static> {
    let mut cookie = Cookie::build(COOKIE_NAME, "").path("/").finish();
    cookie.make_removal();
    cookie
}

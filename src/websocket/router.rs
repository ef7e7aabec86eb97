//! Channel Router
//!
//! Decides, from the request path and query string alone, which channel an
//! upgrade request joins. Runs before the WebSocket handshake completes so
//! rejected requests never reach the hub.

use axum::http::StatusCode;
use std::borrow::Cow;

use super::registry::Channel;

/// Path of the public viewer channel
pub const PUBLIC_PATH: &str = "/public";
/// Path of the admin channel
pub const ADMIN_PATH: &str = "/admin";

/// Why an upgrade request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// `/admin` without the right token
    Unauthorized,
    /// Any path other than `/public` and `/admin`
    UnknownPath,
}

impl Rejection {
    /// HTTP status answered in place of the upgrade
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED,
            Rejection::UnknownPath => StatusCode::NOT_FOUND,
        }
    }
}

/// Outcome of routing one upgrade request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Accept(Channel),
    Reject(Rejection),
}

/// Resolves upgrade requests to channels
#[derive(Debug, Clone)]
pub struct ChannelRouter {
    admin_token: String,
}

impl ChannelRouter {
    /// Create a router that admits admins presenting `admin_token`
    pub fn new(admin_token: impl Into<String>) -> Self {
        Self {
            admin_token: admin_token.into(),
        }
    }

    /// Route an upgrade request by path and raw query string
    ///
    /// When `token` appears more than once only the first occurrence counts.
    pub fn resolve_upgrade(&self, path: &str, query: Option<&str>) -> RouteDecision {
        match path {
            PUBLIC_PATH => RouteDecision::Accept(Channel::Public),
            ADMIN_PATH => match query.and_then(|q| query_param(q, "token")) {
                Some(token) if token == self.admin_token => RouteDecision::Accept(Channel::Admin),
                _ => RouteDecision::Reject(Rejection::Unauthorized),
            },
            _ => RouteDecision::Reject(Rejection::UnknownPath),
        }
    }
}

/// First value of `key` in a form-encoded query string
///
/// Values that do not decode to UTF-8 count as absent.
fn query_param<'a>(query: &'a str, key: &str) -> Option<Cow<'a, str>> {
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(name, _)| decode(name).as_deref() == Some(key))
        .and_then(|(_, value)| decode(value))
}

fn decode(raw: &str) -> Option<Cow<'_, str>> {
    if raw.contains('+') {
        let spaced = raw.replace('+', " ");
        urlencoding::decode(&spaced)
            .ok()
            .map(|value| Cow::Owned(value.into_owned()))
    } else {
        urlencoding::decode(raw).ok()
    }
}

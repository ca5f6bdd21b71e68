//! Caller identification for rate limiting, logging and supersession.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::Request};

/// Identity used when neither a forwarded address nor a peer is known.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Header set by reverse proxies with the originating client address.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Header carrying the browser session that issued the request.
pub const CLIENT_SESSION_HEADER: &str = "x-client-session";

/// Longest accepted session identifier.
pub const MAX_SESSION_CHARS: usize = 128;

/// Identify the caller of `request`.
///
/// The first entry of `x-forwarded-for` wins, then the transport peer's IP
/// address, then [`UNKNOWN_CALLER`].
#[must_use]
pub fn caller_identity<B>(request: &Request<B>) -> String {
    forwarded_for(request)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| UNKNOWN_CALLER.to_owned())
}

fn forwarded_for<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(FORWARDED_FOR_HEADER)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(ToOwned::to_owned)
}

/// The client session named by `request`, if any.
///
/// Blank, non-text or overlong values count as absent.
#[must_use]
pub fn client_session<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(CLIENT_SESSION_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|session| !session.is_empty() && session.chars().count() <= MAX_SESSION_CHARS)
        .map(ToOwned::to_owned)
}

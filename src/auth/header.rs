//! Authorization header parsing.

use axum::http::{HeaderMap, header};

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// Returns None if the header is missing, not valid UTF-8, uses another
/// scheme, or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}

//! Client IP extraction for rate limiting.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{HeaderName, Request},
};

/// Extract the client IP address.
///
/// If `ip_header` is set (running behind a proxy), the first address in that
/// header is used and a missing or unparsable header is an error; there is no
/// fallback to the socket address. Otherwise the `ConnectInfo` address is used.
pub fn extract_client_ip<B>(
    source: &Request<B>,
    ip_header: Option<&HeaderName>,
) -> Result<IpAddr, &'static str> {
    match ip_header {
        Some(name) => {
            let value = source
                .headers()
                .get(name)
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            value
                .split(',')
                .next()
                .map(str::trim)
                .and_then(|ip| ip.parse().ok())
                .ok_or("IP header does not contain an address")
        }
        None => source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
            .ok_or("No client IP available"),
    }
}

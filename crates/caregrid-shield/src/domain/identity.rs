//! Client identity resolution from proxy headers.
//!
//! Identity is the first comma-separated value of `X-Forwarded-For` when the
//! header is present, otherwise the direct peer address. Header authenticity
//! is not validated; the deployment topology places a trusted proxy in front
//! of every worker and the guards treat the value as an opaque key.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Proxy header consulted for the originating address
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Resolve the identity string for an inbound request.
///
/// Falls back to loopback when neither a forwarded-for value nor a peer
/// address is available (requests driven outside a real listener).
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get(FORWARDED_FOR_HEADER) {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "127.0.0.1".to_string(),
    }
}

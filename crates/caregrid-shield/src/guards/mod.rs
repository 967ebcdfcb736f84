//! Guards: the stateful checks the pipeline runs in order.
//!
//! Each guard implements [`Guard::evaluate`] over a [`RequestContext`] and
//! returns Allow or Block. Guards never write block entries themselves; a
//! Block carries [`BlockDirective`]s and the orchestrator performs the store
//! writes, emits the event, and renders the response. Store reads that a
//! guard needs for its own decision (an existing login block, the injection
//! attempt counter) happen inside `evaluate`.

mod api_key;
mod brute_force;
mod flood;
mod inspect;
mod patterns;
mod size;

pub use api_key::ApiKeyGuard;
pub use brute_force::BruteForceGuard;
pub use flood::{EndpointHammerGuard, FloodGuard};
pub use inspect::{PathTraversalInspector, SqlInjectionInspector, XssInspector};
pub use patterns::{ThreatPattern, PATH_TRAVERSAL_PATTERNS, SQL_PATTERNS, XSS_PATTERNS};
pub use size::RequestSizeGuard;

use crate::domain::error::BlockReason;
use crate::domain::events::{EventCategory, Severity};
use crate::domain::exemptions::ExemptionScope;
use crate::store::StoreError;
use async_trait::async_trait;
use axum::http::{request::Parts, HeaderMap, Method};
use bytes::Bytes;
use std::sync::OnceLock;
use std::time::Duration;

/// String values shorter than this are never scanned.
pub const MIN_SCAN_LENGTH: usize = 5;

/// A block entry the orchestrator should write on Block.
#[derive(Debug, Clone)]
pub struct BlockDirective {
    /// Full store key, e.g. `ddos_block:203.0.113.9`
    pub key: String,
    /// Stored metadata; by convention the originating category string
    pub value: String,
    pub ttl: Duration,
}

impl BlockDirective {
    pub fn new(key: String, value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key,
            value: value.into(),
            ttl,
        }
    }
}

/// Everything a Block decision carries: the category and severity for the
/// audit event, the wire-level reason, free-form detail, and the store
/// writes to perform.
#[derive(Debug, Clone)]
pub struct Violation {
    pub category: EventCategory,
    pub severity: Severity,
    pub reason: BlockReason,
    pub details: serde_json::Map<String, serde_json::Value>,
    pub directives: Vec<BlockDirective>,
}

impl Violation {
    pub fn new(category: EventCategory, severity: Severity, reason: BlockReason) -> Self {
        Self {
            category,
            severity,
            reason,
            details: serde_json::Map::new(),
            directives: Vec::new(),
        }
    }

    /// Attach one detail entry (builder style)
    pub fn with_detail(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach a store write for the orchestrator to perform
    pub fn with_directive(mut self, directive: BlockDirective) -> Self {
        self.directives.push(directive);
        self
    }
}

/// Outcome of one guard evaluation
#[derive(Debug)]
pub enum Decision {
    Allow,
    Block(Violation),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// One check in the ordered pipeline.
#[async_trait]
pub trait Guard: Send + Sync {
    /// Stable name used in logs and guard-error events
    fn name(&self) -> &'static str;

    /// Which exemptions bypass this guard
    fn scope(&self) -> &ExemptionScope;

    /// Evaluate the request. Errors mean the guard itself failed (store
    /// unreachable); the orchestrator fails open on them.
    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError>;

    /// Drop in-process tracking state idle for longer than `max_age`.
    /// Guards without local state keep the no-op default.
    fn cleanup(&self, _max_age: Duration) {}
}

/// Immutable per-request view the guards evaluate against.
///
/// Built once at the pipeline boundary; the body is already read (capped)
/// for write methods so inspection never consumes the stream twice.
#[derive(Debug)]
pub struct RequestContext {
    /// Resolved client identity (see [`crate::domain::identity`])
    pub identity: String,
    pub method: Method,
    pub path: String,
    /// Decoded query pairs in arrival order
    pub query: Vec<(String, String)>,
    pub user_agent: Option<String>,
    /// Declared Content-Length, when present and parseable
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    /// Value of the API key header, when present
    pub api_key: Option<String>,
    /// Raw Cookie header, when present
    pub cookies: Option<String>,
    /// Whether an Authorization header was present
    pub authorization: bool,
    /// Raw body bytes for write methods (absent for reads)
    pub body: Option<Bytes>,
    values: OnceLock<Vec<String>>,
}

impl RequestContext {
    /// Minimal context; builder methods fill in the rest. Tests lean on this.
    pub fn new(identity: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            user_agent: None,
            content_length: None,
            content_type: None,
            api_key: None,
            cookies: None,
            authorization: false,
            body: None,
            values: OnceLock::new(),
        }
    }

    /// Build from already-split request parts plus the pre-read body.
    pub fn from_parts(identity: String, parts: &Parts, body: Option<Bytes>) -> Self {
        let mut ctx = Self::new(identity, parts.method.clone(), parts.uri.path().to_string());
        if let Some(raw) = parts.uri.query() {
            ctx.query = parse_query(raw);
        }
        ctx.apply_headers(&parts.headers);
        if let Some(body) = body {
            ctx.content_length = ctx.content_length.or(Some(body.len() as u64));
            ctx.body = Some(body);
        }
        ctx
    }

    fn apply_headers(&mut self, headers: &HeaderMap) {
        self.user_agent = header_str(headers, "user-agent");
        self.content_type = header_str(headers, "content-type");
        self.api_key = header_str(headers, "x-api-key");
        self.cookies = header_str(headers, "cookie");
        self.authorization = headers.contains_key("authorization");
        self.content_length = header_str(headers, "content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());
    }

    pub fn with_query(mut self, raw: &str) -> Self {
        self.query = parse_query(raw);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.content_type = Some(content_type.to_string());
        self.content_length = Some(body.len() as u64);
        self.body = Some(body);
        self
    }

    pub fn with_declared_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_user_agent(mut self, agent: &str) -> Self {
        self.user_agent = Some(agent.to_string());
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_cookies(mut self, cookies: &str) -> Self {
        self.cookies = Some(cookies.to_string());
        self
    }

    pub fn with_authorization(mut self) -> Self {
        self.authorization = true;
        self
    }

    /// POST/PUT/PATCH carry inspectable bodies
    pub fn is_write_method(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }

    /// String values the content inspectors scan: body values for write
    /// methods, query values for GET, nothing otherwise. Values shorter
    /// than [`MIN_SCAN_LENGTH`] are dropped. Computed once per request.
    pub fn inspectable_values(&self) -> &[String] {
        self.values.get_or_init(|| {
            let mut values = if self.is_write_method() {
                self.body_string_values()
            } else if self.method == Method::GET {
                self.query.iter().map(|(_, value)| value.clone()).collect()
            } else {
                Vec::new()
            };
            values.retain(|value| value.len() >= MIN_SCAN_LENGTH);
            values
        })
    }

    fn body_string_values(&self) -> Vec<String> {
        let Some(body) = &self.body else {
            return Vec::new();
        };
        let Ok(text) = std::str::from_utf8(body) else {
            // Binary payloads carry no scannable strings
            return Vec::new();
        };

        let content_type = self.content_type.as_deref().unwrap_or("");
        if content_type.contains("json") {
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(value) => {
                    let mut out = Vec::new();
                    collect_json_strings(&value, &mut out);
                    out
                }
                // Claimed JSON that does not parse is scanned raw
                Err(_) => vec![text.to_string()],
            }
        } else if content_type.contains("x-www-form-urlencoded") {
            parse_query(text).into_iter().map(|(_, value)| value).collect()
        } else {
            vec![text.to_string()]
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Split and percent-decode a query or form-urlencoded string.
fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn collect_json_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_json_strings(item, out);
            }
        }
        _ => {}
    }
}

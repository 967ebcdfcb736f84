//! Content inspectors: SQL injection, cross-site scripting, path traversal.
//!
//! Each inspector compiles its signature table once at construction and scans
//! the request's inspectable string values (write bodies, GET query values).
//! The first matching value blocks the request.
//!
//! Only the SQL inspector escalates: detections feed a rolling attempt
//! counter in the shared store, and an identity that keeps probing earns a
//! full 24-hour block on top of the per-request rejection. XSS and traversal
//! detections stay per-request.

use super::patterns::{self, ThreatPattern, PATH_TRAVERSAL_PATTERNS, SQL_PATTERNS, XSS_PATTERNS};
use super::{BlockDirective, Decision, Guard, RequestContext, Violation};
use crate::domain::error::BlockReason;
use crate::domain::events::{EventCategory, Severity};
use crate::domain::exemptions::ExemptionScope;
use crate::store::{keys, BlockStore, StoreError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Rolling window for the injection attempt counter
pub const SQL_ATTEMPT_WINDOW: Duration = Duration::from_secs(3600);
/// Fixed duration of the escalated full block
pub const IP_BLOCK_DURATION: Duration = Duration::from_secs(24 * 3600);

fn first_match<'a>(
    compiled: &'a [(Regex, &'static ThreatPattern)],
    values: &'a [String],
) -> Option<(&'a str, &'static ThreatPattern)> {
    for value in values {
        for (regex, pattern) in compiled {
            if regex.is_match(value) {
                return Some((value.as_str(), pattern));
            }
        }
    }
    None
}

/// Detects SQL injection probes and escalates repeat offenders.
pub struct SqlInjectionInspector {
    compiled: Vec<(Regex, &'static ThreatPattern)>,
    store: Arc<dyn BlockStore>,
    block_attempts: u32,
    scope: ExemptionScope,
}

impl SqlInjectionInspector {
    pub fn new(store: Arc<dyn BlockStore>, block_attempts: u32, scope: ExemptionScope) -> Self {
        Self {
            compiled: patterns::compile(SQL_PATTERNS),
            store,
            block_attempts,
            scope,
        }
    }
}

#[async_trait]
impl Guard for SqlInjectionInspector {
    fn name(&self) -> &'static str {
        "sql_injection_inspector"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        let Some((_, pattern)) = first_match(&self.compiled, ctx.inspectable_values()) else {
            return Ok(Decision::Allow);
        };

        let attempts = self
            .store
            .increment(&keys::sql_attempts(&ctx.identity), SQL_ATTEMPT_WINDOW)
            .await?;
        let escalated = attempts >= i64::from(self.block_attempts);

        let severity = if escalated {
            Severity::Critical
        } else {
            Severity::High
        };
        let mut violation = Violation::new(
            EventCategory::SqlInjection,
            severity,
            BlockReason::sql_injection(),
        )
        .with_detail("pattern", pattern.name)
        .with_detail("attempts", attempts);

        if escalated {
            violation = violation.with_directive(BlockDirective::new(
                keys::ip_block(&ctx.identity),
                EventCategory::SqlInjection.as_str(),
                IP_BLOCK_DURATION,
            ));
        }

        Ok(Decision::Block(violation))
    }
}

/// Detects cross-site scripting payloads. Never escalates.
pub struct XssInspector {
    compiled: Vec<(Regex, &'static ThreatPattern)>,
    scope: ExemptionScope,
}

impl XssInspector {
    pub fn new(scope: ExemptionScope) -> Self {
        Self {
            compiled: patterns::compile(XSS_PATTERNS),
            scope,
        }
    }
}

#[async_trait]
impl Guard for XssInspector {
    fn name(&self) -> &'static str {
        "xss_inspector"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        match first_match(&self.compiled, ctx.inspectable_values()) {
            Some((_, pattern)) => Ok(Decision::Block(
                Violation::new(EventCategory::Xss, Severity::High, BlockReason::xss())
                    .with_detail("pattern", pattern.name),
            )),
            None => Ok(Decision::Allow),
        }
    }
}

/// Detects directory traversal sequences. Never escalates.
pub struct PathTraversalInspector {
    compiled: Vec<(Regex, &'static ThreatPattern)>,
    scope: ExemptionScope,
}

impl PathTraversalInspector {
    pub fn new(scope: ExemptionScope) -> Self {
        Self {
            compiled: patterns::compile(PATH_TRAVERSAL_PATTERNS),
            scope,
        }
    }
}

#[async_trait]
impl Guard for PathTraversalInspector {
    fn name(&self) -> &'static str {
        "path_traversal_inspector"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        match first_match(&self.compiled, ctx.inspectable_values()) {
            Some((_, pattern)) => Ok(Decision::Block(
                Violation::new(
                    EventCategory::PathTraversal,
                    Severity::High,
                    BlockReason::path_traversal(),
                )
                .with_detail("pattern", pattern.name),
            )),
            None => Ok(Decision::Allow),
        }
    }
}

//! Pipeline orchestration: fixed guard order, short-circuit on first Block.
//!
//! The orchestrator owns the assembled guard chain. Evaluation starts with
//! the block-store fast path (a live block entry rejects before any guard
//! runs), then walks the guards in order, skipping each one whose exemption
//! scope the request satisfies. Guards return directives instead of writing
//! the store themselves; the orchestrator performs the writes, emits the
//! audit event, and hands the rejection reason to the HTTP layer.
//!
//! A guard that fails internally is skipped and the request continues:
//! availability wins over enforcement when enforcement itself is degraded.
//! Every such skip is recorded as a `guard_error` event.

mod layer;

pub use layer::{ShieldLayer, ShieldService};

use crate::domain::config::ShieldConfig;
use crate::domain::error::{codes, BlockReason};
use crate::domain::events::{EventCategory, SecurityEvent, SecurityEventSink, Severity};
use crate::domain::exemptions::{ExemptionRegistry, ExemptionScope};
use crate::guards::{
    ApiKeyGuard, BruteForceGuard, Decision, EndpointHammerGuard, FloodGuard, Guard,
    PathTraversalInspector, RequestContext, RequestSizeGuard, SqlInjectionInspector, Violation,
    XssInspector,
};
use crate::metrics::ShieldMetrics;
use crate::store::{keys, BlockStore, StoreError};
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of running the whole pipeline over one request
#[derive(Debug)]
pub enum PipelineVerdict {
    Allow,
    Reject(BlockReason),
}

impl PipelineVerdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, PipelineVerdict::Allow)
    }
}

/// The assembled guard chain plus its collaborators.
pub struct PipelineOrchestrator {
    guards: Vec<Arc<dyn Guard>>,
    registry: Arc<ExemptionRegistry>,
    store: Arc<dyn BlockStore>,
    sink: Arc<dyn SecurityEventSink>,
    metrics: Arc<ShieldMetrics>,
}

impl PipelineOrchestrator {
    /// Wire the guard chain from the active profile. Toggled-off guards are
    /// left out entirely; the size limit has no toggle and is always present.
    pub fn from_config(
        config: &ShieldConfig,
        store: Arc<dyn BlockStore>,
        sink: Arc<dyn SecurityEventSink>,
    ) -> Self {
        let registry = Arc::new(ExemptionRegistry::new(&config.exemptions));
        let profile = &config.profile;

        let mut guards: Vec<Arc<dyn Guard>> = Vec::new();
        if profile.enable_ddos {
            guards.push(Arc::new(FloodGuard::new(
                profile,
                ExemptionScope::static_only(),
            )));
            guards.push(Arc::new(EndpointHammerGuard::new(
                profile,
                ExemptionScope::static_only(),
            )));
        }
        guards.push(Arc::new(RequestSizeGuard::new(
            profile,
            ExemptionScope::all_categories(),
        )));
        if profile.enable_sql {
            guards.push(Arc::new(SqlInjectionInspector::new(
                Arc::clone(&store),
                profile.sql_block_attempts,
                ExemptionScope::all_categories(),
            )));
        }
        if profile.enable_xss {
            guards.push(Arc::new(XssInspector::new(ExemptionScope::all_categories())));
        }
        if profile.enable_path_traversal {
            guards.push(Arc::new(PathTraversalInspector::new(
                ExemptionScope::all_categories(),
            )));
        }
        if profile.enable_brute_force {
            guards.push(Arc::new(BruteForceGuard::new(
                profile,
                config.exemptions.login_path.clone(),
                Arc::clone(&store),
                ExemptionScope::all_categories(),
            )));
        }
        if profile.enable_api_key {
            guards.push(Arc::new(ApiKeyGuard::new(
                &config.exemptions,
                Arc::clone(&registry),
                ExemptionScope::all_categories(),
            )));
        }

        info!(
            profile = profile.name.as_str(),
            guards = guards.len(),
            "shield pipeline assembled"
        );

        Self {
            guards,
            registry,
            store,
            sink,
            metrics: Arc::new(ShieldMetrics::new()),
        }
    }

    /// Run the full pipeline over one request.
    pub async fn evaluate(&self, ctx: &RequestContext) -> PipelineVerdict {
        self.metrics.record_evaluated();

        // Fast path: a live block entry rejects unconditionally, before any
        // guard and before exemptions. The restated category comes from the
        // stored metadata; an unparseable value falls back to the scope's
        // only writer in this pipeline.
        let lookups = [
            (keys::ip_block(&ctx.identity), EventCategory::SqlInjection),
            (keys::ddos_block(&ctx.identity), EventCategory::Flood),
        ];
        for (key, fallback) in lookups {
            match self.store.get(&key).await {
                Ok(Some(stored)) => {
                    self.metrics.record_cached_hit();
                    let category = EventCategory::from_str_opt(&stored).unwrap_or(fallback);
                    let event = self
                        .request_event(ctx, category, Severity::Low)
                        .with_detail("cached", true)
                        .with_detail("block_key", key.clone());
                    self.sink.record(event);
                    debug!(identity = %ctx.identity, key = %key, "live block entry, rejecting");
                    return PipelineVerdict::Reject(BlockReason::already_blocked());
                }
                Ok(None) => {}
                Err(error) => {
                    self.metrics.record_guard_error();
                    warn!(error = %error, "block store lookup failed, skipping fast path");
                    self.emit_guard_error(ctx, "block_store", &error);
                    break;
                }
            }
        }

        for guard in &self.guards {
            if self.registry.bypasses(guard.scope(), &ctx.path, &ctx.identity) {
                debug!(guard = guard.name(), path = %ctx.path, "exempt, skipping");
                continue;
            }
            match guard.evaluate(ctx).await {
                Ok(Decision::Allow) => {}
                Ok(Decision::Block(violation)) => {
                    return self.reject(ctx, violation).await;
                }
                Err(error) => {
                    self.metrics.record_guard_error();
                    warn!(
                        guard = guard.name(),
                        error = %error,
                        "guard failed, allowing request through"
                    );
                    self.emit_guard_error(ctx, guard.name(), &error);
                }
            }
        }

        self.metrics.record_allowed();
        PipelineVerdict::Allow
    }

    /// Perform a violation's store writes, emit its event, build the verdict.
    async fn reject(&self, ctx: &RequestContext, violation: Violation) -> PipelineVerdict {
        self.metrics.record_blocked(violation.category);

        for directive in &violation.directives {
            match self
                .store
                .set(&directive.key, &directive.value, directive.ttl)
                .await
            {
                Ok(()) => info!(
                    key = %directive.key,
                    ttl_secs = directive.ttl.as_secs(),
                    "block entry written"
                ),
                // The rejection stands even when the entry could not be
                // shared; other processes just will not see it.
                Err(error) => warn!(
                    key = %directive.key,
                    error = %error,
                    "failed to write block entry"
                ),
            }
        }

        let Violation {
            category,
            severity,
            reason,
            details,
            ..
        } = violation;
        let mut event = self.request_event(ctx, category, severity);
        for (key, value) in details {
            event.details.insert(key, value);
        }
        self.sink.record(event);

        PipelineVerdict::Reject(reason)
    }

    fn request_event(
        &self,
        ctx: &RequestContext,
        category: EventCategory,
        severity: Severity,
    ) -> SecurityEvent {
        SecurityEvent::new(category, &ctx.identity, severity)
            .with_detail("path", ctx.path.clone())
            .with_detail("method", ctx.method.as_str())
    }

    fn emit_guard_error(&self, ctx: &RequestContext, source: &str, error: &StoreError) {
        let event = self
            .request_event(ctx, EventCategory::GuardError, Severity::High)
            .with_detail("guard", source)
            .with_detail("error", error.to_string());
        self.sink.record(event);
    }

    /// Rejection raised by the transport body cap, outside the guard chain.
    /// Happens when an undeclared (chunked) body overruns the read limit, so
    /// the actual size is unknown.
    pub fn reject_overflow(&self, ctx: &RequestContext, limit: u64) -> BlockReason {
        self.metrics.record_evaluated();
        self.metrics.record_blocked(EventCategory::Oversize);
        let event = self
            .request_event(ctx, EventCategory::Oversize, Severity::High)
            .with_detail("body_overflow", true)
            .with_detail("limit_bytes", limit);
        self.sink.record(event);
        BlockReason::new(
            codes::PAYLOAD_TOO_LARGE,
            format!("Request body exceeds the {} byte limit", limit),
            StatusCode::PAYLOAD_TOO_LARGE,
        )
    }

    /// Counters shared with the operational endpoint
    pub fn metrics(&self) -> Arc<ShieldMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Drop idle per-identity guard state. Called from the background task.
    pub fn cleanup(&self, max_age: Duration) {
        for guard in &self.guards {
            guard.cleanup(max_age);
        }
    }

    /// Number of active guards in the chain
    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }
}

//! Pipeline counters exposed on the operational endpoint.

use crate::domain::events::EventCategory;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shield pipeline metrics
#[derive(Default)]
pub struct ShieldMetrics {
    // Pipeline counters
    pub evaluated_total: AtomicU64,
    pub allowed_total: AtomicU64,
    pub blocked_total: AtomicU64,
    pub cached_block_hits: AtomicU64,
    pub guard_errors: AtomicU64,

    // Blocked requests by category
    pub blocked_flood: AtomicU64,
    pub blocked_sustained: AtomicU64,
    pub blocked_hammering: AtomicU64,
    pub blocked_sql_injection: AtomicU64,
    pub blocked_xss: AtomicU64,
    pub blocked_path_traversal: AtomicU64,
    pub blocked_brute_force: AtomicU64,
    pub blocked_oversize: AtomicU64,
    pub blocked_auth_required: AtomicU64,
}

impl ShieldMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request entering the pipeline
    pub fn record_evaluated(&self) {
        self.evaluated_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that passed every guard
    pub fn record_allowed(&self) {
        self.allowed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a guard rejection
    pub fn record_blocked(&self, category: EventCategory) {
        self.blocked_total.fetch_add(1, Ordering::Relaxed);
        let counter = match category {
            EventCategory::Flood => &self.blocked_flood,
            EventCategory::Sustained => &self.blocked_sustained,
            EventCategory::Hammering => &self.blocked_hammering,
            EventCategory::SqlInjection => &self.blocked_sql_injection,
            EventCategory::Xss => &self.blocked_xss,
            EventCategory::PathTraversal => &self.blocked_path_traversal,
            EventCategory::BruteForce => &self.blocked_brute_force,
            EventCategory::Oversize => &self.blocked_oversize,
            EventCategory::AuthRequired => &self.blocked_auth_required,
            // Fail-open events are not rejections; counted separately
            EventCategory::GuardError => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejection served straight from a live block entry
    pub fn record_cached_hit(&self) {
        self.blocked_total.fetch_add(1, Ordering::Relaxed);
        self.cached_block_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a guard that failed and was skipped
    pub fn record_guard_error(&self) {
        self.guard_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "pipeline": {
                "evaluated": self.evaluated_total.load(Ordering::Relaxed),
                "allowed": self.allowed_total.load(Ordering::Relaxed),
                "blocked": self.blocked_total.load(Ordering::Relaxed),
                "cached_block_hits": self.cached_block_hits.load(Ordering::Relaxed),
                "guard_errors": self.guard_errors.load(Ordering::Relaxed),
            },
            "blocked": {
                "flood": self.blocked_flood.load(Ordering::Relaxed),
                "sustained": self.blocked_sustained.load(Ordering::Relaxed),
                "hammering": self.blocked_hammering.load(Ordering::Relaxed),
                "sql_injection": self.blocked_sql_injection.load(Ordering::Relaxed),
                "xss": self.blocked_xss.load(Ordering::Relaxed),
                "path_traversal": self.blocked_path_traversal.load(Ordering::Relaxed),
                "brute_force": self.blocked_brute_force.load(Ordering::Relaxed),
                "oversize": self.blocked_oversize.load(Ordering::Relaxed),
                "auth_required": self.blocked_auth_required.load(Ordering::Relaxed),
            }
        })
    }
}

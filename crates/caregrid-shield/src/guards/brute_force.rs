//! Login brute-force detection.
//!
//! Watches POSTs to the configured login path. Attempt timestamps live in
//! process memory; the resulting block entry lives in the shared store so
//! every process rejects the identity for the full block duration.

use super::{BlockDirective, Decision, Guard, RequestContext, Violation};
use crate::domain::config::SecurityProfile;
use crate::domain::error::BlockReason;
use crate::domain::events::{EventCategory, Severity};
use crate::domain::exemptions::ExemptionScope;
use crate::store::{keys, BlockStore, StoreError};
use async_trait::async_trait;
use axum::http::Method;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rejects login attempts once an identity has burned its attempt budget.
///
/// The attempt list is pruned to `brute_force_window` and compared before
/// the current attempt is appended, so with a budget of five the sixth
/// attempt inside the window is the first one rejected. Rejected attempts
/// are not appended; the block entry alone holds the identity out.
pub struct BruteForceGuard {
    login_path: String,
    max_attempts: u32,
    window: Duration,
    block_duration: Duration,
    store: Arc<dyn BlockStore>,
    attempts: DashMap<String, VecDeque<Instant>>,
    scope: ExemptionScope,
}

impl BruteForceGuard {
    pub fn new(
        profile: &SecurityProfile,
        login_path: impl Into<String>,
        store: Arc<dyn BlockStore>,
        scope: ExemptionScope,
    ) -> Self {
        Self {
            login_path: login_path.into(),
            max_attempts: profile.brute_force_attempts,
            window: profile.brute_force_window,
            block_duration: profile.brute_force_block_duration,
            store,
            attempts: DashMap::new(),
            scope,
        }
    }

    /// Prune, compare, then append the attempt that was allowed through.
    fn observe_attempt(&self, identity: &str, now: Instant) -> Option<Violation> {
        let mut entry = self.attempts.entry(identity.to_string()).or_default();
        let window = entry.value_mut();

        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.window)
        {
            window.pop_front();
        }

        let count = window.len() as u32;
        if count >= self.max_attempts {
            return Some(
                Violation::new(
                    EventCategory::BruteForce,
                    Severity::Critical,
                    BlockReason::brute_force(self.block_duration),
                )
                .with_detail("attempts", count)
                .with_detail("limit", self.max_attempts)
                .with_directive(BlockDirective::new(
                    keys::login_block(identity),
                    EventCategory::BruteForce.as_str(),
                    self.block_duration,
                )),
            );
        }

        window.push_back(now);
        None
    }

    /// Number of identities with live attempt lists
    pub fn tracked_identities(&self) -> usize {
        self.attempts.len()
    }
}

#[async_trait]
impl Guard for BruteForceGuard {
    fn name(&self) -> &'static str {
        "brute_force_guard"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        if ctx.method != Method::POST || ctx.path != self.login_path {
            return Ok(Decision::Allow);
        }

        // An identity already serving a login block stays out until the
        // entry expires; repeat hits are expected noise, not new attacks.
        if self
            .store
            .get(&keys::login_block(&ctx.identity))
            .await?
            .is_some()
        {
            return Ok(Decision::Block(
                Violation::new(
                    EventCategory::BruteForce,
                    Severity::Low,
                    BlockReason::brute_force(self.block_duration),
                )
                .with_detail("cached", true),
            ));
        }

        match self.observe_attempt(&ctx.identity, Instant::now()) {
            Some(violation) => Ok(Decision::Block(violation)),
            None => Ok(Decision::Allow),
        }
    }

    fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.attempts.retain(|_, window| {
            window
                .back()
                .is_some_and(|t| now.duration_since(*t) <= max_age)
        });
    }
}

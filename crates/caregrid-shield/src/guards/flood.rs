//! Volume guards: request flooding, sustained rate, endpoint hammering.
//!
//! Both guards track in-process state per identity in a [`DashMap`] and are
//! exercised before any content inspection. A violation here is treated as
//! automated abuse, so the block directive they emit covers every future
//! request from the identity, not just the offending endpoint.

use super::{BlockDirective, Decision, Guard, RequestContext, Violation};
use crate::domain::config::SecurityProfile;
use crate::domain::error::BlockReason;
use crate::domain::events::{EventCategory, Severity};
use crate::domain::exemptions::ExemptionScope;
use crate::store::{keys, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Burst window for the per-second rate
const SECOND_WINDOW: Duration = Duration::from_secs(1);
/// Retention window; also the sustained-rate window
const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window flood detection over one timestamp list per identity.
///
/// The list keeps the trailing sixty seconds of arrivals. The current
/// request is appended before either threshold is compared, so a request
/// that itself tips the count over the line is the one rejected.
pub struct FloodGuard {
    requests_per_second: u32,
    requests_per_minute: u32,
    block_duration: Duration,
    history: DashMap<String, VecDeque<Instant>>,
    scope: ExemptionScope,
}

impl FloodGuard {
    pub fn new(profile: &SecurityProfile, scope: ExemptionScope) -> Self {
        Self {
            requests_per_second: profile.requests_per_second,
            requests_per_minute: profile.requests_per_minute,
            block_duration: profile.ddos_block_duration,
            history: DashMap::new(),
            scope,
        }
    }

    /// Record one arrival and compare both window counts.
    fn check(&self, identity: &str, now: Instant) -> Option<Violation> {
        let mut entry = self
            .history
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity = %identity, "tracking new identity");
                VecDeque::new()
            });
        let window = entry.value_mut();

        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) > MINUTE_WINDOW)
        {
            window.pop_front();
        }
        window.push_back(now);

        let burst = window
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) <= SECOND_WINDOW)
            .count() as u32;
        if burst > self.requests_per_second {
            return Some(
                Violation::new(
                    EventCategory::Flood,
                    Severity::Critical,
                    BlockReason::flood(self.block_duration),
                )
                .with_detail("count", burst)
                .with_detail("limit", self.requests_per_second)
                .with_directive(BlockDirective::new(
                    keys::ddos_block(identity),
                    EventCategory::Flood.as_str(),
                    self.block_duration,
                )),
            );
        }

        let minute = window.len() as u32;
        if minute > self.requests_per_minute {
            return Some(
                Violation::new(
                    EventCategory::Sustained,
                    Severity::Critical,
                    BlockReason::sustained(self.block_duration),
                )
                .with_detail("count", minute)
                .with_detail("limit", self.requests_per_minute)
                .with_directive(BlockDirective::new(
                    keys::ddos_block(identity),
                    EventCategory::Sustained.as_str(),
                    self.block_duration,
                )),
            );
        }

        None
    }

    /// Number of identities currently tracked
    pub fn tracked_identities(&self) -> usize {
        self.history.len()
    }
}

#[async_trait]
impl Guard for FloodGuard {
    fn name(&self) -> &'static str {
        "flood_guard"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        match self.check(&ctx.identity, Instant::now()) {
            Some(violation) => Ok(Decision::Block(violation)),
            None => Ok(Decision::Allow),
        }
    }

    fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.history.retain(|identity, window| {
            let live = window
                .back()
                .is_some_and(|t| now.duration_since(*t) <= max_age);
            if !live {
                debug!(identity = %identity, "dropping idle identity history");
            }
            live
        });
    }
}

/// Windowed per-endpoint counter
struct EndpointWindow {
    count: u32,
    window_start: Instant,
    last_seen: Instant,
}

/// Detects one identity hammering a single endpoint.
///
/// Counts requests per (identity, path) inside a fixed window that resets
/// once the window elapses. The overall rate can sit below the flood
/// thresholds while a single endpoint is still being hammered.
pub struct EndpointHammerGuard {
    endpoint_limit: u32,
    endpoint_window: Duration,
    block_duration: Duration,
    counters: DashMap<(String, String), EndpointWindow>,
    scope: ExemptionScope,
}

impl EndpointHammerGuard {
    pub fn new(profile: &SecurityProfile, scope: ExemptionScope) -> Self {
        Self {
            endpoint_limit: profile.endpoint_limit,
            endpoint_window: profile.endpoint_window,
            block_duration: profile.ddos_block_duration,
            counters: DashMap::new(),
            scope,
        }
    }

    fn check(&self, identity: &str, path: &str, now: Instant) -> Option<Violation> {
        let key = (identity.to_string(), path.to_string());
        let mut entry = self.counters.entry(key).or_insert_with(|| EndpointWindow {
            count: 0,
            window_start: now,
            last_seen: now,
        });
        let window = entry.value_mut();

        if now.duration_since(window.window_start) >= self.endpoint_window {
            window.count = 0;
            window.window_start = now;
        }
        window.count += 1;
        window.last_seen = now;

        if window.count > self.endpoint_limit {
            return Some(
                Violation::new(
                    EventCategory::Hammering,
                    Severity::Critical,
                    BlockReason::hammering(self.block_duration),
                )
                .with_detail("count", window.count)
                .with_detail("limit", self.endpoint_limit)
                .with_directive(BlockDirective::new(
                    keys::ddos_block(identity),
                    EventCategory::Hammering.as_str(),
                    self.block_duration,
                )),
            );
        }

        None
    }

    /// Number of (identity, endpoint) pairs currently tracked
    pub fn tracked_endpoints(&self) -> usize {
        self.counters.len()
    }
}

#[async_trait]
impl Guard for EndpointHammerGuard {
    fn name(&self) -> &'static str {
        "endpoint_hammer_guard"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        match self.check(&ctx.identity, &ctx.path, Instant::now()) {
            Some(violation) => Ok(Decision::Block(violation)),
            None => Ok(Decision::Allow),
        }
    }

    fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.counters
            .retain(|_, window| now.duration_since(window.last_seen) <= max_age);
    }
}

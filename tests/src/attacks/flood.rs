//! # Flood and Hammering Simulations
//!
//! Drives request floods at a shielded worker and checks the rate guards:
//! the per-second burst ceiling, the sustained per-minute window, single
//! endpoint hammering, and the shared block entry a tripped guard leaves
//! behind for every later request.

#[cfg(test)]
mod tests {
    use crate::support::{self, TENANT_A, TENANT_B};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use caregrid_shield::{EventCategory, ProfileName, SecurityProfile, Severity};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    // =============================================================================
    // BURST FLOODS
    // =============================================================================

    /// The moderate profile admits twenty requests per second; the twenty-first
    /// in the same second is rejected as a flood.
    #[tokio::test]
    async fn test_burst_over_per_second_limit_is_rejected() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        // Setup: exhaust the burst budget
        for i in 0..20 {
            let response =
                support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients"))
                    .await;
            assert_eq!(response.status(), StatusCode::OK, "request {} should pass", i + 1);
        }

        // Act: one more request inside the same second
        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;

        // Assert: rejected as a flood, with the block duration as Retry-After
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "1800");
        assert_eq!(support::rejection_code(response).await, "flood");

        let events = worker.sink.events();
        assert_eq!(worker.sink.count(EventCategory::Flood), 1);
        assert_eq!(events[0].severity, Severity::Critical);
        assert_eq!(events[0].identity, TENANT_A);
    }

    /// Once the flood guard trips, the stored block entry answers every later
    /// request from the identity, exempt surfaces included.
    #[tokio::test]
    async fn test_tripped_identity_stays_blocked() {
        let worker = support::worker(&support::config(ProfileName::Moderate));
        for _ in 0..21 {
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        }

        // Act: a health probe, normally exempt from every guard
        let response = support::send(&worker.router, support::get_from(TENANT_A, "/health")).await;

        // Assert: the block entry answers before routing or exemption tables
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(support::rejection_code(response).await, "blocked");
        assert_eq!(
            worker
                .orchestrator
                .metrics()
                .cached_block_hits
                .load(Ordering::Relaxed),
            1
        );

        // The cached rejection is logged quietly, not as a fresh detection
        let events = worker.sink.events();
        let cached: Vec<_> = events
            .iter()
            .filter(|event| event.severity == Severity::Low)
            .collect();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].details["cached"], true);
    }

    // =============================================================================
    // SUSTAINED RATE
    // =============================================================================

    /// A client staying under the burst ceiling still trips the per-minute
    /// window once its cumulative volume crosses the sustained limit.
    #[tokio::test]
    async fn test_sustained_volume_trips_minute_window() {
        // Setup: tight sustained ceiling so the minute window trips quickly
        let profile = SecurityProfile {
            requests_per_second: 5,
            requests_per_minute: 8,
            ..SecurityProfile::named(ProfileName::Moderate)
        };
        let worker = support::worker(&support::config_with(profile));

        for _ in 0..5 {
            let response =
                support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients"))
                    .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Let the burst window pass so only the minute count keeps growing
        tokio::time::sleep(Duration::from_millis(1200)).await;

        for _ in 0..3 {
            let response =
                support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients"))
                    .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Act: ninth request of the minute
        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;

        // Assert
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(support::rejection_code(response).await, "sustained");
        assert_eq!(worker.sink.count(EventCategory::Sustained), 1);
    }

    // =============================================================================
    // ENDPOINT HAMMERING
    // =============================================================================

    /// Hammering one endpoint trips its own limit even while the global rates
    /// stay comfortable, and the resulting block covers the whole API.
    #[tokio::test]
    async fn test_single_endpoint_hammering_trips_its_own_limit() {
        // Setup: roomy global rates, tight per-endpoint window
        let profile = SecurityProfile {
            requests_per_second: 50,
            requests_per_minute: 3000,
            endpoint_limit: 10,
            ..SecurityProfile::named(ProfileName::Moderate)
        };
        let worker = support::worker(&support::config_with(profile));

        for _ in 0..10 {
            let response =
                support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients"))
                    .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Act: eleventh hit on the same endpoint
        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(support::rejection_code(response).await, "hammering");
        assert_eq!(worker.sink.count(EventCategory::Hammering), 1);

        // Assert: the block is identity-wide, not per endpoint
        let response = support::send(&worker.router, support::get_from(TENANT_A, "/health")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(support::rejection_code(response).await, "blocked");
    }

    // =============================================================================
    // ISOLATION AND EXEMPTIONS
    // =============================================================================

    /// One tenant flooding must not degrade another tenant's service.
    #[tokio::test]
    async fn test_flood_from_one_tenant_leaves_others_untouched() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        for _ in 0..21 {
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        }
        let blocked =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        assert_eq!(blocked.status(), StatusCode::FORBIDDEN);

        let response =
            support::send(&worker.router, support::get_from(TENANT_B, "/api/v1/patients")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(support::body_text(response).await, "patient listing");
    }

    /// Static asset churn is expected traffic and accumulates no rate state.
    #[tokio::test]
    async fn test_static_asset_churn_bypasses_rate_guards() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        // Three times the per-second budget against a static path
        for _ in 0..60 {
            let response =
                support::send(&worker.router, support::get_from(TENANT_A, "/static/app.js")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert!(worker.store.is_empty());
        assert!(worker.sink.events().is_empty());
    }

    /// Requests without a forwarding header resolve to the loopback identity,
    /// which the default whitelist exempts from every guard.
    #[tokio::test]
    async fn test_loopback_identity_is_never_rate_limited() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        for _ in 0..50 {
            let request = Request::builder()
                .method(Method::GET)
                .uri("/api/v1/patients")
                .body(Body::empty())
                .unwrap();
            let response = support::send(&worker.router, request).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    /// Under a simultaneous burst the budget holds exactly: twenty admitted,
    /// twenty rejected, nothing lost to interleaving.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_burst_admits_exactly_the_budget() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let router = worker.router.clone();
            handles.push(tokio::spawn(async move {
                support::send(&router, support::get_from(TENANT_A, "/api/v1/patients")).await
            }));
        }

        let mut allowed = 0;
        let mut rejected = 0;
        for handle in handles {
            let response = handle.await.expect("request task completes");
            match response.status() {
                StatusCode::OK => allowed += 1,
                // Later arrivals may hit the freshly written block entry
                StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN => rejected += 1,
                other => panic!("unexpected status {}", other),
            }
        }

        assert_eq!(allowed, 20);
        assert_eq!(rejected, 20);
    }
}

//! # Pipeline Flow Tests
//!
//! End-to-end behavior of the assembled shield: what each profile enforces,
//! how rejections look on the wire, which surfaces are exempt, and how the
//! pipeline degrades when the shared store is unreachable.

#[cfg(test)]
mod tests {
    use crate::support::{self, TENANT_A, TENANT_B};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use caregrid_shield::{
        EventCategory, ProfileName, RecordingEventSink, SecurityProfile, Severity,
    };
    use serde_json::Value;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    // =============================================================================
    // CLEAN TRAFFIC
    // =============================================================================

    /// Allowed requests reach their handlers with bodies intact, and the
    /// pipeline counts them as evaluated and allowed.
    #[tokio::test]
    async fn test_clean_traffic_flows_through_untouched() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(support::body_text(response).await, "patient listing");

        // The buffered write body is handed to the handler byte for byte
        let body = "note=post-visit+summary+for+records";
        let response = support::send(
            &worker.router,
            support::post_form(TENANT_A, "/api/v1/notes", body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(support::body_text(response).await, body);

        let metrics = worker.orchestrator.metrics();
        assert_eq!(metrics.evaluated_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.allowed_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.blocked_total.load(Ordering::Relaxed), 0);
    }

    // =============================================================================
    // PROFILE BEHAVIOR
    // =============================================================================

    /// The development profile runs detection-free; only the size cap stands.
    #[tokio::test]
    async fn test_development_profile_only_enforces_the_size_cap() {
        let worker = support::worker(&support::config(ProfileName::Development));
        assert_eq!(worker.orchestrator.guard_count(), 1);

        // Rapid-fire traffic that would trip the moderate flood guard
        for _ in 0..40 {
            let response =
                support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients"))
                    .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Injection probes pass: no inspectors are wired in
        let response = support::send(
            &worker.router,
            support::get_from(TENANT_A, "/api/v1/patients?q=1%20UNION%20SELECT%20name"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // The size limit still holds
        let response = support::send(
            &worker.router,
            support::post_declaring(TENANT_A, "/api/v1/notes", 60 * 1024 * 1024),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(support::rejection_code(response).await, "payload_too_large");
    }

    /// The strict profile requires some credential on versioned API paths.
    #[tokio::test]
    async fn test_strict_profile_demands_credentials() {
        let worker = support::worker(&support::config(ProfileName::Strict));

        // No credential, unknown client
        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(support::rejection_code(response).await, "auth_required");

        // API key header
        let request = support::request(TENANT_A, Method::GET, "/api/v1/patients")
            .header("x-api-key", "cg_live_7f3a91")
            .body(Body::empty())
            .unwrap();
        let response = support::send(&worker.router, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Session cookie
        let request = support::request(TENANT_A, Method::GET, "/api/v1/patients")
            .header("cookie", "theme=dark; sessionid=8f14e45fceea")
            .body(Body::empty())
            .unwrap();
        let response = support::send(&worker.router, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Authorization header
        let request = support::request(TENANT_A, Method::GET, "/api/v1/patients")
            .header("authorization", "Bearer cg.v1.session")
            .body(Body::empty())
            .unwrap();
        let response = support::send(&worker.router, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Trusted interactive client, no credential
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/v1/patients")
            .header("x-forwarded-for", TENANT_A)
            .header("user-agent", "curl/8.5.0")
            .body(Body::empty())
            .unwrap();
        let response = support::send(&worker.router, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Health stays open for probes
        let response = support::send(&worker.router, support::get_from(TENANT_A, "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // =============================================================================
    // SIZE LIMITS
    // =============================================================================

    /// Declared oversize bodies are rejected from the header alone; nothing
    /// is read, and normal-sized writes keep working.
    #[tokio::test]
    async fn test_declared_oversize_is_rejected_up_front() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let response = support::send(
            &worker.router,
            support::post_declaring(TENANT_A, "/api/v1/notes", 11 * 1024 * 1024),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(support::rejection_code(response).await, "payload_too_large");
        assert_eq!(worker.sink.count(EventCategory::Oversize), 1);

        let response = support::send(
            &worker.router,
            support::post_form(TENANT_A, "/api/v1/notes", "note=short+entry+for+the+chart"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // =============================================================================
    // WIRE FORMAT
    // =============================================================================

    /// Every rejection is a JSON body with a machine-readable code, plus a
    /// Retry-After header when the block is temporary.
    #[tokio::test]
    async fn test_rejections_carry_machine_readable_bodies() {
        let profile = SecurityProfile {
            requests_per_second: 1,
            requests_per_minute: 100,
            ..SecurityProfile::named(ProfileName::Moderate)
        };
        let worker = support::worker(&support::config_with(profile));

        support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers()["retry-after"], "1800");

        let body: Value =
            serde_json::from_str(&support::body_text(response).await).expect("json body");
        assert_eq!(body["error"], "flood");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }

    // =============================================================================
    // EXEMPT SURFACES
    // =============================================================================

    /// Exempt prefixes skip inspection entirely; the same payload on a
    /// protected path is rejected.
    #[tokio::test]
    async fn test_exempt_surfaces_skip_inspection() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let response = support::send(
            &worker.router,
            support::get_from(TENANT_A, "/static/app.js?file=..%2F..%2Fetc%2Fpasswd"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Documentation paths pass the shield too (404 is the router's answer)
        let response = support::send(
            &worker.router,
            support::get_from(TENANT_A, "/api/docs?file=..%2F..%2Fetc%2Fpasswd"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = support::send(
            &worker.router,
            support::get_from(TENANT_A, "/api/v1/export?file=..%2F..%2Fetc%2Fpasswd"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    // =============================================================================
    // FAIL-OPEN
    // =============================================================================

    /// When the shared store is down, availability wins: requests that cannot
    /// be counted pass through, and every failure is audited.
    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let sink = Arc::new(RecordingEventSink::new());
        let (router, orchestrator) = support::assemble(
            &support::config(ProfileName::Moderate),
            Arc::new(support::UnavailableStore),
            Arc::clone(&sink),
        );

        // A probe that would normally be rejected and counted
        let response = support::send(
            &router,
            support::post_form(TENANT_A, "/api/v1/notes", "q=%27+OR+%271%27%3D%271"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // One failure from the fast-path lookup, one from the attempt counter
        assert_eq!(sink.count(EventCategory::GuardError), 2);
        assert_eq!(orchestrator.metrics().guard_errors.load(Ordering::Relaxed), 2);
        assert!(sink
            .events()
            .iter()
            .all(|event| event.severity == Severity::High));
    }

    // =============================================================================
    // METRICS
    // =============================================================================

    /// The metrics snapshot groups pipeline totals and per-category blocks.
    #[tokio::test]
    async fn test_metrics_snapshot_tracks_outcomes() {
        let profile = SecurityProfile {
            requests_per_second: 2,
            requests_per_minute: 100,
            ..SecurityProfile::named(ProfileName::Moderate)
        };
        let worker = support::worker(&support::config_with(profile));

        for _ in 0..2 {
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        }
        // Third trips the flood guard, fourth hits the stored entry
        support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;

        let snapshot = worker.orchestrator.metrics().to_json();
        assert_eq!(snapshot["pipeline"]["evaluated"], 4);
        assert_eq!(snapshot["pipeline"]["allowed"], 2);
        assert_eq!(snapshot["pipeline"]["blocked"], 2);
        assert_eq!(snapshot["pipeline"]["cached_block_hits"], 1);
        assert_eq!(snapshot["blocked"]["flood"], 1);
    }
}

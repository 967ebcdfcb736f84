// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! CareGrid Shield - request shielding pipeline for the CareGrid platform.
//!
//! Every inbound request crosses an ordered chain of stateful guards before
//! any handler runs. Rate abuse, login brute force, injection payloads,
//! oversized bodies, and credential-less API calls are rejected at the edge
//! with a JSON error and an audit event; everything else passes through
//! untouched.
//!
//! # Architecture
//!
//! ```text
//!  inbound request
//!        │
//!        ▼
//!  ┌───────────────────────────────────────────┐
//!  │       ShieldLayer (tower middleware)      │
//!  │  identity resolution + capped body read   │
//!  └─────────────────────┬─────────────────────┘
//!                        │
//!                        ▼
//!  ┌───────────────────────────────────────────┐
//!  │            PipelineOrchestrator           │
//!  │                                           │
//!  │  live block entry in store? ──► reject    │
//!  │                                           │
//!  │  Flood → EndpointHammer → RequestSize →   │
//!  │  Sql → Xss → PathTraversal → BruteForce → │
//!  │  ApiKey                                   │
//!  └──────────┬─────────────────────┬──────────┘
//!      allow  │                     │  block
//!             ▼                     ▼
//!   application router    JSON rejection + audit event
//!
//!  Block entries and attempt counters live in the BlockStore, shared by
//!  every worker; one worker's block is authoritative for all of them.
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use caregrid_shield::{ShieldConfig, ShieldServer};
//!
//! let config = ShieldConfig::from_env()?;
//! let mut server = ShieldServer::new(config)?;
//! server.start(app).await?;
//! ```
//!
//! # Protections
//!
//! - Rolling-window flood and sustained-rate detection per client identity
//! - Per-endpoint hammering detection
//! - Login brute-force lockout backed by cross-process state
//! - SQL injection, XSS, and path traversal signature inspection with
//!   repeat-offender escalation to a 24-hour block
//! - Declared and actual body size enforcement
//! - API credential presence gate on versioned API paths
//!
//! Thresholds and toggles come from a named [`SecurityProfile`] (development,
//! lenient, moderate, strict) selected once at startup.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod guards;
pub mod metrics;
pub mod pipeline;
pub mod service;
pub mod store;

// Re-exports for public API
pub use domain::config::{
    ExemptionConfig, ProfileName, SecurityProfile, ServerConfig, ShieldConfig,
};
pub use domain::error::{BlockReason, ErrorBody, ShieldError};
pub use domain::events::{
    EventCategory, RecordingEventSink, SecurityEvent, SecurityEventSink, Severity,
    TracingEventSink,
};
pub use domain::exemptions::{ExemptCategory, ExemptionRegistry, ExemptionScope};
pub use domain::identity::client_identity;
pub use guards::{BlockDirective, Decision, Guard, RequestContext, Violation};
pub use metrics::ShieldMetrics;
pub use pipeline::{PipelineOrchestrator, PipelineVerdict, ShieldLayer, ShieldService};
pub use service::ShieldServer;
pub use store::{BlockStore, MemoryBlockStore, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

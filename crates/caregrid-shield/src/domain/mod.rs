//! Domain types for the request shield.
//!
//! Configuration profiles, exemption tables, client identity resolution,
//! the rejection taxonomy, and the security event model live here. Stateful
//! machinery (guards, store, pipeline) builds on these types.

pub mod config;
pub mod error;
pub mod events;
pub mod exemptions;
pub mod identity;

// Re-exports for convenience
pub use config::{
    ExemptionConfig, ProfileName, SecurityProfile, ServerConfig, ShieldConfig,
};
pub use error::{BlockReason, ErrorBody, ShieldError};
pub use events::{
    EventCategory, RecordingEventSink, SecurityEvent, SecurityEventSink, Severity,
    TracingEventSink,
};
pub use exemptions::{ExemptCategory, ExemptionRegistry, ExemptionScope};
pub use identity::client_identity;

//! # Integration Flows
//!
//! Cross-component behavior of the assembled shield: profile wiring, the
//! rejection wire format, exemption surfaces, fail-open handling, and the
//! block state contract between workers sharing one store.

pub mod pipeline_flows;

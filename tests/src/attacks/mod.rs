//! # Attack Simulations
//!
//! Each module replays one attack family against a shielded worker and
//! checks the guard that owns it: the rejection on the wire, the audit
//! events emitted, and the block state left behind.

pub mod flood;
pub mod injection;

//! Request body size limit.

use super::{Decision, Guard, RequestContext, Violation};
use crate::domain::config::SecurityProfile;
use crate::domain::error::BlockReason;
use crate::domain::events::{EventCategory, Severity};
use crate::domain::exemptions::ExemptionScope;
use crate::store::StoreError;
use async_trait::async_trait;

/// Rejects write requests larger than the profile allows.
///
/// Runs before the content inspectors so an attacker cannot feed them an
/// arbitrarily large body. Compares the declared length (or the actual
/// body size when nothing was declared) and never looks at the contents.
pub struct RequestSizeGuard {
    max_bytes: u64,
    scope: ExemptionScope,
}

impl RequestSizeGuard {
    pub fn new(profile: &SecurityProfile, scope: ExemptionScope) -> Self {
        Self {
            max_bytes: profile.max_request_bytes,
            scope,
        }
    }
}

#[async_trait]
impl Guard for RequestSizeGuard {
    fn name(&self) -> &'static str {
        "request_size_guard"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        if !ctx.is_write_method() {
            return Ok(Decision::Allow);
        }
        let Some(length) = ctx.content_length else {
            return Ok(Decision::Allow);
        };
        if length <= self.max_bytes {
            return Ok(Decision::Allow);
        }

        Ok(Decision::Block(
            Violation::new(
                EventCategory::Oversize,
                Severity::High,
                BlockReason::payload_too_large(length, self.max_bytes),
            )
            .with_detail("declared_bytes", length)
            .with_detail("limit_bytes", self.max_bytes),
        ))
    }
}

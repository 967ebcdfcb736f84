//! API credential presence check.

use super::{Decision, Guard, RequestContext, Violation};
use crate::domain::config::ExemptionConfig;
use crate::domain::error::BlockReason;
use crate::domain::events::{EventCategory, Severity};
use crate::domain::exemptions::{ExemptionRegistry, ExemptionScope};
use crate::store::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

/// Requires some credential on versioned API paths.
///
/// Accepts an API key header, an Authorization header, or a session cookie;
/// none of them is validated here, only required to be present. Clients
/// with a trusted User-Agent signature (browsers, known API tools) pass
/// without one so interactive exploration keeps working.
pub struct ApiKeyGuard {
    api_prefix: String,
    session_cookie: String,
    registry: Arc<ExemptionRegistry>,
    scope: ExemptionScope,
}

impl ApiKeyGuard {
    pub fn new(
        config: &ExemptionConfig,
        registry: Arc<ExemptionRegistry>,
        scope: ExemptionScope,
    ) -> Self {
        Self {
            api_prefix: config.api_prefix.clone(),
            session_cookie: config.session_cookie.clone(),
            registry,
            scope,
        }
    }

    fn has_session_cookie(&self, ctx: &RequestContext) -> bool {
        let Some(cookies) = &ctx.cookies else {
            return false;
        };
        cookies.split(';').any(|pair| {
            pair.trim()
                .split_once('=')
                .is_some_and(|(name, value)| name == self.session_cookie && !value.is_empty())
        })
    }
}

#[async_trait]
impl Guard for ApiKeyGuard {
    fn name(&self) -> &'static str {
        "api_key_guard"
    }

    fn scope(&self) -> &ExemptionScope {
        &self.scope
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Result<Decision, StoreError> {
        if !ctx.path.starts_with(&self.api_prefix) {
            return Ok(Decision::Allow);
        }
        if ctx.api_key.is_some() || ctx.authorization || self.has_session_cookie(ctx) {
            return Ok(Decision::Allow);
        }
        if ctx
            .user_agent
            .as_deref()
            .is_some_and(|agent| self.registry.is_trusted_agent(agent))
        {
            return Ok(Decision::Allow);
        }

        let mut violation = Violation::new(
            EventCategory::AuthRequired,
            Severity::Low,
            BlockReason::auth_required(),
        );
        if let Some(agent) = &ctx.user_agent {
            violation = violation.with_detail("user_agent", agent.clone());
        }
        Ok(Decision::Block(violation))
    }
}

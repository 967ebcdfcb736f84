//! Exemption registry: path categories, IP whitelist, trusted client signatures.
//!
//! Guards differ in which exemptions they honor. The DDoS family only skips
//! static asset paths (plus whitelisted IPs); every other guard skips any
//! exempt category. That asymmetry lives in each guard's [`ExemptionScope`],
//! handed over at construction, so the pipeline wiring spells it out instead
//! of scattering prefix checks per guard.

use crate::domain::config::ExemptionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

/// Exempt path categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemptCategory {
    Static,
    Auth,
    Admin,
    Health,
    ApiDocs,
}

impl ExemptCategory {
    /// All configured categories, in table order
    pub const ALL: [ExemptCategory; 5] = [
        ExemptCategory::Static,
        ExemptCategory::Auth,
        ExemptCategory::Admin,
        ExemptCategory::Health,
        ExemptCategory::ApiDocs,
    ];
}

/// Which exemptions a guard consults. Constructed explicitly per guard.
#[derive(Debug, Clone)]
pub struct ExemptionScope {
    /// Categories whose paths bypass the guard; `None` means every category
    pub categories: Option<Vec<ExemptCategory>>,
    /// Whether whitelisted IPs bypass the guard
    pub honor_whitelist: bool,
}

impl ExemptionScope {
    /// Bypass on any exempt category or whitelisted IP (most guards)
    pub fn all_categories() -> Self {
        Self {
            categories: None,
            honor_whitelist: true,
        }
    }

    /// Bypass only on static asset paths or whitelisted IPs (DDoS family)
    pub fn static_only() -> Self {
        Self {
            categories: Some(vec![ExemptCategory::Static]),
            honor_whitelist: true,
        }
    }
}

/// Compiled exemption tables, built once from [`ExemptionConfig`].
#[derive(Debug)]
pub struct ExemptionRegistry {
    tables: Vec<(ExemptCategory, Vec<String>)>,
    whitelist: HashSet<IpAddr>,
    trusted_agents: Vec<String>,
}

impl ExemptionRegistry {
    pub fn new(config: &ExemptionConfig) -> Self {
        let tables = vec![
            (ExemptCategory::Static, config.static_paths.clone()),
            (ExemptCategory::Auth, config.auth_paths.clone()),
            (ExemptCategory::Admin, config.admin_paths.clone()),
            (ExemptCategory::Health, config.health_paths.clone()),
            (ExemptCategory::ApiDocs, config.api_docs_paths.clone()),
        ];
        let trusted_agents = config
            .trusted_agents
            .iter()
            .map(|signature| signature.to_ascii_lowercase())
            .collect();
        Self {
            tables,
            whitelist: config.whitelist.iter().copied().collect(),
            trusted_agents,
        }
    }

    /// Does `path` fall under an exempt prefix? A `None` category matches
    /// any configured category.
    pub fn is_exempt(&self, path: &str, category: Option<ExemptCategory>) -> bool {
        self.tables
            .iter()
            .filter(|(cat, _)| category.map_or(true, |wanted| *cat == wanted))
            .any(|(_, prefixes)| prefixes.iter().any(|prefix| path.starts_with(prefix)))
    }

    /// Is the identity a whitelisted IP? Identities that do not parse as an
    /// IP address can never match.
    pub fn is_whitelisted(&self, identity: &str) -> bool {
        identity
            .parse::<IpAddr>()
            .map(|ip| self.whitelist.contains(&ip))
            .unwrap_or(false)
    }

    /// Does the User-Agent carry a trusted client signature?
    pub fn is_trusted_agent(&self, agent: &str) -> bool {
        let agent = agent.to_ascii_lowercase();
        self.trusted_agents
            .iter()
            .any(|signature| agent.contains(signature))
    }

    /// Scope-aware bypass decision used by the orchestrator before each guard.
    pub fn bypasses(&self, scope: &ExemptionScope, path: &str, identity: &str) -> bool {
        if scope.honor_whitelist && self.is_whitelisted(identity) {
            return true;
        }
        match &scope.categories {
            None => self.is_exempt(path, None),
            Some(categories) => categories
                .iter()
                .any(|category| self.is_exempt(path, Some(*category))),
        }
    }
}

//! Roles and issuer role resolution
//!
//! Issuers are resolved to a [`Role`] through an optional
//! [`RoleDirectory`]. Roles the directory finds are cached for the life of
//! the process; issuers it does not know get the configured default role
//! and are not cached.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Issuer role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access
    Admin,
    /// Licensed practitioner
    Attorney,
    /// Support staff
    Paralegal,
    /// Represented party
    Client,
    /// Unauthenticated or unknown issuer
    Guest,
}

impl Role {
    /// Every role
    pub const ALL: [Role; 5] = [
        Self::Admin,
        Self::Attorney,
        Self::Paralegal,
        Self::Client,
        Self::Guest,
    ];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Attorney => "attorney",
            Self::Paralegal => "paralegal",
            Self::Client => "client",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

/// Source of truth for issuer roles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Look up an issuer's role; `None` for unknown issuers
    async fn lookup(&self, issuer_id: &str) -> Result<Option<Role>>;
}

/// Cached issuer → role resolution
pub struct RoleResolver {
    directory: Option<Arc<dyn RoleDirectory>>,
    cache: DashMap<String, Role>,
    default_role: Role,
}

impl RoleResolver {
    /// Create a resolver without a directory
    #[must_use]
    pub fn new(default_role: Role) -> Self {
        Self {
            directory: None,
            cache: DashMap::new(),
            default_role,
        }
    }

    /// Attach a directory
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn RoleDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Role given to unseen issuers
    #[must_use]
    pub fn default_role(&self) -> Role {
        self.default_role
    }

    /// Pin an issuer's role (seeds or overrides the cache)
    pub fn assign(&self, issuer_id: impl Into<String>, role: Role) {
        self.cache.insert(issuer_id.into(), role);
    }

    /// Drop a cached entry so the next lookup consults the directory
    pub fn invalidate(&self, issuer_id: &str) {
        self.cache.remove(issuer_id);
    }

    /// Number of cached issuers
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve an issuer's role
    ///
    /// Directory misses and failures resolve to the default role without
    /// being cached, so the cache only grows with known issuers.
    pub async fn resolve(&self, issuer_id: &str) -> Role {
        if let Some(role) = self.cache.get(issuer_id) {
            return *role;
        }

        let looked_up = match &self.directory {
            Some(directory) => match directory.lookup(issuer_id).await {
                Ok(role) => role,
                Err(e) => {
                    warn!(issuer = %issuer_id, error = %e, "Role lookup failed, using default role");
                    return self.default_role;
                }
            },
            None => None,
        };

        match looked_up {
            Some(role) => {
                debug!(issuer = %issuer_id, role = %role, "Resolved issuer role");
                *self.cache.entry(issuer_id.to_string()).or_insert(role)
            }
            None => {
                debug!(
                    issuer = %issuer_id,
                    role = %self.default_role,
                    "Unknown issuer, using default role"
                );
                self.default_role
            }
        }
    }
}

//! Permissions - Role-based gate evaluated before any side effect
//!
//! Each command maps to a permission action string (see
//! [`crate::operations`]). The gate checks it against the issuer role's
//! allowed patterns, then against contextual attributes carried in
//! `command.context`:
//! - `mfa_verified`: required for actions matching the role's MFA patterns
//! - `tags`: any tag in the role's denied set refuses the command
//! - the role's optional UTC time window

use crate::command::Command;
use crate::error::{Error, Result};
use crate::operations::{OperationTable, PermissionTarget};
use crate::roles::Role;
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Context key for the multi-factor flag
pub const CONTEXT_MFA_VERIFIED: &str = "mfa_verified";

/// Why the gate refused a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Action not in the role's allowed set
    ActionNotAllowed,
    /// Outside the role's time window
    OutsideTimeWindow,
    /// Action needs a verified second factor
    MfaRequired,
    /// Command carries a tag the role may not touch
    TagDenied(String),
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActionNotAllowed => write!(f, "action is not in the role's allowed set"),
            Self::OutsideTimeWindow => write!(f, "outside the role's permitted time window"),
            Self::MfaRequired => write!(f, "multi-factor verification required"),
            Self::TagDenied(tag) => write!(f, "tag '{tag}' is not accessible to this role"),
        }
    }
}

/// Daily UTC window during which a role may act
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start time (HH:MM)
    pub start: String,
    /// End time (HH:MM); may be earlier than `start` to wrap past midnight
    pub end: String,
    /// Allowed weekdays (0 = Sunday); empty means every day
    #[serde(default)]
    pub days: Vec<u32>,
}

impl TimeWindow {
    /// Create a window over every day
    #[must_use]
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            days: Vec::new(),
        }
    }

    fn bounds(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(&self.end, "%H:%M").ok()?;
        Some((start, end))
    }

    /// Whether both bounds parse
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bounds().is_some() && self.days.iter().all(|d| *d < 7)
    }

    /// Whether `now` falls inside the window (malformed windows never match)
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let Some((start, end)) = self.bounds() else {
            return false;
        };
        if !self.days.is_empty() && !self.days.contains(&now.weekday().num_days_from_sunday()) {
            return false;
        }
        let t = now.time();
        if start <= end {
            t >= start && t <= end
        } else {
            t >= start || t <= end
        }
    }
}

/// What one role may do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    /// Allowed action patterns (`case:create`, `case:*`, `*`)
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    /// Patterns that additionally require `mfa_verified`
    #[serde(default)]
    pub mfa_required: Vec<String>,
    /// Tags this role may not act on
    #[serde(default)]
    pub denied_tags: Vec<String>,
    /// Optional time window
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

impl RolePolicy {
    /// Create a policy from allowed patterns
    #[must_use]
    pub fn allowing<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_actions: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Require MFA for these patterns
    #[must_use]
    pub fn with_mfa<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mfa_required = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Deny these tags
    #[must_use]
    pub fn with_denied_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to a time window
    #[must_use]
    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    /// Whether any allowed pattern matches `action`
    #[must_use]
    pub fn allows(&self, action: &str) -> bool {
        self.allowed_actions
            .iter()
            .any(|p| pattern_matches(p, action))
    }

    fn needs_mfa(&self, action: &str) -> bool {
        self.mfa_required.iter().any(|p| pattern_matches(p, action))
    }
}

/// Match `resource:verb` actions against `*`, `resource:*`, or an exact pattern
fn pattern_matches(pattern: &str, action: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(":*") {
        Some(prefix) => action
            .split_once(':')
            .is_some_and(|(resource, _)| resource == prefix),
        None => pattern == action,
    }
}

/// Gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// When false the gate allows everything (trusted batch paths only)
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// Per-role policies
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<Role, RolePolicy>,
}

fn default_strict() -> bool {
    true
}

fn default_roles() -> BTreeMap<Role, RolePolicy> {
    let mut roles = BTreeMap::new();
    roles.insert(
        Role::Admin,
        RolePolicy::allowing(["*"]).with_mfa(["admin:*"]),
    );
    roles.insert(
        Role::Attorney,
        RolePolicy::allowing([
            "case:*",
            "document:*",
            "petition:*",
            "ask:*",
            "search:*",
            "tool:*",
            "workflow:*",
            "validate:*",
        ]),
    );
    roles.insert(
        Role::Paralegal,
        RolePolicy::allowing([
            "case:read",
            "case:update",
            "document:read",
            "document:draft",
            "document:summarize",
            "ask:*",
            "search:*",
            "validate:*",
            "workflow:run",
            "tool:invoke",
        ]),
    );
    roles.insert(
        Role::Client,
        RolePolicy::allowing(["case:read", "document:read", "ask:*", "search:*"])
            .with_denied_tags(["privileged", "internal"]),
    );
    roles.insert(Role::Guest, RolePolicy::allowing(["ask:query"]));
    roles
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            roles: default_roles(),
        }
    }
}

impl PermissionConfig {
    /// Disable or enable the gate
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Replace one role's policy
    #[must_use]
    pub fn with_role(mut self, role: Role, policy: RolePolicy) -> Self {
        self.roles.insert(role, policy);
        self
    }

    /// Reject malformed time windows
    pub fn validate(&self) -> Result<()> {
        for (role, policy) in &self.roles {
            if let Some(window) = &policy.time_window {
                if !window.is_valid() {
                    return Err(Error::Configuration(format!(
                        "invalid time window for role '{role}': {}-{}",
                        window.start, window.end
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Role-based permission gate
pub struct PermissionGate {
    config: PermissionConfig,
    table: &'static OperationTable,
}

impl PermissionGate {
    /// Create a gate
    #[must_use]
    pub fn new(config: PermissionConfig) -> Self {
        if !config.strict {
            warn!("Permission gate constructed with strict mode disabled");
        }
        Self {
            config,
            table: OperationTable::global(),
        }
    }

    /// Whether the gate is enforcing
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.config.strict
    }

    /// Permission a command requires
    #[must_use]
    pub fn target_for(&self, command: &Command) -> PermissionTarget {
        self.table.permission_for(command)
    }

    /// Enforce against the current time
    pub fn enforce(&self, role: Role, command: &Command) -> Result<PermissionTarget> {
        self.enforce_at(role, command, Utc::now())
    }

    /// Enforce against an explicit clock
    pub fn enforce_at(
        &self,
        role: Role,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<PermissionTarget> {
        let target = self.target_for(command);
        if !self.config.strict {
            warn!(role = %role, action = %target.action, "Permission gate bypassed (strict mode off)");
            return Ok(target);
        }

        match self.evaluate(role, &target, command, now) {
            None => {
                debug!(role = %role, action = %target.action, "Permission granted");
                Ok(target)
            }
            Some(denial) => {
                warn!(
                    role = %role,
                    action = %target.action,
                    resource = %target.resource,
                    reason = %denial,
                    "Permission denied"
                );
                Err(Error::Security {
                    role: role.to_string(),
                    action: target.action,
                    reason: denial.to_string(),
                })
            }
        }
    }

    fn evaluate(
        &self,
        role: Role,
        target: &PermissionTarget,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Option<Denial> {
        let Some(policy) = self.config.roles.get(&role) else {
            return Some(Denial::ActionNotAllowed);
        };
        if !policy.allows(&target.action) {
            return Some(Denial::ActionNotAllowed);
        }
        if let Some(window) = &policy.time_window {
            if !window.contains(now) {
                return Some(Denial::OutsideTimeWindow);
            }
        }
        if policy.needs_mfa(&target.action) && !command.context_flag(CONTEXT_MFA_VERIFIED) {
            return Some(Denial::MfaRequired);
        }
        let tags = command.context_tags();
        policy
            .denied_tags
            .iter()
            .find(|denied| tags.iter().any(|t| t.eq_ignore_ascii_case(denied)))
            .map(|tag| Denial::TagDenied(tag.clone()))
    }
}

//! Authorization policy rules applied to the policy claim.
//!
//! The validator only asks a [`PolicyRule`] whether a policy string grants access.
//! [`ContainsToken`] is the rule in use today: the required grant must appear
//! somewhere in the delimited policy string. A structured permission check can
//! replace it without touching the validator.

use std::fmt;

/// Default required grant.
pub const DEFAULT_REQUIRED_POLICY: &str = "ReadDevices";

/// Decides whether a policy claim value grants access.
pub trait PolicyRule: Send + Sync + fmt::Debug {
    /// Returns true if `policy_value` grants access.
    fn permits(&self, policy_value: &str) -> bool;

    /// Human-readable rule description for logs.
    fn describe(&self) -> String;
}

/// The "contains-token-in-delimited-list" rule.
///
/// Grants access when the required token is a substring of the policy value,
/// so `"ManageDeviceSecurity,ReadDevices"` grants `ReadDevices` and
/// `"ManageDeviceSecurity"` does not. Matching is substring containment, not
/// delimiter-aware equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsToken {
    required: String,
}

impl ContainsToken {
    pub fn new(required: impl Into<String>) -> Self {
        Self {
            required: required.into(),
        }
    }

    pub fn required(&self) -> &str {
        &self.required
    }
}

impl Default for ContainsToken {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_POLICY)
    }
}

impl PolicyRule for ContainsToken {
    fn permits(&self, policy_value: &str) -> bool {
        policy_value.contains(self.required.as_str())
    }

    fn describe(&self) -> String {
        format!("contains-token({})", self.required)
    }
}

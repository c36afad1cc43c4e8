//! Entitlement classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::{Role, Session, SubscriptionStatus};

/// Coarse admission class derived from role and subscription status.
///
/// Never persisted: recompute it from the session whenever it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementTier {
    Denied,
    Demo,
    Paid,
    Developer,
}

impl EntitlementTier {
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        !matches!(self, Self::Denied)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Denied => "denied",
            Self::Demo => "demo",
            Self::Paid => "paid",
            Self::Developer => "developer",
        }
    }
}

impl fmt::Display for EntitlementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map `(role, subscription status)` to an [`EntitlementTier`].
///
/// 1. `developer`, `owner`, `admin` are always [`EntitlementTier::Developer`].
/// 2. An entitled status (`active`, `enterprise`, `pro`, `basic`, `demo`) or the
///    `demo` role is [`EntitlementTier::Paid`].
/// 3. Anything else is [`EntitlementTier::Denied`].
///
/// Inputs are normalized (trimmed, lowercased) before comparison.
#[must_use]
pub fn classify(role: &str, subscription_status: &str) -> EntitlementTier {
    let role = Role::new(role);
    let status = SubscriptionStatus::new(subscription_status);
    if role.is_privileged() {
        EntitlementTier::Developer
    } else if status.is_entitled() || role.is_demo() {
        EntitlementTier::Paid
    } else {
        EntitlementTier::Denied
    }
}

/// Classification for display: like [`classify`], but an admitted demo session
/// reports [`EntitlementTier::Demo`] instead of `Paid`.
#[must_use]
pub fn classify_session(session: &Session, demo_token: &str) -> EntitlementTier {
    match classify(session.role.as_str(), session.subscription.as_str()) {
        EntitlementTier::Paid if session.is_demo(demo_token) => EntitlementTier::Demo,
        tier => tier,
    }
}

/// Status written to storage after a successful exchange.
///
/// A `Paid` session whose raw status is `free` can only have come through the
/// demo-role branch; it is stored as `demo`.
// TODO: confirm with product whether `free` -> `demo` should also apply to Developer sessions.
#[must_use]
pub fn normalize_subscription(
    tier: EntitlementTier,
    status: &SubscriptionStatus,
) -> SubscriptionStatus {
    if tier == EntitlementTier::Paid && status.as_str() == SubscriptionStatus::FREE {
        SubscriptionStatus::demo()
    } else {
        status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DEMO_SESSION_TOKEN, SessionToken};

    const ENTITLED: [&str; 5] = ["active", "enterprise", "pro", "basic", "demo"];
    const UNENTITLED: [&str; 6] = ["free", "", "expired", "trial", "null", "Visitor"];
    const ORDINARY_ROLES: [&str; 4] = ["teacher", "student", "parent", ""];

    #[test]
    fn privileged_roles_are_developer_for_any_status() {
        for role in ["developer", "owner", "admin", " Admin "] {
            for status in ENTITLED.iter().chain(UNENTITLED.iter()) {
                assert_eq!(
                    classify(role, status),
                    EntitlementTier::Developer,
                    "{role}/{status}"
                );
            }
        }
    }

    #[test]
    fn entitled_status_is_paid_for_ordinary_roles() {
        for role in ORDINARY_ROLES.iter().chain(["demo"].iter()) {
            for status in ENTITLED {
                assert_eq!(classify(role, status), EntitlementTier::Paid, "{role}/{status}");
            }
        }
    }

    #[test]
    fn demo_role_is_paid_for_any_status() {
        for status in UNENTITLED {
            assert_eq!(classify("demo", status), EntitlementTier::Paid, "{status}");
        }
    }

    #[test]
    fn everything_else_is_denied() {
        for role in ORDINARY_ROLES {
            for status in UNENTITLED {
                assert_eq!(classify(role, status), EntitlementTier::Denied, "{role}/{status}");
            }
        }
    }

    #[test]
    fn status_comparison_is_case_insensitive() {
        assert_eq!(classify("teacher", "ACTIVE"), EntitlementTier::Paid);
        assert_eq!(classify("teacher", " Pro "), EntitlementTier::Paid);
    }

    #[test]
    fn classify_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(classify("teacher", "free"), EntitlementTier::Denied);
            assert_eq!(classify("owner", "free"), EntitlementTier::Developer);
        }
    }

    #[test]
    fn admitted_tiers() {
        assert!(!EntitlementTier::Denied.is_admitted());
        assert!(EntitlementTier::Demo.is_admitted());
        assert!(EntitlementTier::Paid.is_admitted());
        assert!(EntitlementTier::Developer.is_admitted());
    }

    #[test]
    fn classify_session_reports_demo_for_sandboxed_sessions() {
        let demo = Session::new(
            SessionToken::new(DEMO_SESSION_TOKEN),
            Role::new("teacher"),
            "Demo Teacher",
            SubscriptionStatus::demo(),
        );
        assert_eq!(classify_session(&demo, DEMO_SESSION_TOKEN), EntitlementTier::Demo);

        let paid = Session::new(
            SessionToken::new("jwt"),
            Role::new("teacher"),
            "Paid Teacher",
            SubscriptionStatus::new("pro"),
        );
        assert_eq!(classify_session(&paid, DEMO_SESSION_TOKEN), EntitlementTier::Paid);
    }

    #[test]
    fn free_paid_session_is_rewritten_to_demo() {
        let free = SubscriptionStatus::free();
        assert_eq!(
            normalize_subscription(EntitlementTier::Paid, &free).as_str(),
            "demo"
        );
        assert_eq!(
            normalize_subscription(EntitlementTier::Denied, &free).as_str(),
            "free"
        );
        assert_eq!(
            normalize_subscription(EntitlementTier::Developer, &free).as_str(),
            "free"
        );
        let pro = SubscriptionStatus::new("pro");
        assert_eq!(normalize_subscription(EntitlementTier::Paid, &pro).as_str(), "pro");
    }
}

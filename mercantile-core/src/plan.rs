//! Subscription plans and resource ceilings.

use serde::{Deserialize, Serialize};

/// Subscription tier for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantPlan {
    /// 30-day evaluation with tight ceilings.
    #[default]
    Trial,
    /// Single-store businesses.
    Basic,
    /// Multi-register, higher volume.
    Professional,
    /// Negotiated contract, no built-in ceilings.
    Enterprise,
}

impl std::fmt::Display for TenantPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Basic => write!(f, "basic"),
            Self::Professional => write!(f, "professional"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Per-resource ceilings attached to a plan.
///
/// `None` means unlimited. These are resolved onto the tenant record at creation
/// time so later plan-table edits never silently change a live tenant's contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum staff accounts in the tenant database.
    pub max_users: Option<u32>,
    /// Maximum products in the catalog.
    pub max_products: Option<u32>,
    /// Maximum sales transactions per calendar month.
    pub max_transactions_per_month: Option<u32>,
}

impl PlanLimits {
    /// Ceilings for a plan tier.
    pub fn for_plan(plan: TenantPlan) -> Self {
        match plan {
            TenantPlan::Trial => Self {
                max_users: Some(3),
                max_products: Some(100),
                max_transactions_per_month: Some(500),
            },
            TenantPlan::Basic => Self {
                max_users: Some(10),
                max_products: Some(2_000),
                max_transactions_per_month: Some(10_000),
            },
            TenantPlan::Professional => Self {
                max_users: Some(50),
                max_products: Some(50_000),
                max_transactions_per_month: Some(200_000),
            },
            TenantPlan::Enterprise => Self {
                max_users: None,
                max_products: None,
                max_transactions_per_month: None,
            },
        }
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::for_plan(TenantPlan::Trial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_limits() {
        let limits = PlanLimits::for_plan(TenantPlan::Trial);
        assert_eq!(limits.max_users, Some(3));
        assert_eq!(limits.max_products, Some(100));
    }

    #[test]
    fn test_enterprise_unlimited() {
        let limits = PlanLimits::for_plan(TenantPlan::Enterprise);
        assert_eq!(limits.max_users, None);
        assert_eq!(limits.max_transactions_per_month, None);
    }
}

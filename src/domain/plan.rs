use serde::{Deserialize, Serialize};

/// A named subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanName {
    Unset,
    Pro,
    Max,
    Max20,
}

impl PlanName {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pro" => PlanName::Pro,
            "max" => PlanName::Max,
            "max20" | "max-20" | "max_20" => PlanName::Max20,
            _ => PlanName::Unset,
        }
    }

    /// Fixed default token limit used by the block progress display.
    pub fn default_token_limit(&self) -> u64 {
        match self {
            PlanName::Unset => 0,
            PlanName::Pro => 7_000,
            PlanName::Max => 35_000,
            PlanName::Max20 => 140_000,
        }
    }
}

/// `(name, monthly_budget_usd, default_token_limit)`. Budgets are
/// data-driven from an embedded catalog; `Plan::unset()` always carries a
/// zero budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: PlanName,
    pub monthly_budget_usd: f64,
    pub default_token_limit: u64,
}

impl Plan {
    pub fn unset() -> Self {
        Plan {
            name: PlanName::Unset,
            monthly_budget_usd: 0.0,
            default_token_limit: 0,
        }
    }

    /// Build a plan from its catalog name, optionally overriding the
    /// budget (e.g. from `claude.monthly_budget` config). When no
    /// override is given, falls back to the embedded placeholder catalog.
    pub fn from_name(name: &str, budget_override: Option<f64>) -> Self {
        let plan_name = PlanName::parse(name);
        let budget = budget_override.unwrap_or_else(|| catalog::default_budget(plan_name));
        Plan {
            name: plan_name,
            monthly_budget_usd: budget,
            default_token_limit: plan_name.default_token_limit(),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self.name, PlanName::Unset)
    }
}

/// Illustrative default monthly USD budgets, keyed by plan name. Real
/// catalog data is an external concern; this exists only so
/// `GetUsageVariables` has a denominator when no override is configured.
pub mod catalog {
    use super::PlanName;

    pub fn default_budget(name: PlanName) -> f64 {
        match name {
            PlanName::Unset => 0.0,
            PlanName::Pro => 20.0,
            PlanName::Max => 100.0,
            PlanName::Max20 => 200.0,
        }
    }
}

use serde::{Deserialize, Serialize};

/// A non-negative USD amount. Floating-point throughout, reflecting the
/// source telemetry's precision — never rounded in storage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cost {
    pub amount: f64,
}

impl Cost {
    pub fn new(amount: f64) -> Self {
        Self {
            amount: amount.max(0.0),
        }
    }

    /// One-decimal presentation form, e.g. `$12.3`. Presentation-only.
    pub fn format_dollars(&self) -> String {
        format!("${:.1}", self.amount)
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost {
            amount: self.amount + rhs.amount,
        }
    }
}

impl std::ops::AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        self.amount += rhs.amount;
    }
}

impl std::iter::Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::default(), |acc, c| acc + c)
    }
}

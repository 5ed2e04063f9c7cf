use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Per-capita deviation beyond which a comparison is flagged
const CONCERN_THRESHOLD_PCT: Decimal = dec!(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Fire,
    School,
    Town,
}

/// Annual budget of one service provider and the people it serves
/// (residents for fire and town services, enrolled students for schools)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceBudget {
    pub name: String,
    pub kind: ServiceKind,
    pub fiscal_year: String,
    #[schemars(with = "f64")]
    pub total_budget: Decimal,
    pub served: u32,
    /// Municipalities covered, e.g. a fire district spanning villages
    #[serde(default)]
    pub coverage: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Anything with a budget and a headcount
pub trait PerCapita {
    fn label(&self) -> &str;
    fn total_budget(&self) -> Decimal;
    fn served(&self) -> u64;

    /// Budget per person served, 0 when nobody is served
    fn per_capita(&self) -> Decimal {
        let served = self.served();
        if served == 0 {
            Decimal::ZERO
        } else {
            self.total_budget() / Decimal::from(served)
        }
    }
}

impl PerCapita for ServiceBudget {
    fn label(&self) -> &str {
        &self.name
    }

    fn total_budget(&self) -> Decimal {
        self.total_budget
    }

    fn served(&self) -> u64 {
        u64::from(self.served)
    }
}

/// Several providers treated as one, e.g. neighbouring school districts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedBudget {
    pub name: String,
    pub budgets: Vec<ServiceBudget>,
}

impl CombinedBudget {
    pub fn new(name: impl Into<String>, budgets: Vec<ServiceBudget>) -> Self {
        CombinedBudget {
            name: name.into(),
            budgets,
        }
    }

    /// Mean of member per-capita costs weighted by people served
    pub fn weighted_average_per_capita(&self) -> Decimal {
        let served = self.served();
        if served == 0 {
            return Decimal::ZERO;
        }
        let weighted: Decimal = self
            .budgets
            .iter()
            .map(|b| b.per_capita() * Decimal::from(b.served))
            .sum();
        weighted / Decimal::from(served)
    }
}

impl PerCapita for CombinedBudget {
    fn label(&self) -> &str {
        &self.name
    }

    fn total_budget(&self) -> Decimal {
        self.budgets.iter().map(|b| b.total_budget).sum()
    }

    fn served(&self) -> u64 {
        self.budgets.iter().map(|b| u64::from(b.served)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetSide {
    pub name: String,
    pub total_budget: Decimal,
    pub served: u64,
    pub per_capita: Decimal,
}

impl BudgetSide {
    fn of(budget: &impl PerCapita) -> Self {
        BudgetSide {
            name: budget.label().to_string(),
            total_budget: budget.total_budget(),
            served: budget.served(),
            per_capita: budget.per_capita(),
        }
    }
}

/// Baseline provider measured against a comparison provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetComparison {
    pub baseline: BudgetSide,
    pub comparison: BudgetSide,
}

impl BudgetComparison {
    pub fn new(baseline: &impl PerCapita, comparison: &impl PerCapita) -> Self {
        BudgetComparison {
            baseline: BudgetSide::of(baseline),
            comparison: BudgetSide::of(comparison),
        }
    }

    /// Comparison per-capita cost minus baseline
    pub fn per_capita_difference(&self) -> Decimal {
        self.comparison.per_capita - self.baseline.per_capita
    }

    /// How much more (or less) the comparison spends per capita, in percent
    pub fn per_capita_difference_pct(&self) -> Decimal {
        if self.baseline.per_capita.is_zero() {
            return Decimal::ZERO;
        }
        (self.comparison.per_capita / self.baseline.per_capita - Decimal::ONE) * dec!(100)
    }

    pub fn total_budget_difference(&self) -> Decimal {
        self.comparison.total_budget - self.baseline.total_budget
    }

    /// Per-capita spending differs by more than 10%
    pub fn concern(&self) -> bool {
        self.per_capita_difference_pct().abs() > CONCERN_THRESHOLD_PCT
    }

    pub fn summary(&self) -> String {
        let difference = self.per_capita_difference();
        let verdict = if difference > Decimal::ZERO {
            format!(
                "{} spends ${:.2} more per capita",
                self.comparison.name, difference
            )
        } else {
            format!(
                "{} spends ${:.2} more per capita",
                self.baseline.name,
                difference.abs()
            )
        };

        let mut lines = vec![];
        for side in [&self.baseline, &self.comparison] {
            lines.push(format!("{}:", side.name));
            lines.push(format!("  Total Budget:   ${:.0}", side.total_budget));
            lines.push(format!("  Served:         {}", side.served));
            lines.push(format!("  Per Capita:     ${:.2}", side.per_capita));
        }
        lines.push(format!("Per Capita Difference: ${:.2}", difference));
        lines.push(format!(
            "Percentage Difference: {:+.1}%",
            self.per_capita_difference_pct()
        ));
        lines.push(format!(
            "Total Budget Difference: ${:.0}",
            self.total_budget_difference()
        ));
        lines.push(verdict);
        if self.concern() {
            lines.push("Per-capita spending differs by more than 10%".to_string());
        }
        lines.join("\n")
    }
}

/// Root of a budgets JSON file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BudgetInput {
    pub budgets: Vec<ServiceBudget>,
}

pub fn read_budgets_json<R: Read>(reader: R) -> Result<Vec<ServiceBudget>, serde_json::Error> {
    let input: BudgetInput = serde_json::from_reader(reader)?;
    Ok(input.budgets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(name: &str, total: Decimal, served: u32) -> ServiceBudget {
        ServiceBudget {
            name: name.to_string(),
            kind: ServiceKind::School,
            fiscal_year: "2024-25".to_string(),
            total_budget: total,
            served,
            coverage: vec![],
            source: None,
        }
    }

    #[test]
    fn per_capita_cost() {
        assert_eq!(budget("a", dec!(1000000), 400).per_capita(), dec!(2500));
        assert_eq!(budget("empty", dec!(1000000), 0).per_capita(), Decimal::ZERO);
    }

    #[test]
    fn combined_budget_weights_by_served() {
        let combined = CombinedBudget::new(
            "Eastchester area",
            vec![
                budget("eastchester", dec!(30000000), 1000),
                budget("bronxville", dec!(10000000), 500),
            ],
        );
        assert_eq!(combined.total_budget(), dec!(40000000));
        assert_eq!(combined.served(), 1500);
        // (30,000 * 1000 + 20,000 * 500) / 1500
        assert_eq!(combined.weighted_average_per_capita().round_dp(6), dec!(26666.666667));
        assert_eq!(combined.per_capita().round_dp(6), dec!(26666.666667));
    }

    #[test]
    fn comparison_flags_large_gaps() {
        let baseline = budget("eastchester", dec!(2000000), 1000);
        let comparison = budget("scarsdale", dec!(2300000), 1000);
        let cmp = BudgetComparison::new(&baseline, &comparison);
        assert_eq!(cmp.per_capita_difference(), dec!(300));
        assert_eq!(cmp.per_capita_difference_pct(), dec!(15));
        assert_eq!(cmp.total_budget_difference(), dec!(300000));
        assert!(cmp.concern());
        assert!(cmp.summary().contains("scarsdale spends $300.00 more per capita"));

        let close = budget("pelham", dec!(2100000), 1000);
        let cmp = BudgetComparison::new(&baseline, &close);
        assert_eq!(cmp.per_capita_difference_pct(), dec!(5));
        assert!(!cmp.concern());
    }

    #[test]
    fn comparison_against_unserved_baseline() {
        let baseline = budget("nobody", dec!(100), 0);
        let comparison = budget("someone", dec!(100), 10);
        let cmp = BudgetComparison::new(&baseline, &comparison);
        assert_eq!(cmp.per_capita_difference_pct(), Decimal::ZERO);
        assert!(!cmp.concern());
    }

    #[test]
    fn budgets_from_json() {
        let json = r#"{"budgets": [
            {"name": "Eastchester FD", "kind": "fire", "fiscal_year": "2024", "total_budget": 12500000,
             "served": 32000, "coverage": ["eastchester_unincorp", "tuckahoe", "bronxville"]},
            {"name": "Scarsdale FD", "kind": "fire", "fiscal_year": "2024", "total_budget": 9000000, "served": 18253}
        ]}"#;
        let budgets = read_budgets_json(json.as_bytes()).unwrap();
        assert_eq!(budgets.len(), 2);
        assert_eq!(budgets[0].coverage.len(), 3);
        assert_eq!(budgets[1].kind, ServiceKind::Fire);
        assert_eq!(budgets[0].per_capita().round_dp(4), dec!(390.625));
    }
}
